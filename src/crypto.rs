//! Per-peer key agreement and record encryption (component B).
//!
//! Each node holds one P-256 keypair for its lifetime, advertises its public
//! key (PEM) in discovery packets, and derives one AES-256 key per peer via
//! ECDH + HKDF-SHA256. Records are sealed with AES-CFB under a fresh 16-byte
//! IV per packet; the wire form is `base64(IV || ciphertext)`.

use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use elliptic_curve::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use hkdf::Hkdf;
use p256::ecdh::diffie_hellman;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use sha2::Sha256;
use std::collections::HashMap;
use thiserror::Error;

type AesCfbEnc = cfb_mode::Encryptor<aes::Aes256>;
type AesCfbDec = cfb_mode::Decryptor<aes::Aes256>;

const IV_LEN: usize = 16;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid public key pem: {0}")]
    InvalidPublicKey(String),
    #[error("record shorter than iv length")]
    RecordTooShort,
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// This node's long-lived P-256 identity.
pub struct Keypair {
    secret: SecretKey,
    public_pem: String,
}

impl Keypair {
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public_pem = secret
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("freshly generated public key always encodes");
        Self { secret, public_pem }
    }

    /// PEM-encoded SubjectPublicKeyInfo advertised in discovery packets.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    /// Derive the AES-256 key shared with a peer from their advertised
    /// public key: ECDH(P-256) -> HKDF-SHA256(salt=None, info=None, len=32).
    pub fn derive_shared_key(&self, peer_public_pem: &str) -> Result<[u8; KEY_LEN], CryptoError> {
        let peer_public = PublicKey::from_public_key_pem(peer_public_pem)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        let shared = diffie_hellman(self.secret.to_nonzero_scalar(), peer_public.as_affine());
        let hk = Hkdf::<Sha256>::new(None, shared.raw_secret_bytes());
        let mut okm = [0u8; KEY_LEN];
        hk.expand(&[], &mut okm)
            .expect("HKDF-SHA256 output length 32 is always valid");
        Ok(okm)
    }
}

/// Per-peer AES-256 keys, keyed by peer name. One entry per peer we've
/// completed key agreement with; looked up by the forwarder before sealing
/// or opening interest/data payloads.
#[derive(Default)]
pub struct SharedSecretStore {
    keys: HashMap<String, [u8; KEY_LEN]>,
}

impl SharedSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, peer_name: &str, key: [u8; KEY_LEN]) {
        self.keys.insert(peer_name.to_string(), key);
    }

    pub fn get(&self, peer_name: &str) -> Option<&[u8; KEY_LEN]> {
        self.keys.get(peer_name)
    }

    pub fn remove(&mut self, peer_name: &str) {
        self.keys.remove(peer_name);
    }
}

/// Seal `plaintext` under `key` with a fresh random IV. Returns
/// `base64(IV || ciphertext)`.
pub fn encrypt_record(key: &[u8; KEY_LEN], plaintext: &[u8]) -> String {
    let mut iv = [0u8; IV_LEN];
    rand::Rng::fill(&mut OsRng, &mut iv);
    let mut buf = plaintext.to_vec();
    AesCfbEnc::new(key.into(), &iv.into()).encrypt(&mut buf);
    let mut record = Vec::with_capacity(IV_LEN + buf.len());
    record.extend_from_slice(&iv);
    record.extend_from_slice(&buf);
    STANDARD.encode(record)
}

/// Inverse of `encrypt_record`.
pub fn decrypt_record(key: &[u8; KEY_LEN], record_b64: &str) -> Result<Vec<u8>, CryptoError> {
    let record = STANDARD.decode(record_b64)?;
    if record.len() < IV_LEN {
        return Err(CryptoError::RecordTooShort);
    }
    let (iv, ciphertext) = record.split_at(IV_LEN);
    let mut buf = ciphertext.to_vec();
    AesCfbDec::new(key.into(), iv.into()).decrypt(&mut buf);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_agreement_is_symmetric() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let alice_key = alice.derive_shared_key(bob.public_key_pem()).unwrap();
        let bob_key = bob.derive_shared_key(alice.public_key_pem()).unwrap();
        assert_eq!(alice_key, bob_key);
    }

    #[test]
    fn record_round_trips() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let key = alice.derive_shared_key(bob.public_key_pem()).unwrap();
        let record = encrypt_record(&key, b"hello room1");
        let plaintext = decrypt_record(&key, &record).unwrap();
        assert_eq!(plaintext, b"hello room1");
    }

    #[test]
    fn distinct_ivs_yield_distinct_records() {
        let key = [7u8; KEY_LEN];
        let a = encrypt_record(&key, b"same payload");
        let b = encrypt_record(&key, b"same payload");
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_does_not_decrypt_to_original() {
        let key_a = [1u8; KEY_LEN];
        let key_b = [2u8; KEY_LEN];
        let record = encrypt_record(&key_a, b"sensitive actuator command");
        let garbled = decrypt_record(&key_b, &record).unwrap();
        assert_ne!(garbled, b"sensitive actuator command");
    }

    #[test]
    fn truncated_record_is_rejected() {
        let short = STANDARD.encode([0u8; 4]);
        assert!(matches!(decrypt_record(&[0u8; KEY_LEN], &short), Err(CryptoError::RecordTooShort)));
    }
}
