//! Packet codec and wire framing (component A).
//!
//! All four packet types share a common header `{version, type, name,
//! timestamp, data}` serialised as one JSON object per datagram or TCP
//! message. `data` is opaque to the codec: for `interest`/`data` packets it
//! carries a base64-encoded encrypted record (see `crypto`), for
//! `discovery`/`routing` it carries a plain JSON object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Wire protocol version. Bump on breaking changes; mismatched packets are
/// dropped silently by the caller (§4.1), not here — the codec just reports
/// the mismatch.
pub const WIRE_VERSION: &str = "v2";

/// Fixed receive-buffer bound the wire framing must stay compatible with.
pub const MAX_PACKET_BYTES: usize = crate::config::MAX_PACKET_BYTES;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: String, got: String },
    #[error("unknown packet type: {0}")]
    UnknownType(String),
    #[error("missing or invalid field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Online,
    Offline,
}

/// A decoded packet in its typed form. Each variant round-trips exactly
/// through `encode`/`decode` (property 5, §8).
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Discovery {
        name: String,
        timestamp: String,
        port: u16,
        status: PeerStatus,
        pub_key_pem: String,
        sensor_types: String,
    },
    Routing {
        name: String,
        timestamp: String,
        port: u16,
        vector: HashMap<String, u32>,
    },
    Interest {
        sender: String,
        destination: String,
        name: String,
        timestamp: String,
        /// Base64-encoded `IV || AES-CFB(payload)`, empty for an interest
        /// carrying no application payload.
        data: String,
    },
    Data {
        sender: String,
        destination: String,
        name: String,
        timestamp: String,
        data: String,
    },
}

impl Packet {
    pub fn name(&self) -> &str {
        match self {
            Packet::Discovery { name, .. } => name,
            Packet::Routing { name, .. } => name,
            Packet::Interest { name, .. } => name,
            Packet::Data { name, .. } => name,
        }
    }

    pub fn packet_type(&self) -> &'static str {
        match self {
            Packet::Discovery { .. } => "discovery",
            Packet::Routing { .. } => "routing",
            Packet::Interest { .. } => "interest",
            Packet::Data { .. } => "data",
        }
    }

    pub fn now_timestamp() -> String {
        let now: DateTime<Utc> = Utc::now();
        now.to_rfc3339()
    }

    pub fn new_discovery(node_name: &str, port: u16, status: PeerStatus, pub_key_pem: String, sensor_types: &[String]) -> Self {
        Packet::Discovery {
            name: node_name.to_string(),
            timestamp: Self::now_timestamp(),
            port,
            status,
            pub_key_pem,
            sensor_types: sensor_types.join(","),
        }
    }

    pub fn new_routing(node_name: &str, port: u16, vector: HashMap<String, u32>) -> Self {
        Packet::Routing {
            name: node_name.to_string(),
            timestamp: Self::now_timestamp(),
            port,
            vector,
        }
    }

    pub fn new_interest(sender: &str, destination: &str, name: &str, data: String) -> Self {
        Packet::Interest {
            sender: sender.to_string(),
            destination: destination.to_string(),
            name: name.to_string(),
            timestamp: Self::now_timestamp(),
            data,
        }
    }

    pub fn new_data(sender: &str, destination: &str, name: &str, data: String) -> Self {
        Packet::Data {
            sender: sender.to_string(),
            destination: destination.to_string(),
            name: name.to_string(),
            timestamp: Self::now_timestamp(),
            data,
        }
    }

    /// Encode to the wire's single JSON object.
    pub fn encode(&self) -> Vec<u8> {
        let value = match self {
            Packet::Discovery { name, timestamp, port, status, pub_key_pem, sensor_types } => {
                serde_json::json!({
                    "version": WIRE_VERSION,
                    "type": "discovery",
                    "name": name,
                    "timestamp": timestamp,
                    "data": {
                        "port": port,
                        "status": status,
                        "pub_key": pub_key_pem,
                        "sensor_types": sensor_types,
                    }
                })
            }
            Packet::Routing { name, timestamp, port, vector } => {
                serde_json::json!({
                    "version": WIRE_VERSION,
                    "type": "routing",
                    "name": name,
                    "timestamp": timestamp,
                    "data": {
                        "port": port,
                        "vector": vector,
                    }
                })
            }
            Packet::Interest { sender, destination, name, timestamp, data } => {
                serde_json::json!({
                    "version": WIRE_VERSION,
                    "type": "interest",
                    "sender": sender,
                    "destination": destination,
                    "name": name,
                    "timestamp": timestamp,
                    "data": data,
                })
            }
            Packet::Data { sender, destination, name, timestamp, data } => {
                serde_json::json!({
                    "version": WIRE_VERSION,
                    "type": "data",
                    "sender": sender,
                    "destination": destination,
                    "name": name,
                    "timestamp": timestamp,
                    "data": data,
                })
            }
        };
        // serde_json::to_vec on a json!{} value never fails.
        serde_json::to_vec(&value).expect("packet value is always serialisable")
    }

    /// Decode one JSON object from the wire. Validates the version header;
    /// the caller decides drop policy on `CodecError::VersionMismatch`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value: Value = serde_json::from_slice(bytes)?;

        let version = value
            .get("version")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingField("version"))?;
        if version != WIRE_VERSION {
            return Err(CodecError::VersionMismatch {
                expected: WIRE_VERSION.to_string(),
                got: version.to_string(),
            });
        }

        let packet_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingField("type"))?;
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingField("name"))?
            .to_string();
        let timestamp = value
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingField("timestamp"))?
            .to_string();
        let data = value.get("data").ok_or(CodecError::MissingField("data"))?;

        match packet_type {
            "discovery" => {
                let port = data.get("port").and_then(Value::as_u64).ok_or(CodecError::MissingField("data.port"))? as u16;
                let status_str = data.get("status").and_then(Value::as_str).ok_or(CodecError::MissingField("data.status"))?;
                let status = match status_str {
                    "online" => PeerStatus::Online,
                    "offline" => PeerStatus::Offline,
                    other => return Err(CodecError::UnknownType(format!("discovery status {other}"))),
                };
                let pub_key_pem = data.get("pub_key").and_then(Value::as_str).unwrap_or_default().to_string();
                let sensor_types = data.get("sensor_types").and_then(Value::as_str).unwrap_or_default().to_string();
                Ok(Packet::Discovery { name, timestamp, port, status, pub_key_pem, sensor_types })
            }
            "routing" => {
                let port = data.get("port").and_then(Value::as_u64).ok_or(CodecError::MissingField("data.port"))? as u16;
                let vector_value = data.get("vector").ok_or(CodecError::MissingField("data.vector"))?;
                let vector: HashMap<String, u32> = serde_json::from_value(vector_value.clone())?;
                Ok(Packet::Routing { name, timestamp, port, vector })
            }
            "interest" | "data" => {
                let sender = value.get("sender").and_then(Value::as_str).ok_or(CodecError::MissingField("sender"))?.to_string();
                let destination = value.get("destination").and_then(Value::as_str).ok_or(CodecError::MissingField("destination"))?.to_string();
                let data_str = data.as_str().ok_or(CodecError::MissingField("data"))?.to_string();
                if packet_type == "interest" {
                    Ok(Packet::Interest { sender, destination, name, timestamp, data: data_str })
                } else {
                    Ok(Packet::Data { sender, destination, name, timestamp, data: data_str })
                }
            }
            other => Err(CodecError::UnknownType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_round_trips() {
        let pkt = Packet::new_discovery("/h/r1", 8000, PeerStatus::Online, "PEM".into(), &["temp".into(), "light".into()]);
        let bytes = pkt.encode();
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(pkt, decoded);
    }

    #[test]
    fn routing_round_trips() {
        let mut vector = HashMap::new();
        vector.insert("/h/r1/temp".to_string(), 0u32);
        vector.insert("/h/r2/light".to_string(), 2u32);
        let pkt = Packet::new_routing("/h/r1", 8000, vector);
        let bytes = pkt.encode();
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(pkt, decoded);
    }

    #[test]
    fn interest_round_trips() {
        let pkt = Packet::new_interest("/h/r2", "/h/r1", "/h/r1/temp", String::new());
        let bytes = pkt.encode();
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(pkt, decoded);
    }

    #[test]
    fn data_round_trips() {
        let pkt = Packet::new_data("/h/r1", "/h/r2", "/h/r1/temp", "base64ciphertext".into());
        let bytes = pkt.encode();
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(pkt, decoded);
    }

    #[test]
    fn rejects_bad_json() {
        assert!(Packet::decode(b"not json").is_err());
    }

    #[test]
    fn rejects_version_mismatch() {
        let bytes = br#"{"version":"v999","type":"discovery","name":"/x","timestamp":"t","data":{"port":1,"status":"online"}}"#;
        match Packet::decode(bytes) {
            Err(CodecError::VersionMismatch { .. }) => {}
            other => panic!("expected version mismatch, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_type() {
        let bytes = br#"{"version":"v2","type":"carrier_pigeon","name":"/x","timestamp":"t","data":{}}"#;
        assert!(matches!(Packet::decode(bytes), Err(CodecError::UnknownType(_))));
    }
}
