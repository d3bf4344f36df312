//! Crate-wide error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("no shared secret for peer {0}")]
    MissingSharedSecret(String),

    #[error("no route to {0}")]
    NoRoute(String),

    #[error("request for {0} timed out")]
    Timeout(String),

    #[error("all forwarding candidates for {0} failed")]
    ForwardFailed(String),
}

pub type Result<T> = std::result::Result<T, NodeError>;
