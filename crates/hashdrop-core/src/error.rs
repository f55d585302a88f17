use thiserror::Error;

pub type Result<T> = std::result::Result<T, HashdropError>;

#[derive(Debug, Error)]
pub enum HashdropError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload contained no data")]
    EmptyUpload,

    #[error("not found: '{0}'")]
    NotFound(String),

    #[error("index and blob store disagree: {0}")]
    ConsistencyFault(String),

    #[error("invalid content digest: '{0}'")]
    InvalidDigest(String),

    #[error("invalid stored name: '{0}'")]
    InvalidName(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("index marker is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HashdropError {
    /// True for every error a caller should present as "file not found".
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::ConsistencyFault(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
