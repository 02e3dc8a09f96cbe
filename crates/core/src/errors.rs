use thiserror::Error;

// Errors surfaced to callers of the congestion core
#[derive(Debug, Error)]
pub enum CongestionError {
    #[error("unknown path id: {0}")]
    UnknownPath(u8),

    #[error("path id already registered: {0}")]
    DuplicatePath(u8),

    #[error("stale packet handle, seq: {seq}, generation: {generation}")]
    StalePacketHandle { seq: u16, generation: u32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

pub type Result<T, E = CongestionError> = std::result::Result<T, E>;
