use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClapError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Input ended before the first audio block")]
    EmptyStream,

    #[error("Invalid block size: expected {expected} samples, got {actual}")]
    InvalidBlockSize { expected: usize, actual: usize },

    #[error("Not a DTMF key: {0:?}")]
    UnknownKey(char),

    #[error("Repeated tone {0:?}: adjacent clapboard tones must differ")]
    RepeatedTone(char),

    #[error("Recording {0} shares no sync tag with the other recordings")]
    Unaligned(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClapError>;
