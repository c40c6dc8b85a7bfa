use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no transport configured")]
    MissingTransport,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
