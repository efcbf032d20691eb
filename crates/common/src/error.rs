//! Common error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid USB ID '{value}': {reason}")]
    InvalidId { value: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
