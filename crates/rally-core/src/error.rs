//! Error types shared across rally crates.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RallyError>;

#[derive(Debug, Error)]
pub enum RallyError {
    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// A document-store operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The messaging gateway rejected or failed a push call.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// A request failed boundary validation.
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
