use thiserror::Error;

/// Core error type shared across tombola crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The parameters violate a structural requirement (zero sizes, unknown engine).
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    /// A card matrix is malformed (ragged, empty, or out of shape).
    #[error("invalid card: {0}")]
    InvalidCard(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for results returned by tombola crates.
pub type Result<T> = std::result::Result<T, Error>;
