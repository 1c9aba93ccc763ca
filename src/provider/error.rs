use thiserror::Error;

/// Errors returned by the generative backend adapter.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure before any response arrived.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status from the backend.
    #[error("provider returned status {status}: {message}")]
    Http { status: u16, message: String },

    /// The stream broke mid-response.
    #[error("provider stream error: {0}")]
    Stream(String),

    /// A chunk could not be decoded into the expected wire shape.
    #[error("failed to decode provider chunk: {0}")]
    Decode(String),

    /// The response carried no candidates or no text parts.
    #[error("provider response contained no usable text")]
    EmptyResponse,
}

/// Convenience result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
