use thiserror::Error;

/// Errors returned by catalog, client, and crop session operations.
#[derive(Error, Debug)]
pub enum CropError {
    /// Every attempt at a request failed.
    #[error("Failed to fetch {path} after {attempts} attempts: {last_error}")]
    RequestExhausted {
        path: String,
        attempts: u32,
        last_error: String,
    },

    /// The API returned a status that is not worth retrying.
    #[error("API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The API has no image with this name.
    #[error("Image not found: {0}")]
    NotFound(String),

    /// The crop selection could not be turned into an image.
    #[error("Failed to render crop selection: {0}")]
    Rendering(String),

    /// A crop session is already open.
    #[error("A crop session is already open for {current}")]
    SessionActive { current: String },

    /// No crop session is open.
    #[error("No crop session is open")]
    NoSession,

    /// The response from the API was missing expected fields.
    #[error("{0}")]
    InvalidResponse(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// Image decoding or encoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CropError>;
