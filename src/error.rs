use axum::http::StatusCode;
use std::fmt;
use std::io;

/// Request-scoped pipeline error. None of these are fatal to the serving
/// process; each request fails independently.
#[derive(Debug)]
pub enum RenderError {
    /// Missing or invalid request parameters / image source
    Input(String),
    /// Image URL could not be fetched
    Fetch(reqwest::Error),
    /// Fetched or uploaded bytes are not a decodable image
    Decode(image::ImageError),
    Io(io::Error),
    /// External encoder failed (spawn failure or non-zero exit)
    Encode(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Input(msg) => write!(f, "Input error: {}", msg),
            RenderError::Fetch(e) => write!(f, "Fetch error: {}", e),
            RenderError::Decode(e) => write!(f, "Decode error: {}", e),
            RenderError::Io(e) => write!(f, "IO error: {}", e),
            RenderError::Encode(msg) => write!(f, "Encode error: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Input(_) => None,
            RenderError::Fetch(e) => Some(e),
            RenderError::Decode(e) => Some(e),
            RenderError::Io(e) => Some(e),
            RenderError::Encode(_) => None,
        }
    }
}

impl From<reqwest::Error> for RenderError {
    fn from(err: reqwest::Error) -> Self {
        RenderError::Fetch(err)
    }
}

impl From<image::ImageError> for RenderError {
    fn from(err: image::ImageError) -> Self {
        RenderError::Decode(err)
    }
}

impl From<io::Error> for RenderError {
    fn from(err: io::Error) -> Self {
        RenderError::Io(err)
    }
}

impl RenderError {
    /// HTTP status this error maps to at the handler boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            RenderError::Input(_) | RenderError::Decode(_) => StatusCode::BAD_REQUEST,
            RenderError::Fetch(_) => StatusCode::BAD_GATEWAY,
            RenderError::Io(_) | RenderError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RenderError> for (StatusCode, String) {
    fn from(err: RenderError) -> Self {
        (err.status(), err.to_string())
    }
}
