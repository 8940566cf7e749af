use thiserror::Error;

/// Errors raised while setting up the reconstruction.
///
/// Nothing in the per-event path returns an error: an event that cannot be
/// reconstructed simply yields no candidates. These variants are reserved for
/// initialization, where a bad table or geometry must abort the run.
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid geometry for {detector}: {message}")]
    Geometry { detector: String, message: String },

    #[error("invalid response function '{name}': {message}")]
    Response { name: String, message: String },

    #[error("malformed calibration table at line {line}: {message}")]
    Table { line: usize, message: String },

    #[error("invalid alignment settings: {0}")]
    Alignment(String),
}

impl TrackingError {
    pub fn config(message: impl Into<String>) -> Self {
        TrackingError::Config(message.into())
    }

    pub fn geometry(detector: impl Into<String>, message: impl Into<String>) -> Self {
        TrackingError::Geometry { detector: detector.into(), message: message.into() }
    }

    pub fn response(name: impl Into<String>, message: impl Into<String>) -> Self {
        TrackingError::Response { name: name.into(), message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, TrackingError>;
