use thiserror::Error;

/// Failure to allocate a capture target.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("could not allocate capture target: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure inside a preview session (decode, detect, render).
#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("could not decode photo: {0}")]
    Decode(#[from] image::ImageError),

    #[error("no face detected")]
    NoFace,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown detector kind: {0}")]
    UnknownDetector(String),

    #[error("detector '{0}' requires the '{1}' feature")]
    FeatureDisabled(String, &'static str),

    #[error("could not load model {0}")]
    Model(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid tessellation file: {0}")]
    Tessellation(#[from] serde_json::Error),
}
