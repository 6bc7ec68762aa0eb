use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Invalid image path")]
    InvalidPath,

    #[error("Image not found")]
    NotFound,

    #[error("Rotation must be a multiple of 90 degrees, got {0}")]
    UnsupportedRotation(i32),

    #[error("No pending edit for this image")]
    NoPendingEdit,
}
