use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Controller error: {0}")]
    Controller(#[from] hlsgrab_engine::ControllerError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
