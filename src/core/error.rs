use thiserror::Error;

use crate::infrastructure::browser::SurfaceError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Account source error: {0}")]
    AccountSource(String),

    #[error("Automation surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

pub type UnitResult = AppResult<()>;
