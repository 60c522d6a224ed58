use thiserror::Error;

pub type BdeResult<T> = Result<T, BdeError>;

#[derive(Debug, Error)]
pub enum BdeError {
    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
