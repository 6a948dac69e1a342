use thiserror::Error;

#[derive(Error, Debug)]
pub enum AtrioError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Control socket error: {0}")]
    Control(String),

    #[error("Other error: {0}")]
    Other(String),
}
