use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}
