use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
