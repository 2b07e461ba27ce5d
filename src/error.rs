//! Error types for cmdwatch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("channel subscribe failed: {0}")]
    Subscribe(String),

    #[error("request id must not be empty")]
    EmptyRequestId,

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
