use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("no such user")]
    UserNotFound,
    #[error("directory unreachable: {0}")]
    Unreachable(String),
    #[error("invalid directory configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, DirectoryError>;
