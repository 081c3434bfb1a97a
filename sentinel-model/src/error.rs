use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("interface name exceeds 16 bytes: {0:?}")]
    InterfaceNameTooLong(String),

    #[error("payload exceeds maximum size of {max} bytes (got {got})")]
    PayloadTooLarge { max: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, ModelError>;
