use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    Exists,

    #[error("in use by other state")]
    Busy,

    #[error("bounds exceeded: {0}")]
    Overflow(String),

    #[error("out of resources: {0}")]
    Resource(String),

    #[error("next hop unreachable")]
    Unreachable,
}

pub type Result<T> = std::result::Result<T, Error>;
