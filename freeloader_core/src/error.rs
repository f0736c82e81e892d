use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FreeloaderError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("communication error: {0}")]
    Communication(String),
    #[error("malformed reading: {0}")]
    Parse(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("export error: {0}")]
    Export(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing rig")]
    MissingRig,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
