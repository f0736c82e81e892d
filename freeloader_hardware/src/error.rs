use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("open {port}: {reason}")]
    Open { port: String, reason: String },
    #[error("device timeout")]
    Timeout,
    #[error("link closed")]
    Closed,
    #[error("checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    Checksum { expected: u8, actual: u8 },
    #[error("malformed packet: {0}")]
    Packet(String),
    #[error("servo {id} reported error flags {flags:#04x}")]
    Status { id: u8, flags: u8 },
    #[error("servo bus: {0}")]
    Bus(String),
    #[error("value out of range: {0}")]
    OutOfRange(String),
    #[error("io: {0}")]
    Io(#[source] std::io::Error),
}

impl From<std::io::Error> for HwError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => HwError::Timeout,
            std::io::ErrorKind::UnexpectedEof => HwError::Closed,
            _ => HwError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, HwError>;
