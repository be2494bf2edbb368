use thiserror::Error;

use crate::DeviceId;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to open port {port}: {reason}")]
    PortOpen { port: String, reason: String },
    #[error("transport is not open")]
    NotOpen,
    #[error("operation not supported on this backend: {0}")]
    Unsupported(&'static str),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("timeout")]
    Timeout,
    #[error("invalid packet: {0}")]
    InvalidPacket(&'static str),
    #[error("device {device} reported error code {code:#04x}")]
    Status { device: DeviceId, code: u8 },
}
