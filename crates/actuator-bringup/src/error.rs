use dxl_transport::TransportError;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with the manager configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no robot file path configured")]
    MissingRobotFile,
    #[error("reading config {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("parsing config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures reported by a [`crate::Controller`] implementation.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to load {what} from {path}: {reason}")]
    Load {
        what: &'static str,
        path: PathBuf,
        reason: String,
    },
    #[error("controller is not initialized")]
    NotInitialized,
    #[error("device initialization failed: {0}")]
    DeviceInit(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Why a button-triggered recovery stopped before resuming the control loop.
#[derive(Debug, Error)]
pub enum RecoveryAbort {
    #[error("could not open actuator bus: {0}")]
    TransportOpen(#[source] TransportError),
    #[error("power-on could not reach the bus: {0}")]
    Transport(#[source] TransportError),
    #[error("power-on gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: TransportError,
    },
    #[error("device re-initialization failed: {0}")]
    DeviceInit(#[source] ControllerError),
}

/// Fatal startup failures; the process exits non-zero on these.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("controller initialization failed: {0}")]
    ControllerInit(#[source] ControllerError),
}
