use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes reported by the command channel and the device coordinator.
///
/// Channel errors are propagated verbatim; the coordinator only adds
/// `Parameter` for precondition violations it detects itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DeviceError {
    #[error("device error")]
    Device,
    #[error("invalid parameter")]
    Parameter,
    #[error("operation not supported")]
    Unsupported,
    #[error("command timed out")]
    Timeout,
    #[error("no connection to modem")]
    NoConnection,
}

pub type DeviceResult<T> = Result<T, DeviceError>;
