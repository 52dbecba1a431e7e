//! Error taxonomy for the capture core.

use thiserror::Error;

use crate::capture::frame::PixelFormat;

/// Errors surfaced by the capture core.
///
/// State-precondition and argument errors are returned synchronously and
/// leave the device in its prior state. Errors raised inside the capture
/// worker terminate only the worker; the controller reports them on the
/// next `start_capture`/`stop_capture` call.
#[derive(Debug, Error)]
pub enum CameraError {
    /// `initialize` has not been called yet.
    #[error("device is not initialized")]
    NotInitialized,

    /// `start_capture` was called while capture is already running.
    #[error("device is already started")]
    AlreadyStarted,

    /// The operation requires capture to be running.
    #[error("device is not started")]
    NotStarted,

    /// The requested pixel format is outside the supported 4:2:0 set.
    #[error("unsupported pixel format {0:?}")]
    UnsupportedFormat(PixelFormat),

    /// A caller-supplied argument is invalid (zero resolution, wrong
    /// destination size, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// No frame has been captured since the last `start_capture`.
    #[error("no frame has been captured yet")]
    NoFrame,

    /// Frame buffer allocation failed.
    #[error("frame buffer allocation of {0} bytes failed")]
    OutOfMemory(usize),

    /// A still capture is already in progress.
    #[error("still capture already in progress")]
    StillInProgress,

    /// The worker received a malformed control message.
    #[error("unexpected control message byte {0:#04x}")]
    Protocol(u8),

    /// The capture worker died unexpectedly.
    #[error("capture worker terminated: {0}")]
    WorkerGone(&'static str),

    /// Underlying device or channel I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, CameraError>;
