//! Frame acquisition capability injected into the capture worker.

use std::os::fd::BorrowedFd;

use crate::capture::frame::FrameBuffer;
use crate::error::Result;

/// A producer of raw frames the capture worker can wait on.
///
/// Implementations wrap a physical device ([`V4l2Source`]) or a virtual
/// one ([`MockSource`]). The worker polls [`wait_fd`] together with its
/// control channel and calls [`acquire_frame`] once the descriptor
/// signals readiness; acquisition failures terminate the worker.
///
/// [`V4l2Source`]: crate::capture::v4l2::V4l2Source
/// [`MockSource`]: crate::capture::mock::MockSource
/// [`wait_fd`]: FrameSource::wait_fd
/// [`acquire_frame`]: FrameSource::acquire_frame
pub trait FrameSource: Send {
    /// Descriptor that becomes readable when a frame can be acquired.
    ///
    /// `None` means there is nothing to wait on besides the control
    /// channel; the worker then only ever observes timeouts and stop
    /// messages.
    fn wait_fd(&self) -> Option<BorrowedFd<'_>>;

    /// Fill `frame` with the next available frame's bytes.
    ///
    /// Called only after [`wait_fd`](FrameSource::wait_fd) signalled
    /// readiness, so this should not block for long.
    fn acquire_frame(&mut self, frame: &mut FrameBuffer) -> Result<()>;
}
