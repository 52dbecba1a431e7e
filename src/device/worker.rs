//! Capture worker: the wait/dispatch loop behind `DeviceController`.

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, error, trace};

use crate::capture::source::FrameSource;
use crate::device::control::{self, ControlMessage, ControlReceiver};
use crate::device::sync::lock;
use crate::device::Shared;
use crate::error::{CameraError, Result};

/// Outcome of one wait on `{source fd, control fd}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    /// The source descriptor is readable; a frame can be acquired.
    Ready,
    /// Nothing became ready within the configured timeout.
    Timeout,
    /// A stop message arrived.
    Stop,
}

/// What the worker thread hands back when it exits.
///
/// The control receiver rides along so the read end outlives the worker;
/// the controller drops both channel ends together after joining, which
/// also keeps a late stop message from ever hitting a closed pipe.
pub(crate) struct WorkerExit<S> {
    pub source: S,
    pub control: Option<ControlReceiver>,
    pub result: Result<()>,
}

/// The capture loop state carried by the worker thread.
pub(crate) struct CaptureLoop<S> {
    source: S,
    shared: Arc<Shared>,
    one_burst: bool,
    timeout: Option<Duration>,
}

impl<S: FrameSource> CaptureLoop<S> {
    pub fn new(source: S, shared: Arc<Shared>, one_burst: bool, timeout: Option<Duration>) -> Self {
        Self {
            source,
            shared,
            one_burst,
            timeout,
        }
    }

    /// Thread entry point.
    ///
    /// Establishes the control channel, opens the `loop_running` gate and
    /// pumps frames until a stop message or an error. The gate opens on
    /// the failure path too so a racing `stop_capture` never blocks on a
    /// worker that died before listening.
    pub fn run(mut self) -> WorkerExit<S> {
        let mut control = match control::channel() {
            Ok((tx, rx)) => {
                *lock(&self.shared.sender) = Some(tx);
                rx
            }
            Err(e) => {
                error!(error = %e, "unable to create control channel");
                self.shared.loop_running.set();
                return WorkerExit {
                    source: self.source,
                    control: None,
                    result: Err(e.into()),
                };
            }
        };
        self.shared.loop_running.set();
        debug!("capture worker running");

        let result = self.pump(&mut control);
        if let Err(e) = &result {
            error!(error = %e, "capture worker exiting on error");
        }
        WorkerExit {
            source: self.source,
            control: Some(control),
            result,
        }
    }

    fn pump(&mut self, control: &mut ControlReceiver) -> Result<()> {
        loop {
            match self.wait(control)? {
                Wait::Stop => {
                    debug!("stop message received");
                    return Ok(());
                }
                Wait::Timeout => trace!("wait timed out, retrying"),
                Wait::Ready => {
                    {
                        let mut guard = lock(&self.shared.frame);
                        let frame = guard.as_mut().ok_or(CameraError::NoFrame)?;
                        self.source.acquire_frame(frame)?;
                    }
                    self.shared.frames_captured.fetch_add(1, Ordering::Release);
                    if self.one_burst {
                        debug!("one-burst capture complete");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Block until the source or the control channel becomes readable.
    /// The control fd is checked first, so a stop beats simultaneous
    /// source readiness.
    fn wait(&self, control: &mut ControlReceiver) -> Result<Wait> {
        let timeout = poll_timeout(self.timeout);
        loop {
            let control_ready = {
                let mut fds = Vec::with_capacity(2);
                fds.push(PollFd::new(control.as_fd(), PollFlags::POLLIN));
                if let Some(fd) = self.source.wait_fd() {
                    fds.push(PollFd::new(fd, PollFlags::POLLIN));
                }
                match poll(&mut fds, timeout) {
                    Err(Errno::EINTR) => continue,
                    Err(e) => {
                        return Err(CameraError::Io(io::Error::from_raw_os_error(e as i32)))
                    }
                    Ok(0) => return Ok(Wait::Timeout),
                    Ok(_) => fds[0].revents().is_some_and(|r| !r.is_empty()),
                }
            };
            return if control_ready {
                match control.recv()? {
                    ControlMessage::Stop => Ok(Wait::Stop),
                }
            } else {
                Ok(Wait::Ready)
            };
        }
    }
}

/// `None` (or zero) means wait indefinitely; durations beyond the poll
/// range clamp to the maximum.
fn poll_timeout(timeout: Option<Duration>) -> PollTimeout {
    match timeout {
        None => PollTimeout::NONE,
        Some(d) => u16::try_from(d.as_millis())
            .map(PollTimeout::from)
            .unwrap_or(PollTimeout::MAX),
    }
}
