//! Device controller: the public state machine over the capture worker.

pub(crate) mod control;
pub(crate) mod sync;
pub(crate) mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::capture::frame::{FrameBuffer, PixelFormat};
use crate::capture::source::FrameSource;
use crate::device::control::{ControlMessage, ControlSender};
use crate::device::sync::{lock, Rendezvous};
use crate::device::worker::{CaptureLoop, WorkerExit};
use crate::error::{CameraError, Result};

/// Lifecycle states of a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Freshly constructed; `initialize` has not run.
    Constructed,
    /// Ready to start capturing.
    Initialized,
    /// The capture worker is delivering frames.
    Started,
    /// Capture has run at least once and is currently stopped.
    Stopped,
}

/// State shared between the controller and the capture worker.
pub(crate) struct Shared {
    /// The current frame. `None` until the first successful start.
    pub frame: Mutex<Option<FrameBuffer>>,
    /// Frames delivered since the last start.
    pub frames_captured: AtomicU64,
    /// Opens once the worker is listening on its control channel.
    pub loop_running: Rendezvous,
    /// Set while a one-shot still capture is underway.
    pub still_capture: Rendezvous,
    /// Write end of the control channel, parked here by the worker.
    pub sender: Mutex<Option<ControlSender>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            frame: Mutex::new(None),
            frames_captured: AtomicU64::new(0),
            loop_running: Rendezvous::new(),
            still_capture: Rendezvous::new(),
            sender: Mutex::new(None),
        }
    }
}

/// Fences `stop_capture` while a still picture is being taken.
///
/// Acquired via [`DeviceController::begin_still_capture`]; the flag is
/// cleared on drop, so panicking or erroring still-capture paths cannot
/// leave a stop blocked forever.
pub struct StillCaptureGuard {
    shared: Arc<Shared>,
}

impl Drop for StillCaptureGuard {
    fn drop(&mut self) {
        self.shared.still_capture.clear();
    }
}

/// Owns the capture worker, the frame buffer and the state machine.
///
/// Exactly one controller exists per device; whichever layer manages the
/// device's lifecycle owns it as a plain value.
pub struct DeviceController<S> {
    state: DeviceState,
    source: Option<S>,
    shared: Option<Arc<Shared>>,
    worker: Option<JoinHandle<WorkerExit<S>>>,
    wait_timeout: Option<Duration>,
}

impl<S: FrameSource + 'static> DeviceController<S> {
    /// Wrap a frame source. The controller starts in `Constructed` state.
    pub fn new(source: S) -> Self {
        Self {
            state: DeviceState::Constructed,
            source: Some(source),
            shared: None,
            worker: None,
            wait_timeout: None,
        }
    }

    /// Upper bound for one worker wait. `None` or zero waits indefinitely.
    pub fn set_wait_timeout(&mut self, timeout: Option<Duration>) {
        self.wait_timeout = timeout.filter(|d| !d.is_zero());
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Frames delivered since the last `start_capture`.
    pub fn frames_captured(&self) -> u64 {
        self.shared
            .as_ref()
            .map_or(0, |s| s.frames_captured.load(Ordering::Acquire))
    }

    /// Move the device into `Initialized`. Calling it again is a warned
    /// no-op success.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state != DeviceState::Constructed {
            warn!(state = ?self.state, "device is already initialized");
            return Ok(());
        }
        self.shared = Some(Arc::new(Shared::new()));
        self.state = DeviceState::Initialized;
        debug!("device initialized");
        Ok(())
    }

    /// Allocate the frame buffer and start the capture worker.
    ///
    /// `one_burst` makes the worker exit after delivering a single frame.
    /// A previous worker that died on its own is reaped here first and
    /// its exit error returned, so a dead worker never masquerades as a
    /// running capture.
    pub fn start_capture(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        one_burst: bool,
    ) -> Result<()> {
        self.reap_finished_worker()?;
        match self.state {
            DeviceState::Constructed => return Err(CameraError::NotInitialized),
            DeviceState::Started => return Err(CameraError::AlreadyStarted),
            DeviceState::Initialized | DeviceState::Stopped => {}
        }

        // Validates the format and resolution; the old buffer is released
        // before the new one is installed. Safe because the worker is not
        // running in any state that reaches this point.
        let buffer = FrameBuffer::allocate(width, height, format)?;
        let shared = self.shared.as_ref().ok_or(CameraError::NotInitialized)?;
        {
            let mut guard = lock(&shared.frame);
            if let Some(old) = guard.as_mut() {
                old.release();
            }
            *guard = Some(buffer);
        }
        shared.frames_captured.store(0, Ordering::Release);
        shared.loop_running.clear();

        let source = self
            .source
            .take()
            .ok_or(CameraError::WorkerGone("frame source was not returned"))?;
        let capture_loop =
            CaptureLoop::new(source, Arc::clone(shared), one_burst, self.wait_timeout);
        let handle = thread::Builder::new()
            .name("capture-worker".into())
            .spawn(move || capture_loop.run())?;

        self.worker = Some(handle);
        self.state = DeviceState::Started;
        info!(width, height, ?format, one_burst, "capture started");
        Ok(())
    }

    /// Stop the capture worker and reclaim its resources.
    ///
    /// Blocks until any in-flight still capture finishes and the worker
    /// has reached its wait point, then sends `Stop` and joins. Calling
    /// this when capture is not running is a no-op success.
    pub fn stop_capture(&mut self) -> Result<()> {
        self.reap_finished_worker()?;
        if self.state != DeviceState::Started {
            warn!(state = ?self.state, "device is not started, nothing to stop");
            return Ok(());
        }
        let shared = self.shared.as_ref().ok_or(CameraError::NotInitialized)?;

        shared.still_capture.wait_until_clear();
        shared.loop_running.wait_until_set();

        // A worker that failed before creating its channel leaves no
        // sender behind; joining below surfaces its error.
        if let Some(mut tx) = lock(&shared.sender).take() {
            tx.send(ControlMessage::Stop)?;
        }

        let handle = self
            .worker
            .take()
            .ok_or(CameraError::WorkerGone("worker handle missing"))?;
        let exit = handle
            .join()
            .map_err(|_| CameraError::WorkerGone("capture worker panicked"))?;
        self.source = Some(exit.source);
        // Read end follows the already-dropped sender; both channel ends
        // close together here.
        drop(exit.control);

        self.state = DeviceState::Stopped;
        info!("capture stopped, worker joined");
        exit.result
    }

    /// Copy the most recently captured frame into `dest`, converting to
    /// `format` where the buffer supports it.
    ///
    /// Never blocks on the worker beyond the buffer lock; the consumer
    /// may see the same frame twice or skip one.
    pub fn read_current_frame(&self, dest: &mut [u8], format: PixelFormat) -> Result<()> {
        if self.state != DeviceState::Started {
            return Err(CameraError::NotStarted);
        }
        let shared = self.shared.as_ref().ok_or(CameraError::NotInitialized)?;
        if shared.frames_captured.load(Ordering::Acquire) == 0 {
            return Err(CameraError::NoFrame);
        }
        let guard = lock(&shared.frame);
        let frame = guard.as_ref().ok_or(CameraError::NoFrame)?;
        frame.copy_out(dest, format)
    }

    /// Fence the device for a one-shot still capture.
    ///
    /// At most one guard exists at a time; `stop_capture` blocks until
    /// the guard is dropped.
    pub fn begin_still_capture(&self) -> Result<StillCaptureGuard> {
        if self.state != DeviceState::Started {
            return Err(CameraError::NotStarted);
        }
        let shared = self.shared.as_ref().ok_or(CameraError::NotInitialized)?;
        if !shared.still_capture.try_set() {
            return Err(CameraError::StillInProgress);
        }
        debug!("still capture fence raised");
        Ok(StillCaptureGuard {
            shared: Arc::clone(shared),
        })
    }

    /// Fold a worker that exited on its own (one-burst completion or an
    /// internal error) back into `Stopped`, surfacing its exit error.
    fn reap_finished_worker(&mut self) -> Result<()> {
        if self.state != DeviceState::Started
            || !self.worker.as_ref().is_some_and(|h| h.is_finished())
        {
            return Ok(());
        }
        let handle = self
            .worker
            .take()
            .ok_or(CameraError::WorkerGone("worker handle missing"))?;
        let exit = handle
            .join()
            .map_err(|_| CameraError::WorkerGone("capture worker panicked"))?;
        self.source = Some(exit.source);
        if let Some(shared) = self.shared.as_ref() {
            lock(&shared.sender).take();
        }
        drop(exit.control);
        self.state = DeviceState::Stopped;
        match &exit.result {
            Ok(()) => debug!("finished worker reaped"),
            Err(e) => warn!(error = %e, "worker terminated with error"),
        }
        exit.result
    }
}
