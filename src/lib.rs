//! Capture-device control core.
//!
//! Sits between a raw frame producer (a V4L2 device, or a mock in tests)
//! and a consumer that asks for "the current frame" on its own schedule.
//! A dedicated worker thread pulls frames from the source and keeps the
//! most recent one available; the [`DeviceController`] state machine
//! owns the worker, the frame buffer and the stop handshake.

pub mod capture;
pub mod device;
pub mod error;

use serde::{Deserialize, Serialize};

pub use capture::frame::{FrameBuffer, PixelFormat};
pub use capture::source::FrameSource;
pub use capture::v4l2::V4l2Source;
pub use device::{DeviceController, DeviceState, StillCaptureGuard};
pub use error::{CameraError, Result};

/// Capture configuration for the V4L2 path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Device node, e.g. `/dev/video0`. Empty triggers auto-detection.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Number of mmap buffers to request from the driver.
    pub buffer_count: u32,
    /// Worker wait timeout in milliseconds; 0 waits indefinitely.
    pub wait_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".into(),
            width: 640,
            height: 480,
            format: PixelFormat::Nv12,
            buffer_count: 4,
            wait_timeout_ms: 0,
        }
    }
}
