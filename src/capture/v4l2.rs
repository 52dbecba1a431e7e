//! V4L2-backed frame source.

use std::os::fd::BorrowedFd;
use std::path::Path;

use tracing::{info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::{CaptureStream, Stream};
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::frame::{FrameBuffer, PixelFormat};
use crate::capture::source::FrameSource;
use crate::error::{CameraError, Result};
use crate::CaptureConfig;

/// V4L2 fourcc code for a pixel format.
pub fn fourcc_of(format: PixelFormat) -> FourCC {
    match format {
        PixelFormat::Yu12 => FourCC::new(b"YU12"),
        PixelFormat::Yv12 => FourCC::new(b"YV12"),
        PixelFormat::Nv12 => FourCC::new(b"NV12"),
        PixelFormat::Nv21 => FourCC::new(b"NV21"),
        PixelFormat::Yuyv => FourCC::new(b"YUYV"),
        PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
    }
}

/// Frame source over a memory-mapped V4L2 capture stream.
pub struct V4l2Source {
    device: Box<Device>,
    stream: MmapStream<'static>,
    sequence: u64,
}

impl V4l2Source {
    /// Open the configured device, program the capture format and start
    /// a memory-mapped stream.
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        info!(device = %config.device, "opening V4L2 capture device");

        let device = Box::new(Device::with_path(&config.device)?);

        let caps = device.query_caps()?;
        info!("device: {} ({})", caps.card, caps.driver);
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CameraError::InvalidArgument(
                "device does not support video capture",
            ));
        }

        let mut fmt = device.format()?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = fourcc_of(config.format);
        let actual = device.set_format(&fmt)?;
        if actual.fourcc != fmt.fourcc {
            return Err(CameraError::UnsupportedFormat(config.format));
        }
        if actual.width != config.width || actual.height != config.height {
            warn!(
                "driver adjusted resolution to {}x{}",
                actual.width, actual.height
            );
        }

        let mut stream =
            MmapStream::with_buffers(&device, Type::VideoCapture, config.buffer_count)?;
        stream.start()?;
        info!(buffers = config.buffer_count, "capture stream started");

        Ok(Self {
            device,
            stream,
            sequence: 0,
        })
    }

    /// Frames dequeued so far.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl FrameSource for V4l2Source {
    fn wait_fd(&self) -> Option<BorrowedFd<'_>> {
        let fd = self.device.handle().fd();
        // SAFETY: the descriptor belongs to `self.device` and stays open
        // for the lifetime of the borrow handed out here.
        Some(unsafe { BorrowedFd::borrow_raw(fd) })
    }

    fn acquire_frame(&mut self, frame: &mut FrameBuffer) -> Result<()> {
        let (buf, meta) = self.stream.next()?;
        let used = (meta.bytesused as usize).min(buf.len());

        let dst = frame.bytes_mut();
        let n = dst.len().min(used);
        dst[..n].copy_from_slice(&buf[..n]);
        if n < dst.len() {
            warn!(got = used, want = dst.len(), "short frame from driver");
        }
        self.sequence += 1;
        Ok(())
    }
}

/// Scan `/dev/video0..9` for a capture device offering `format`.
pub fn find_device(format: PixelFormat) -> Result<String> {
    let wanted = fourcc_of(format);
    info!(?format, "auto-detecting capture devices");

    for i in 0..10 {
        let path = format!("/dev/video{i}");
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            continue;
        }
        if let Ok(formats) = dev.enum_formats() {
            if formats.iter().any(|f| f.fourcc == wanted) {
                info!("found {:?} device: {} - {}", format, path, caps.card);
                return Ok(path);
            }
        }
    }

    Err(CameraError::InvalidArgument(
        "no suitable capture device found",
    ))
}
