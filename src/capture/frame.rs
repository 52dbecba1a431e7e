//! Frame buffer and pixel format handling.

use serde::{Deserialize, Serialize};

use crate::error::{CameraError, Result};

/// Pixel formats known to the capture core.
///
/// Only the 4:2:0 family can back a [`FrameBuffer`]; the packed and
/// compressed formats exist so sources can name what a device produces
/// and callers get a clean `UnsupportedFormat` instead of a silent
/// misallocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Planar 4:2:0, U plane before V (I420).
    Yu12,
    /// Planar 4:2:0, V plane before U.
    Yv12,
    /// Semiplanar 4:2:0, interleaved UV pairs after the luma plane.
    Nv12,
    /// Semiplanar 4:2:0, interleaved VU pairs after the luma plane.
    Nv21,
    /// Packed 4:2:2. Common webcam output, not storable here.
    Yuyv,
    /// Motion JPEG. Compressed; decoding belongs to an external collaborator.
    Mjpeg,
}

impl PixelFormat {
    /// Frame length in bytes for the given resolution, or `None` when the
    /// format is outside the supported 12-bits-per-pixel 4:2:0 family.
    pub fn frame_size(self, width: u32, height: u32) -> Option<usize> {
        match self {
            Self::Yu12 | Self::Yv12 | Self::Nv12 | Self::Nv21 => {
                Some(width as usize * height as usize * 12 / 8)
            }
            Self::Yuyv | Self::Mjpeg => None,
        }
    }

    /// Whether `self` and `other` are the two semiplanar layouts that
    /// differ only in chroma byte order.
    pub fn chroma_swapped(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Nv12, Self::Nv21) | (Self::Nv21, Self::Nv12)
        )
    }
}

/// Owned storage for one raw frame.
///
/// The buffer is exclusively owned by the device controller and shared
/// with the capture worker behind a mutex; it is only reallocated while
/// capture is stopped.
#[derive(Debug)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Allocate zeroed storage for one frame of `format` at the given
    /// resolution.
    pub fn allocate(width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CameraError::InvalidArgument("zero-sized resolution"));
        }
        let size = format
            .frame_size(width, height)
            .ok_or(CameraError::UnsupportedFormat(format))?;
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| CameraError::OutOfMemory(size))?;
        data.resize(size, 0);
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Frame length in bytes; zero after [`release`](Self::release).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view for the producer filling the frame.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Free the storage. Idempotent; the buffer reads as empty afterwards.
    pub fn release(&mut self) {
        self.data = Vec::new();
    }

    /// Format-aware copy into a caller-supplied buffer.
    ///
    /// A matching `format` yields a byte-for-byte copy. Requesting the
    /// opposite semiplanar layout (NV12 vs NV21) copies the luma plane as
    /// is and swaps each adjacent chroma byte pair. Any other combination
    /// is the job of a full converter and is rejected here.
    pub fn copy_out(&self, dest: &mut [u8], format: PixelFormat) -> Result<()> {
        if self.data.is_empty() {
            return Err(CameraError::NoFrame);
        }
        if dest.len() != self.data.len() {
            return Err(CameraError::InvalidArgument(
                "destination size does not match frame size",
            ));
        }
        if format == self.format {
            dest.copy_from_slice(&self.data);
            return Ok(());
        }
        if self.format.chroma_swapped(format) {
            let luma = self.width as usize * self.height as usize;
            dest[..luma].copy_from_slice(&self.data[..luma]);
            for (dst, src) in dest[luma..]
                .chunks_exact_mut(2)
                .zip(self.data[luma..].chunks_exact(2))
            {
                dst[0] = src[1];
                dst[1] = src[0];
            }
            return Ok(());
        }
        Err(CameraError::UnsupportedFormat(format))
    }
}
