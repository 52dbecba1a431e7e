//! Mock frame source for testing without hardware.
//!
//! Frame availability is driven through an anonymous pipe so tests
//! exercise the worker's real poll path: the worker blocks until the
//! test fires a [`FrameTrigger`], exactly like a driver signalling a
//! filled buffer.

use std::io::{self, PipeReader, PipeWriter, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};

use crate::capture::frame::FrameBuffer;
use crate::capture::source::FrameSource;
use crate::error::{CameraError, Result};

/// Chroma fill bytes, chosen so a chroma-order swap is visible.
pub const CHROMA_EVEN: u8 = 0x11;
pub const CHROMA_ODD: u8 = 0x22;

/// Virtual frame source driven by a [`FrameTrigger`].
pub struct MockSource {
    ready: PipeReader,
    sequence: u64,
    fail_after: Option<u64>,
}

/// Test-side handle that makes one frame available per call.
pub struct FrameTrigger {
    signal: PipeWriter,
}

impl MockSource {
    /// Create a mock source and the trigger that feeds it.
    pub fn new() -> io::Result<(Self, FrameTrigger)> {
        let (ready, signal) = io::pipe()?;
        Ok((
            Self {
                ready,
                sequence: 0,
                fail_after: None,
            },
            FrameTrigger { signal },
        ))
    }

    /// Make `acquire_frame` fail once `count` frames have been delivered.
    #[must_use]
    pub fn fail_after(mut self, count: u64) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Frames delivered so far.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl FrameTrigger {
    /// Signal that one frame is available.
    pub fn trigger(&mut self) -> io::Result<()> {
        self.signal.write_all(&[1])
    }

    /// Signal `count` frames at once.
    pub fn trigger_many(&mut self, count: usize) -> io::Result<()> {
        for _ in 0..count {
            self.trigger()?;
        }
        Ok(())
    }
}

impl FrameSource for MockSource {
    fn wait_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.ready.as_fd())
    }

    fn acquire_frame(&mut self, frame: &mut FrameBuffer) -> Result<()> {
        // Consume exactly the readiness token that woke the worker.
        let mut token = [0u8; 1];
        self.ready.read_exact(&mut token)?;

        if self.fail_after.is_some_and(|limit| self.sequence >= limit) {
            return Err(CameraError::Io(io::Error::other("injected source failure")));
        }

        let luma = frame.width() as usize * frame.height() as usize;
        let seq = self.sequence;
        let data = frame.bytes_mut();
        // Luma carries the sequence number, chroma a fixed byte pattern.
        data[..luma].fill((seq & 0xff) as u8);
        for (i, byte) in data[luma..].iter_mut().enumerate() {
            *byte = if i % 2 == 0 { CHROMA_EVEN } else { CHROMA_ODD };
        }
        self.sequence += 1;
        Ok(())
    }
}
