//! Control channel used to interrupt the worker's blocking wait.
//!
//! A self-pipe: the controller writes a one-byte message into the write
//! end, the worker polls the read end alongside the source descriptor.
//! The worker creates the pair on entry and hands the sender back to the
//! controller through shared state; both ends are dropped together when
//! the controller reclaims the worker.

use std::io::{self, PipeReader, PipeWriter, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};

use crate::error::{CameraError, Result};

/// Messages understood by the capture worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlMessage {
    /// Terminate the capture loop.
    Stop,
}

impl ControlMessage {
    const STOP: u8 = 0x53;

    fn to_byte(self) -> u8 {
        match self {
            Self::Stop => Self::STOP,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            Self::STOP => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Write end of the control channel, held by the controller.
pub(crate) struct ControlSender {
    pipe: PipeWriter,
}

/// Read end of the control channel, polled by the worker.
pub(crate) struct ControlReceiver {
    pipe: PipeReader,
}

/// Create a connected sender/receiver pair.
pub(crate) fn channel() -> io::Result<(ControlSender, ControlReceiver)> {
    let (reader, writer) = io::pipe()?;
    Ok((
        ControlSender { pipe: writer },
        ControlReceiver { pipe: reader },
    ))
}

impl ControlSender {
    pub fn send(&mut self, msg: ControlMessage) -> Result<()> {
        self.pipe.write_all(&[msg.to_byte()])?;
        Ok(())
    }
}

impl ControlReceiver {
    /// Drain exactly one message. A byte that is not a known message is
    /// a protocol error and terminates the worker.
    pub fn recv(&mut self) -> Result<ControlMessage> {
        let mut byte = [0u8; 1];
        self.pipe.read_exact(&mut byte)?;
        ControlMessage::from_byte(byte[0]).ok_or(CameraError::Protocol(byte[0]))
    }

    pub fn as_fd(&self) -> BorrowedFd<'_> {
        self.pipe.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_round_trips() {
        let (mut tx, mut rx) = channel().expect("pipe");
        tx.send(ControlMessage::Stop).expect("send");
        assert_eq!(rx.recv().expect("recv"), ControlMessage::Stop);
    }

    #[test]
    fn unknown_byte_is_a_protocol_error() {
        let (tx, mut rx) = channel().expect("pipe");
        let mut raw = tx.pipe;
        raw.write_all(&[0xff]).expect("write");
        assert!(matches!(rx.recv(), Err(CameraError::Protocol(0xff))));
    }

    #[test]
    fn closed_sender_surfaces_as_io_error() {
        let (tx, mut rx) = channel().expect("pipe");
        drop(tx);
        assert!(matches!(rx.recv(), Err(CameraError::Io(_))));
    }
}
