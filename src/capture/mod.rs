pub mod frame;
pub mod mock;
pub mod source;
pub mod v4l2;

pub use frame::{FrameBuffer, PixelFormat};
pub use source::FrameSource;
pub use v4l2::V4l2Source;
