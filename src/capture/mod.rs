pub mod buffer;
pub mod frame;
pub mod gst_source;
pub mod source;

pub use buffer::FrameBuffer;
pub use frame::Frame;
pub use gst_source::GstFrameSource;
pub use source::{FrameSource, HealthMonitor, StreamHealth};
