pub mod encode;
pub mod frame;
pub mod ingest;
pub mod source;

pub use encode::JpegPreviewEncoder;
pub use frame::{Frame, FrameRead, FrameSource, PreviewEncoder};
pub use ingest::{VideoDevices, VideoExit, VideoIngestLoop};
pub use source::{FrameInput, RawVideoSource};
