pub mod buffer;
pub mod capture;
pub mod ingest;

pub use buffer::AudioBuffer;
pub use capture::{AudioStream, CpalAudioInput};
pub use ingest::KeywordIngestLoop;
