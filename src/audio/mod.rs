pub mod backend;
pub mod file;
pub mod recorder;

pub use backend::{AudioCapture, AudioFrame, AudioSink, CaptureConfig};
pub use file::{AudioFile, WavFileCapture};
pub use recorder::{RecordingMetadata, WavRecorder};
