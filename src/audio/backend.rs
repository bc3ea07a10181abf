use anyhow::Result;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the stream started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Little-endian PCM bytes, as carried on the wire
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Rebuild a frame from little-endian PCM bytes. A trailing odd byte is dropped.
    pub fn from_pcm_bytes(bytes: &[u8], sample_rate: u32, channels: u16, timestamp_ms: u64) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();

        Self {
            samples,
            sample_rate,
            channels,
            timestamp_ms,
        }
    }
}

/// Configuration for local capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate
    pub sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub frame_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,     // Realtime voice default
            channels: 1,            // Mono
            frame_duration_ms: 20,  // 20ms frames
        }
    }
}

/// Local microphone capture
///
/// The realtime transport starts a capture when the microphone is enabled and stops it
/// when the microphone is disabled or the session ends.
#[async_trait::async_trait]
pub trait AudioCapture: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames. The channel closes
    /// when capture stops.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if capture is currently running
    fn is_capturing(&self) -> bool;

    /// Get capture name for logging
    fn name(&self) -> &str;
}

/// Destination for remote (interviewer) audio
pub trait AudioSink: Send + Sync {
    /// Write one frame of remote audio
    fn write_frame(&self, frame: &AudioFrame) -> Result<()>;

    /// Close whatever the sink has open for the current track
    fn finish(&self) -> Result<()>;

    fn name(&self) -> &str;
}
