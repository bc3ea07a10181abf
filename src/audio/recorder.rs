use anyhow::{anyhow, Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

use super::backend::{AudioFrame, AudioSink};

/// Metadata for a single finished recording
#[derive(Debug, Clone)]
pub struct RecordingMetadata {
    /// File path to the recording
    pub file_path: PathBuf,
    /// Timestamp of the first frame (ms since the remote stream started)
    pub start_ms: u64,
    /// Timestamp of the last frame
    pub end_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Number of samples written
    pub sample_count: usize,
}

/// Records the interviewer's audio to WAV files.
///
/// A file is opened lazily on the first frame of a bound track and closed by `finish`.
/// A format change mid-stream closes the current file and starts a new one.
pub struct WavRecorder {
    output_dir: PathBuf,
    prefix: String,
    next_index: AtomicU32,
    current: Mutex<Option<RecordingWriter>>,
    completed: Mutex<Vec<RecordingMetadata>>,
}

impl WavRecorder {
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create recordings directory: {:?}", output_dir))?;

        info!("Interviewer audio will be recorded to {:?}", output_dir);

        Ok(Self {
            output_dir,
            prefix: prefix.into(),
            next_index: AtomicU32::new(0),
            current: Mutex::new(None),
            completed: Mutex::new(Vec::new()),
        })
    }

    /// Recordings finished so far
    pub fn recordings(&self) -> Vec<RecordingMetadata> {
        match self.completed.lock() {
            Ok(completed) => completed.clone(),
            Err(_) => Vec::new(),
        }
    }

    fn open_writer(&self, frame: &AudioFrame) -> Result<RecordingWriter> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let file_path = self.output_dir.join(format!(
            "{}-{}-{:03}.wav",
            self.prefix,
            chrono::Utc::now().format("%Y%m%d-%H%M%S"),
            index
        ));

        RecordingWriter::new(file_path, frame.timestamp_ms, frame.sample_rate, frame.channels)
    }

    fn complete(&self, writer: RecordingWriter) -> Result<()> {
        let metadata = writer.finish()?;
        info!(
            "Recording complete: {:?} ({:.1}s - {:.1}s, {} samples)",
            metadata.file_path,
            metadata.start_ms as f64 / 1000.0,
            metadata.end_ms as f64 / 1000.0,
            metadata.sample_count
        );

        self.completed
            .lock()
            .map_err(|_| anyhow!("recording list lock poisoned"))?
            .push(metadata);

        Ok(())
    }
}

impl AudioSink for WavRecorder {
    fn write_frame(&self, frame: &AudioFrame) -> Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| anyhow!("recorder lock poisoned"))?;

        let format_changed = current
            .as_ref()
            .map(|w| w.metadata.sample_rate != frame.sample_rate || w.metadata.channels != frame.channels)
            .unwrap_or(false);

        if format_changed {
            if let Some(writer) = current.take() {
                self.complete(writer)?;
            }
        }

        if current.is_none() {
            *current = Some(self.open_writer(frame)?);
        }

        if let Some(writer) = current.as_mut() {
            writer.write_frame(frame)?;
        }

        Ok(())
    }

    fn finish(&self) -> Result<()> {
        let writer = self
            .current
            .lock()
            .map_err(|_| anyhow!("recorder lock poisoned"))?
            .take();

        match writer {
            Some(writer) => self.complete(writer),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "wav-recorder"
    }
}

/// Writes a single recording to disk as WAV file
struct RecordingWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    metadata: RecordingMetadata,
}

impl RecordingWriter {
    fn new(file_path: PathBuf, start_ms: u64, sample_rate: u32, channels: u16) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&file_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", file_path))?;

        Ok(Self {
            writer: Some(writer),
            metadata: RecordingMetadata {
                file_path,
                start_ms,
                end_ms: start_ms,
                sample_rate,
                channels,
                sample_count: 0,
            },
        })
    }

    fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer.write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }

            self.metadata.end_ms = frame.timestamp_ms;
            self.metadata.sample_count += frame.samples.len();
        }

        Ok(())
    }

    fn finish(mut self) -> Result<RecordingMetadata> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()
                .context("Failed to finalize WAV file")?;
        }

        Ok(self.metadata.clone())
    }
}

impl Drop for RecordingWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
