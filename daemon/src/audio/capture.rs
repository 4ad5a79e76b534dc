//! Microphone capture through ALSA's `arecord`
//!
//! arecord writes raw S16LE mono PCM to a pipe; the bytes are collected
//! by a reader task and turned into a WAV file with `hound` when the
//! session stops. The child is killed on drop so an abandoned session
//! never keeps the device open.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{AudioCapture, AudioError, AudioHandle, CaptureSession};

/// Records from an ALSA device into a WAV file
pub struct ArecordCapture {
    device: String,
    sample_rate: u32,
    output: PathBuf,
}

impl ArecordCapture {
    pub fn new(device: impl Into<String>, sample_rate: u32, output: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            sample_rate,
            output: output.into(),
        }
    }
}

#[async_trait]
impl AudioCapture for ArecordCapture {
    async fn start(&self) -> Result<Box<dyn CaptureSession>, AudioError> {
        let mut child = Command::new("arecord")
            .args(["-q", "-D", &self.device, "-f", "S16_LE", "-c", "1", "-t", "raw"])
            .args(["-r", &self.sample_rate.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AudioError::Capture(format!("failed to start arecord: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AudioError::Capture("arecord stdout not captured".to_string()))?;

        info!(device = %self.device, sample_rate = self.sample_rate, "recording started");

        Ok(Box::new(ArecordSession {
            child,
            reader: tokio::spawn(read_pcm(stdout)),
            sample_rate: self.sample_rate,
            output: self.output.clone(),
        }))
    }
}

struct ArecordSession {
    child: Child,
    reader: JoinHandle<std::io::Result<Vec<u8>>>,
    sample_rate: u32,
    output: PathBuf,
}

#[async_trait]
impl CaptureSession for ArecordSession {
    async fn stop(mut self: Box<Self>) -> Result<AudioHandle, AudioError> {
        // An arecord that already exited on its own never recorded anything useful
        if let Ok(Some(status)) = self.child.try_wait() {
            if !status.success() {
                return Err(AudioError::Capture(format!("arecord exited early: {status}")));
            }
        }

        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "arecord already stopped");
        }
        if let Err(e) = self.child.wait().await {
            warn!(error = %e, "failed to reap arecord");
        }

        let pcm = (&mut self.reader)
            .await
            .map_err(|e| AudioError::Capture(format!("pcm reader failed: {e}")))?
            .map_err(|e| AudioError::Capture(format!("failed to read pcm: {e}")))?;

        let samples = pcm_to_samples(&pcm);
        if samples.is_empty() {
            info!("recording stopped with no audio");
            return Ok(AudioHandle::new(&self.output, Duration::ZERO));
        }

        let output = self.output.clone();
        let sample_rate = self.sample_rate;
        let duration = tokio::task::spawn_blocking(move || write_wav(&output, &samples, sample_rate))
            .await
            .map_err(|e| AudioError::Capture(format!("wav writer failed: {e}")))??;

        info!(
            path = %self.output.display(),
            duration_ms = duration.as_millis() as u64,
            "audio saved"
        );
        Ok(AudioHandle::new(&self.output, duration))
    }
}

async fn read_pcm(mut stdout: ChildStdout) -> std::io::Result<Vec<u8>> {
    let mut pcm = Vec::new();
    stdout.read_to_end(&mut pcm).await?;
    Ok(pcm)
}

/// Decode little-endian 16-bit samples, dropping a trailing odd byte
fn pcm_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Write mono samples as a 16-bit WAV file and return its duration
fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<Duration, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| AudioError::Capture(format!("failed to create wav: {e}")))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| AudioError::Capture(format!("failed to write wav: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| AudioError::Capture(format!("failed to finalize wav: {e}")))?;

    Ok(Duration::from_secs_f64(
        samples.len() as f64 / f64::from(sample_rate.max(1)),
    ))
}
