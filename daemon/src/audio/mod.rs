//! Audio collaborators: microphone capture and speaker playback
//!
//! The scheduler only sees the traits below. Capture is a scoped resource:
//! a started session owns the recording process and releases it when
//! stopped or dropped, whichever comes first.

mod capture;
mod playback;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

pub use capture::ArecordCapture;
pub use playback::CommandPlayback;

/// Errors raised by capture and playback
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("capture failed: {0}")]
    Capture(String),

    #[error("playback failed: {0}")]
    Playback(String),
}

/// A recorded or synthesized audio file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioHandle {
    path: PathBuf,
    duration: Duration,
}

impl AudioHandle {
    pub fn new(path: impl Into<PathBuf>, duration: Duration) -> Self {
        Self {
            path: path.into(),
            duration,
        }
    }

    /// Handle for a file whose length is not known up front
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Duration::ZERO)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// True when the recording holds no samples at all
    pub fn is_empty(&self) -> bool {
        self.duration.is_zero()
    }
}

/// Source of microphone recordings
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Open the capture device and begin recording immediately
    async fn start(&self) -> Result<Box<dyn CaptureSession>, AudioError>;
}

/// A recording in progress
#[async_trait]
pub trait CaptureSession: Send {
    /// Stop recording, release the device and hand back the artifact
    async fn stop(self: Box<Self>) -> Result<AudioHandle, AudioError>;
}

/// Speaker output
#[async_trait]
pub trait AudioPlayback: Send + Sync {
    /// Play the file to completion
    async fn play(&self, audio: &AudioHandle) -> Result<(), AudioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_handle() {
        let handle = AudioHandle::new("/tmp/input.wav", Duration::ZERO);
        assert!(handle.is_empty());

        let handle = AudioHandle::new("/tmp/input.wav", Duration::from_millis(20));
        assert!(!handle.is_empty());
        assert_eq!(handle.path(), Path::new("/tmp/input.wav"));
    }
}
