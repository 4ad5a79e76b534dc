//! In-memory collaborators shared by the unit tests

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::audio::{AudioCapture, AudioError, AudioHandle, AudioPlayback, CaptureSession};
use crate::backend::{BackendError, BackendStrategy, StrategyKind};
use crate::events::Stage;
use crate::gpio::GpioError;
use crate::indicator::IndicatorOutput;

/// Records every level written to it, with the time it was written
#[derive(Default)]
pub struct RecordingIndicator {
    levels: Mutex<Vec<(Instant, bool)>>,
}

impl RecordingIndicator {
    pub fn levels(&self) -> Vec<bool> {
        self.levels.lock().unwrap().iter().map(|(_, on)| *on).collect()
    }

    /// Levels keyed by milliseconds since `start`
    pub fn timeline(&self, start: Instant) -> Vec<(u64, bool)> {
        self.levels
            .lock()
            .unwrap()
            .iter()
            .map(|(at, on)| (at.duration_since(start).as_millis() as u64, *on))
            .collect()
    }
}

impl IndicatorOutput for RecordingIndicator {
    fn set(&self, on: bool) -> Result<(), GpioError> {
        self.levels.lock().unwrap().push((Instant::now(), on));
        Ok(())
    }
}

/// Capture whose artifact lasts exactly as long as the session was open
#[derive(Default)]
pub struct FakeCapture {
    pub fail: bool,
    pub starts: AtomicUsize,
}

impl FakeCapture {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl AudioCapture for FakeCapture {
    async fn start(&self) -> Result<Box<dyn CaptureSession>, AudioError> {
        if self.fail {
            return Err(AudioError::Capture("no device".to_string()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            started: Instant::now(),
        }))
    }
}

/// Session handed out by [`FakeCapture`]
struct FakeSession {
    started: Instant,
}

#[async_trait]
impl CaptureSession for FakeSession {
    async fn stop(self: Box<Self>) -> Result<AudioHandle, AudioError> {
        Ok(AudioHandle::new(
            PathBuf::from("/tmp/pim-test-input.wav"),
            self.started.elapsed(),
        ))
    }
}

/// Strategy with canned answers that can fail one chosen stage
#[derive(Default)]
pub struct FakeStrategy {
    pub fail: Option<Stage>,
    /// How long transcription takes
    pub delay: Duration,
    pub transcribe_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub synthesize_calls: AtomicUsize,
    pub queries: Mutex<Vec<String>>,
}

impl FakeStrategy {
    pub fn failing(stage: Stage) -> Self {
        Self {
            fail: Some(stage),
            ..Self::default()
        }
    }
}

#[async_trait]
impl BackendStrategy for FakeStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Online
    }

    async fn transcribe(&self, _audio: &AudioHandle) -> Result<String, BackendError> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail == Some(Stage::Transcribe) {
            return Err(BackendError::Transcription("model unavailable".to_string()));
        }
        Ok("what time is it".to_string())
    }

    async fn query(&self, text: &str, _system_prompt: &str) -> Result<String, BackendError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(text.to_string());
        if self.fail == Some(Stage::Query) {
            return Err(BackendError::Query("rate limited".to_string()));
        }
        Ok("It is noon.".to_string())
    }

    async fn synthesize(&self, _text: &str) -> Result<AudioHandle, BackendError> {
        self.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail == Some(Stage::Synthesize) {
            return Err(BackendError::Synthesis("voice missing".to_string()));
        }
        Ok(AudioHandle::new(
            PathBuf::from("/tmp/pim-test-response.mp3"),
            Duration::from_millis(800),
        ))
    }
}

/// Playback that takes a fixed time and can be told to fail
#[derive(Default)]
pub struct FakePlayback {
    pub fail: bool,
    pub delay: Duration,
    pub plays: AtomicUsize,
}

impl FakePlayback {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl AudioPlayback for FakePlayback {
    async fn play(&self, _audio: &AudioHandle) -> Result<(), AudioError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(AudioError::Playback("speaker unplugged".to_string()));
        }
        Ok(())
    }
}
