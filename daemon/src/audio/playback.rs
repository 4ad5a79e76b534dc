//! Speaker playback through the platform's command line players

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{AudioError, AudioHandle, AudioPlayback};

/// Plays files with afplay, aplay or mpg123
#[derive(Debug, Default, Clone)]
pub struct CommandPlayback;

impl CommandPlayback {
    pub fn new() -> Self {
        Self
    }
}

/// Pick the player for a file: afplay on macOS, aplay for WAV, mpg123 otherwise
fn player_for(path: &Path) -> &'static str {
    if cfg!(target_os = "macos") {
        return "afplay";
    }

    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));

    if is_wav {
        "aplay"
    } else {
        "mpg123"
    }
}

#[async_trait]
impl AudioPlayback for CommandPlayback {
    async fn play(&self, audio: &AudioHandle) -> Result<(), AudioError> {
        let player = player_for(audio.path());
        debug!(player, path = %audio.path().display(), "starting playback");

        let status = Command::new(player)
            .arg(audio.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| AudioError::Playback(format!("failed to run {player}: {e}")))?;

        if !status.success() {
            return Err(AudioError::Playback(format!("{player} exited with {status}")));
        }
        Ok(())
    }
}
