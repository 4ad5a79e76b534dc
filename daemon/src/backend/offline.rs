//! Local backend: whisper.cpp and llama.cpp servers, espeak per reply
//!
//! Both models are loaded once, by server processes started together with
//! the strategy and stopped when it is dropped. An interaction is then one
//! loopback HTTP round trip per stage. espeak has no model to keep warm and
//! still runs once per reply.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use super::local_server::LocalServer;
use super::wire::{self, ChatRequest, ChatResponse, TranscriptionResponse};
use super::{BackendError, BackendStrategy, StrategyKind};
use crate::audio::AudioHandle;
use crate::config::Config;

/// Upper bound for one request to a loaded model, or one espeak run
const STAGE_TIMEOUT: Duration = Duration::from_secs(180);

/// Fully local speech recognition, language model and speech synthesis
pub struct OfflineStrategy {
    client: reqwest::Client,
    whisper: LocalServer,
    llama: LocalServer,
    max_tokens: u32,
    espeak_command: String,
    language: String,
    output_dir: PathBuf,
    replies: AtomicU64,
}

impl OfflineStrategy {
    /// Start both model servers; they keep running for the life of the strategy
    pub fn start(config: &Config) -> Result<Self, BackendError> {
        let whisper = LocalServer::spawn(
            "speech recognition server",
            &config.whisper_command,
            whisper_args(config),
            config.whisper_port,
            "/",
            config.local_startup(),
        )?;
        let llama = LocalServer::spawn(
            "language model server",
            &config.llama_command,
            llama_args(config),
            config.llama_port,
            "/health",
            config.local_startup(),
        )?;

        Ok(Self {
            client: reqwest::Client::new(),
            whisper,
            llama,
            max_tokens: config.local_max_tokens,
            espeak_command: config.espeak_command.clone(),
            language: config.language.clone(),
            output_dir: config.data_dir.clone(),
            replies: AtomicU64::new(0),
        })
    }

    async fn transcribe_inner(&self, audio: &AudioHandle) -> Result<String, String> {
        self.whisper.ensure_ready(&self.client).await?;

        let bytes = tokio::fs::read(audio.path())
            .await
            .map_err(|e| format!("failed to read {}: {e}", audio.path().display()))?;
        debug!(audio_bytes = bytes.len(), "transcribing locally");

        let form = reqwest::multipart::Form::new()
            .part("file", wire::wav_part(bytes)?)
            .text("response_format", "json")
            .text("language", self.language.clone());
        let request = self
            .client
            .post(self.whisper.url("/inference"))
            .multipart(form);

        let result: TranscriptionResponse = send(request)
            .await?
            .json()
            .await
            .map_err(|e| format!("failed to parse response: {e}"))?;
        Ok(join_segments(&result.text))
    }

    async fn query_inner(&self, text: &str, system_prompt: &str) -> Result<String, String> {
        self.llama.ensure_ready(&self.client).await?;

        let mut body = ChatRequest::prompted("local", system_prompt, text);
        body.max_tokens = Some(self.max_tokens);
        let request = self
            .client
            .post(self.llama.url("/v1/chat/completions"))
            .json(&body);

        let response: ChatResponse = send(request)
            .await?
            .json()
            .await
            .map_err(|e| format!("failed to parse response: {e}"))?;
        response
            .into_reply()
            .ok_or_else(|| "local model produced no text".to_string())
    }
}

fn whisper_args(config: &Config) -> Vec<OsString> {
    vec![
        "-m".into(),
        config.whisper_model_path.clone().into(),
        "-l".into(),
        config.language.clone().into(),
        "-t".into(),
        "4".into(),
        "--host".into(),
        "127.0.0.1".into(),
        "--port".into(),
        config.whisper_port.to_string().into(),
    ]
}

fn llama_args(config: &Config) -> Vec<OsString> {
    vec![
        "-m".into(),
        config.local_llm_path.clone().into(),
        "-c".into(),
        config.local_context.to_string().into(),
        "-n".into(),
        config.local_max_tokens.to_string().into(),
        "--host".into(),
        "127.0.0.1".into(),
        "--port".into(),
        config.llama_port.to_string().into(),
    ]
}

/// Send with the stage timeout, turning transport and HTTP errors into text
async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response, String> {
    let response = request
        .timeout(STAGE_TIMEOUT)
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("local server error {status}: {body}"));
    }
    Ok(response)
}

/// whisper.cpp returns one line per segment
fn join_segments(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a tool to completion and return its trimmed stdout
async fn run_tool<I, S>(program: &str, args: I) -> Result<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to spawn {program}: {e}"))?;

    let output = timeout(STAGE_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| format!("{program} timed out after {STAGE_TIMEOUT:?}"))?
        .map_err(|e| format!("{program} failed: {e}"))?;

    if !output.stderr.is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(program, stderr = %stderr, "tool stderr");
    }

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        return Err(format!("{program} exited with code {code}"));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[async_trait]
impl BackendStrategy for OfflineStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Offline
    }

    async fn transcribe(&self, audio: &AudioHandle) -> Result<String, BackendError> {
        let text = self
            .transcribe_inner(audio)
            .await
            .map_err(BackendError::Transcription)?;
        info!(transcript = %text, "transcription complete");
        Ok(text)
    }

    async fn query(&self, text: &str, system_prompt: &str) -> Result<String, BackendError> {
        self.query_inner(text, system_prompt)
            .await
            .map_err(BackendError::Query)
    }

    async fn synthesize(&self, text: &str) -> Result<AudioHandle, BackendError> {
        let n = self.replies.fetch_add(1, Ordering::Relaxed);
        let path = self.output_dir.join(format!("response_{n}.wav"));

        let args: [&OsStr; 3] = ["-w".as_ref(), path.as_os_str(), text.as_ref()];
        run_tool(&self.espeak_command, args)
            .await
            .map_err(BackendError::Synthesis)?;

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(BackendError::Synthesis(format!(
                "{} produced no audio",
                self.espeak_command
            )));
        }
        Ok(AudioHandle::from_file(path))
    }
}
