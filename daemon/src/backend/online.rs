//! Hosted backend using OpenAI-compatible HTTP endpoints

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::wire::{self, ChatRequest, ChatResponse, TranscriptionResponse};
use super::{BackendError, BackendStrategy, StrategyKind};
use crate::audio::AudioHandle;
use crate::config::Config;

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Network-backed speech recognition, chat and speech synthesis
pub struct OnlineStrategy {
    client: reqwest::Client,
    api_key: Option<String>,
    api_base: String,
    chat_model: String,
    stt_model: String,
    tts_model: String,
    voice: String,
    language: String,
    output_dir: PathBuf,
    replies: AtomicU64,
}

impl OnlineStrategy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.openai_api_key.clone().filter(|key| !key.is_empty()),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            stt_model: config.stt_model.clone(),
            tts_model: config.tts_model.clone(),
            voice: config.tts_voice.clone(),
            language: config.language.clone(),
            output_dir: config.data_dir.clone(),
            replies: AtomicU64::new(0),
        }
    }

    fn api_key(&self) -> Result<&str, BackendError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| BackendError::NotConfigured("OPENAI_API_KEY".to_string()))
    }

    /// POST and return the response, turning transport and HTTP errors into text
    async fn send(
        &self,
        key: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, String> {
        let response = request
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("API error {status}: {body}"));
        }
        Ok(response)
    }

    async fn transcribe_inner(&self, key: &str, audio: &AudioHandle) -> Result<String, String> {
        let bytes = tokio::fs::read(audio.path())
            .await
            .map_err(|e| format!("failed to read {}: {e}", audio.path().display()))?;
        debug!(audio_bytes = bytes.len(), "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part("file", wire::wav_part(bytes)?)
            .text("model", self.stt_model.clone())
            .text("language", self.language.clone());

        let request = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_base))
            .multipart(form);

        let result: TranscriptionResponse = self
            .send(key, request)
            .await?
            .json()
            .await
            .map_err(|e| format!("failed to parse response: {e}"))?;

        Ok(result.text.trim().to_string())
    }

    async fn query_inner(
        &self,
        key: &str,
        text: &str,
        system_prompt: &str,
    ) -> Result<String, String> {
        let body = ChatRequest::prompted(&self.chat_model, system_prompt, text);

        let request = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .json(&body);

        let response: ChatResponse = self
            .send(key, request)
            .await?
            .json()
            .await
            .map_err(|e| format!("failed to parse response: {e}"))?;

        response
            .into_reply()
            .ok_or_else(|| "response contained no message".to_string())
    }

    async fn synthesize_inner(&self, key: &str, text: &str) -> Result<AudioHandle, String> {
        let body = SpeechRequest {
            model: &self.tts_model,
            input: text,
            voice: &self.voice,
            response_format: "mp3",
        };

        let request = self
            .client
            .post(format!("{}/audio/speech", self.api_base))
            .json(&body);

        let bytes = self
            .send(key, request)
            .await?
            .bytes()
            .await
            .map_err(|e| format!("failed to read audio: {e}"))?;

        let n = self.replies.fetch_add(1, Ordering::Relaxed);
        let path = self.output_dir.join(format!("response_{n}.mp3"));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| format!("failed to write {}: {e}", path.display()))?;

        Ok(AudioHandle::from_file(path))
    }
}

#[async_trait]
impl BackendStrategy for OnlineStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Online
    }

    async fn transcribe(&self, audio: &AudioHandle) -> Result<String, BackendError> {
        let key = self.api_key()?;
        let text = self
            .transcribe_inner(key, audio)
            .await
            .map_err(BackendError::Transcription)?;
        info!(transcript = %text, "transcription complete");
        Ok(text)
    }

    async fn query(&self, text: &str, system_prompt: &str) -> Result<String, BackendError> {
        let key = self.api_key()?;
        self.query_inner(key, text, system_prompt)
            .await
            .map_err(BackendError::Query)
    }

    async fn synthesize(&self, text: &str) -> Result<AudioHandle, BackendError> {
        let key = self.api_key()?;
        self.synthesize_inner(key, text)
            .await
            .map_err(BackendError::Synthesis)
    }
}
