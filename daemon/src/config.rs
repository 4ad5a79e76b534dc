//! Configuration loading and management
//!
//! Values come from three layers, later ones winning: built-in defaults,
//! an optional TOML file, and `PIM_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

/// Environment variable naming an explicit config file
const CONFIG_PATH_ENV: &str = "PIM_CONFIG";

/// Errors raised while applying configuration overrides
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for recordings, synthesized replies and the config file
    pub data_dir: PathBuf,

    /// API key for the online backend
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API
    pub api_base: String,
    pub chat_model: String,
    pub stt_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    /// Spoken language hint for transcription
    pub language: String,
    /// Prepended to every query
    pub system_prompt: String,

    /// whisper.cpp HTTP server binary
    pub whisper_command: String,
    pub whisper_model_path: PathBuf,
    pub whisper_port: u16,
    /// llama.cpp HTTP server binary
    pub llama_command: String,
    pub local_llm_path: PathBuf,
    pub llama_port: u16,
    pub local_max_tokens: u32,
    pub local_context: u32,
    /// How long a local server may take to load its model
    pub local_startup_secs: u64,
    pub espeak_command: String,

    /// ALSA capture device passed to arecord
    pub capture_device: String,
    pub sample_rate: u32,
    /// Upper bound on a single recording, 0 disables it
    pub max_recording_secs: u64,
    /// Ready falls back to Idle after this long without a trigger
    pub inactivity_timeout_secs: u64,

    /// BCM pin of the push button
    pub button_pin: u32,
    /// BCM pin of the status LED
    pub led_pin: u32,
    pub debounce_ms: u64,
    /// Quiet period after each accepted button press
    pub cooldown_ms: u64,
    /// How long the scheduler waits for the speaking flash sequence
    pub flash_wait_ms: u64,

    /// host:port used for the reachability probe
    pub probe_host: String,
    pub probe_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var_os("HOME")
            .map(|home| {
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("pim")
            })
            .unwrap_or_else(|| PathBuf::from("/var/lib/pim"));

        Self {
            data_dir,
            openai_api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4.1".to_string(),
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "nova".to_string(),
            language: "en".to_string(),
            system_prompt: "You are a helpful assistant. Answer concisely:".to_string(),
            whisper_command: "whisper-server".to_string(),
            whisper_model_path: PathBuf::from("ggml-base.en.bin"),
            whisper_port: 8910,
            llama_command: "llama-server".to_string(),
            local_llm_path: PathBuf::from("phi-2.Q4_K_M.gguf"),
            llama_port: 8911,
            local_max_tokens: 200,
            local_context: 1024,
            local_startup_secs: 120,
            espeak_command: "espeak".to_string(),
            capture_device: "plughw:2,0".to_string(),
            sample_rate: 44_100,
            max_recording_secs: 30,
            inactivity_timeout_secs: 60,
            button_pin: 17,
            led_pin: 18,
            debounce_ms: 100,
            cooldown_ms: 300,
            flash_wait_ms: 1500,
            probe_host: "8.8.8.8:53".to_string(),
            probe_timeout_secs: 3,
        }
    }
}

impl Config {
    /// Load configuration from defaults, the config file and environment
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| config.data_dir.join("config.toml"));

        if path.exists() {
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "loaded config file");
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML config file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        Ok(config)
    }

    /// Overlay `PIM_*` variables (and `OPENAI_API_KEY`) looked up via `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY").or_else(|| lookup("PIM_OPENAI_API_KEY")) {
            self.openai_api_key = Some(key);
        }

        let text = |key: &str, slot: &mut String| {
            if let Some(value) = lookup(key) {
                *slot = value;
            }
        };
        text("PIM_API_BASE", &mut self.api_base);
        text("PIM_CHAT_MODEL", &mut self.chat_model);
        text("PIM_STT_MODEL", &mut self.stt_model);
        text("PIM_TTS_MODEL", &mut self.tts_model);
        text("PIM_TTS_VOICE", &mut self.tts_voice);
        text("PIM_LANGUAGE", &mut self.language);
        text("PIM_SYSTEM_PROMPT", &mut self.system_prompt);
        text("PIM_WHISPER_COMMAND", &mut self.whisper_command);
        text("PIM_LLAMA_COMMAND", &mut self.llama_command);
        text("PIM_ESPEAK_COMMAND", &mut self.espeak_command);
        text("PIM_CAPTURE_DEVICE", &mut self.capture_device);
        text("PIM_PROBE_HOST", &mut self.probe_host);

        let path = |key: &str, slot: &mut PathBuf| {
            if let Some(value) = lookup(key) {
                *slot = PathBuf::from(value);
            }
        };
        path("PIM_DATA_DIR", &mut self.data_dir);
        path("PIM_WHISPER_MODEL_PATH", &mut self.whisper_model_path);
        path("PIM_LOCAL_LLM_PATH", &mut self.local_llm_path);

        parse_number(&lookup, "PIM_LOCAL_MAX_TOKENS", &mut self.local_max_tokens)?;
        parse_number(&lookup, "PIM_LOCAL_CONTEXT", &mut self.local_context)?;
        parse_number(&lookup, "PIM_LOCAL_STARTUP_SECS", &mut self.local_startup_secs)?;
        parse_number(&lookup, "PIM_WHISPER_PORT", &mut self.whisper_port)?;
        parse_number(&lookup, "PIM_LLAMA_PORT", &mut self.llama_port)?;
        parse_number(&lookup, "PIM_SAMPLE_RATE", &mut self.sample_rate)?;
        parse_number(&lookup, "PIM_MAX_RECORDING_SECS", &mut self.max_recording_secs)?;
        parse_number(
            &lookup,
            "PIM_INACTIVITY_TIMEOUT_SECS",
            &mut self.inactivity_timeout_secs,
        )?;
        parse_number(&lookup, "PIM_BUTTON_PIN", &mut self.button_pin)?;
        parse_number(&lookup, "PIM_LED_PIN", &mut self.led_pin)?;
        parse_number(&lookup, "PIM_DEBOUNCE_MS", &mut self.debounce_ms)?;
        parse_number(&lookup, "PIM_COOLDOWN_MS", &mut self.cooldown_ms)?;
        parse_number(&lookup, "PIM_FLASH_WAIT_MS", &mut self.flash_wait_ms)?;
        parse_number(&lookup, "PIM_PROBE_TIMEOUT_SECS", &mut self.probe_timeout_secs)?;

        Ok(())
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    pub fn max_recording(&self) -> Option<Duration> {
        (self.max_recording_secs > 0).then(|| Duration::from_secs(self.max_recording_secs))
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn flash_wait(&self) -> Duration {
        Duration::from_millis(self.flash_wait_ms)
    }

    pub fn local_startup(&self) -> Duration {
        Duration::from_secs(self.local_startup_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Where the current recording is written
    pub fn recording_path(&self) -> PathBuf {
        self.data_dir.join("input.wav")
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(value) = lookup(key) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            })?;
    }
    Ok(())
}
