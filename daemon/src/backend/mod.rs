//! Backend strategies: transcribe, query and synthesize
//!
//! Two interchangeable implementations exist, one calling hosted APIs and
//! one running local models. The choice is made once at startup from the
//! capability snapshot and the strategy object lives for the whole run.

mod local_server;
mod offline;
mod online;
mod wire;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::audio::AudioHandle;
use crate::capability::{CapabilitySnapshot, DeviceClass};
use crate::config::Config;

pub use offline::OfflineStrategy;
pub use online::OnlineStrategy;

/// Errors returned by a backend call, one per pipeline stage
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// A credential or local model the strategy needs was not set up
    #[error("{0} is not configured")]
    NotConfigured(String),
}

/// Which strategy family to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Online,
    Offline,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Online => write!(f, "online"),
            StrategyKind::Offline => write!(f, "offline"),
        }
    }
}

/// Speech and language capabilities behind one interaction
#[async_trait]
pub trait BackendStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Turn a recording into text
    async fn transcribe(&self, audio: &AudioHandle) -> Result<String, BackendError>;

    /// Ask the language model for a reply
    async fn query(&self, text: &str, system_prompt: &str) -> Result<String, BackendError>;

    /// Render the reply as an audio file
    async fn synthesize(&self, text: &str) -> Result<AudioHandle, BackendError>;
}

/// Offline only on a capable board without network; online otherwise
pub fn select_strategy(snapshot: &CapabilitySnapshot) -> StrategyKind {
    if snapshot.device_class == DeviceClass::Capable && !snapshot.is_online {
        StrategyKind::Offline
    } else {
        StrategyKind::Online
    }
}

/// Construct the strategy object for the process lifetime
///
/// The offline strategy starts its model servers here and fails when they
/// cannot be launched.
pub fn build_strategy(
    kind: StrategyKind,
    config: &Config,
) -> Result<Arc<dyn BackendStrategy>, BackendError> {
    let strategy: Arc<dyn BackendStrategy> = match kind {
        StrategyKind::Online => Arc::new(OnlineStrategy::from_config(config)),
        StrategyKind::Offline => Arc::new(OfflineStrategy::start(config)?),
    };
    Ok(strategy)
}
