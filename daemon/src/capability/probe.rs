//! Host probes: board model, ALSA devices and network reachability

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{CapabilitySnapshot, DeviceClass};
use crate::config::Config;

/// Errors that abort the probe and force the conservative snapshot
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("capability probe timed out after {0:?}")]
    Timeout(Duration),
}

/// Where and how long to probe
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub cpuinfo_path: PathBuf,
    pub asound_pcm_path: PathBuf,
    /// host:port for the reachability check
    pub probe_host: String,
    pub network_timeout: Duration,
}

impl ProbeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cpuinfo_path: PathBuf::from("/proc/cpuinfo"),
            asound_pcm_path: PathBuf::from("/proc/asound/pcm"),
            probe_host: config.probe_host.clone(),
            network_timeout: config.probe_timeout(),
        }
    }
}

/// Probe the host; never fails, falls back to the conservative snapshot
pub async fn detect_capabilities(settings: &ProbeSettings) -> CapabilitySnapshot {
    let budget = settings.network_timeout + Duration::from_secs(2);

    let result = match timeout(budget, probe(settings)).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(budget)),
    };

    match result {
        Ok(snapshot) => {
            info!(
                microphone = snapshot.has_microphone,
                speaker = snapshot.has_speaker,
                online = snapshot.is_online,
                device_class = %snapshot.device_class,
                "capabilities detected"
            );
            snapshot
        }
        Err(e) => {
            warn!(error = %e, "capability probe failed, assuming keyboard-only text mode");
            CapabilitySnapshot::conservative()
        }
    }
}

async fn probe(settings: &ProbeSettings) -> Result<CapabilitySnapshot, ProbeError> {
    let device_class = read_optional(&settings.cpuinfo_path)
        .await?
        .map(|cpuinfo| device_class_from_cpuinfo(&cpuinfo))
        .unwrap_or(DeviceClass::Unknown);

    let (has_microphone, has_speaker) = read_optional(&settings.asound_pcm_path)
        .await?
        .map(|pcm| audio_devices_from_pcm(&pcm))
        .unwrap_or((false, false));

    let is_online = is_online(&settings.probe_host, settings.network_timeout).await;

    Ok(CapabilitySnapshot {
        has_microphone,
        has_speaker,
        is_online,
        device_class,
    })
}

/// Read a proc file; a missing file means "not this kind of host"
async fn read_optional(path: &Path) -> Result<Option<String>, ProbeError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "probe source not present");
            Ok(None)
        }
        Err(source) => Err(ProbeError::Io {
            path: path.to_owned(),
            source,
        }),
    }
}

/// Classify the board from the `Model` line of /proc/cpuinfo
fn device_class_from_cpuinfo(cpuinfo: &str) -> DeviceClass {
    let model = cpuinfo.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == "Model").then(|| value.trim())
    });

    match model {
        Some(model) => {
            debug!(model, "detected board model");
            if model.contains("Zero") {
                DeviceClass::Small
            } else if model.contains('5') {
                DeviceClass::Capable
            } else {
                DeviceClass::Unknown
            }
        }
        None => DeviceClass::Unknown,
    }
}

/// Scan /proc/asound/pcm for capture and (non-dummy) playback endpoints
fn audio_devices_from_pcm(pcm: &str) -> (bool, bool) {
    let mut has_capture = false;
    let mut has_playback = false;

    for line in pcm.lines() {
        let lower = line.to_lowercase();
        if lower.contains("capture") {
            has_capture = true;
        }
        if lower.contains("playback") && !lower.contains("dummy") {
            has_playback = true;
        }
    }

    (has_capture, has_playback)
}

async fn is_online(host: &str, limit: Duration) -> bool {
    match timeout(limit, TcpStream::connect(host)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(host, error = %e, "reachability probe refused");
            false
        }
        Err(_) => {
            debug!(host, "reachability probe timed out");
            false
        }
    }
}
