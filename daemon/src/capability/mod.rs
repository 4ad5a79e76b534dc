//! Capability detection
//!
//! Probes the host once at startup and produces an immutable snapshot
//! that decides the backend strategy and which trigger sources run.

mod probe;

use serde::Serialize;

pub use probe::{detect_capabilities, ProbeSettings};

/// Coarse hardware class of the host board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    /// Not a board we recognise
    Unknown,
    /// Too small for local models (Pi Zero)
    Small,
    /// Enough compute for local models (Pi 5)
    Capable,
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Unknown => write!(f, "unknown"),
            DeviceClass::Small => write!(f, "small"),
            DeviceClass::Capable => write!(f, "capable"),
        }
    }
}

/// What the host can do, captured once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapabilitySnapshot {
    pub has_microphone: bool,
    pub has_speaker: bool,
    pub is_online: bool,
    pub device_class: DeviceClass,
}

impl CapabilitySnapshot {
    /// Snapshot used when probing fails: no audio, offline, unknown board
    pub const fn conservative() -> Self {
        Self {
            has_microphone: false,
            has_speaker: false,
            is_online: false,
            device_class: DeviceClass::Unknown,
        }
    }

    /// Without a microphone the appliance runs keyboard-only on typed text
    pub fn is_text_only(&self) -> bool {
        !self.has_microphone
    }
}

impl Default for CapabilitySnapshot {
    fn default() -> Self {
        Self::conservative()
    }
}
