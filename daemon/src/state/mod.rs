//! State module for the interaction cycle
//!
//! Provides the interaction state with five values:
//! - Idle: Resting after inactivity, dim indicator
//! - Ready: Waiting for a button press or ENTER
//! - Listening: Recording until cancelled or timed out
//! - Processing: Transcribe, query and synthesize
//! - Speaking: Playing back the reply

mod machine;

pub use machine::InteractionState;
