//! Console trigger: ENTER acts like the button
//!
//! In text-only mode a typed line becomes the prompt itself.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

/// What a console line means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyboardInput {
    /// Start or stop a recording
    Press,
    /// Ask this question directly
    Text(String),
}

pub struct KeyboardListener {
    text_mode: bool,
}

impl KeyboardListener {
    pub fn new(text_mode: bool) -> Self {
        Self { text_mode }
    }

    /// Read lines until the console closes
    pub async fn run<R, F>(&self, reader: R, mut on_input: F)
    where
        R: AsyncBufRead + Unpin,
        F: FnMut(KeyboardInput),
    {
        let mut lines = reader.lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(input) = self.interpret(&line) {
                        on_input(input);
                    }
                }
                Ok(None) => {
                    info!("console closed, keyboard trigger disabled");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "failed to read console, keyboard trigger disabled");
                    break;
                }
            }
        }
    }

    fn interpret(&self, line: &str) -> Option<KeyboardInput> {
        if !self.text_mode {
            return Some(KeyboardInput::Press);
        }

        let text = line.trim();
        if text.is_empty() {
            info!("type a question and press ENTER");
            return None;
        }
        Some(KeyboardInput::Text(text.to_string()))
    }
}
