//! JSON bodies shared by the hosted API and the local model servers
//!
//! Both speak the OpenAI chat completions shape; the local whisper server
//! answers transcription uploads with the same `{"text": ..}` body.

use serde::{Deserialize, Serialize};

/// Response from a transcription endpoint
#[derive(Deserialize)]
pub(super) struct TranscriptionResponse {
    pub text: String,
}

#[derive(Serialize)]
pub(super) struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Serialize)]
pub(super) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl<'a> ChatRequest<'a> {
    /// System prompt followed by the user's question
    pub fn prompted(model: &'a str, system_prompt: &'a str, text: &'a str) -> Self {
        Self {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            max_tokens: None,
        }
    }
}

#[derive(Deserialize)]
pub(super) struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    /// First non-empty reply, trimmed
    pub fn into_reply(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
    }
}

/// Multipart part carrying a WAV recording
pub(super) fn wav_part(bytes: Vec<u8>) -> Result<reqwest::multipart::Part, String> {
    reqwest::multipart::Part::bytes(bytes)
        .file_name("input.wav")
        .mime_str("audio/wav")
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_reply_extraction() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"  Hello there.\n"}}]}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.into_reply().as_deref(), Some("Hello there."));

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(empty.into_reply(), None);

        let blank = r#"{"choices":[{"message":{"content":"   "}}]}"#;
        let blank: ChatResponse = serde_json::from_str(blank).unwrap();
        assert_eq!(blank.into_reply(), None);
    }

    #[test]
    fn test_prompted_request_shape() {
        let body = ChatRequest::prompted("gpt-4.1", "be brief", "hi");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4.1");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "be brief");
        assert_eq!(json["messages"][1]["role"], "user");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_token_limit_is_sent_when_set() {
        let mut body = ChatRequest::prompted("local", "be brief", "hi");
        body.max_tokens = Some(200);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["max_tokens"], 200);
    }
}
