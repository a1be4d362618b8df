//! OpenAI-compatible chat completions client.
//!
//! Serves both OpenAI and Mistral: the two speak the same wire format and
//! differ only in base URL and credentials.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::stream::StreamEvent;
use crate::transcript::{Message, Transcript};

use super::ChatClient;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ResponseChoice>,
}

#[derive(Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug)]
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    label: &'static str,
    api_key: String,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(base_url: &str, label: &'static str, api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            label,
            api_key,
            model,
        }
    }

    async fn post_chat(&self, transcript: &Transcript, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: transcript.messages(),
            stream,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} API error {status}: {body}", self.label));
        }

        Ok(response)
    }
}

/// Translate one SSE line into a stream event, if it carries one.
fn parse_sse_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = line.strip_prefix("data:")?.trim();
    if payload == "[DONE]" {
        return Some(StreamEvent::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(payload).ok()?;
    let content = chunk.choices.first()?.delta.content.as_deref()?;
    if content.is_empty() {
        None
    } else {
        Some(StreamEvent::Delta(content.to_string()))
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn send_streaming(&self, transcript: &Transcript) -> Result<mpsc::Receiver<StreamEvent>> {
        let response = self.post_chat(transcript, true).await?;
        let (tx, rx) = mpsc::channel(100);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].to_string();
                            buffer.drain(..=pos);

                            if let Some(event) = parse_sse_line(&line) {
                                let done = matches!(event, StreamEvent::Done);
                                if tx.send(event).await.is_err() || done {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Failed(e.to_string())).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, transcript: &Transcript) -> Result<String> {
        let response = self.post_chat(transcript, false).await?;
        let body: ChatResponse = response.json().await?;
        Ok(body
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_sse_line(line), Some(StreamEvent::Delta("Hel".to_string())));
    }

    #[test]
    fn test_parse_done_sentinel() {
        assert_eq!(parse_sse_line("data: [DONE]"), Some(StreamEvent::Done));
        assert_eq!(parse_sse_line("data: [DONE]\r"), Some(StreamEvent::Done));
    }

    #[test]
    fn test_parse_skips_comments_blanks_and_empty_deltas() {
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line(r#"data: {"choices":[{"delta":{}}]}"#), None);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            None
        );
    }

    #[test]
    fn test_parse_ignores_non_data_fields() {
        assert_eq!(parse_sse_line("event: message"), None);
        assert_eq!(parse_sse_line("not sse at all"), None);
    }
}
