use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::stream::StreamEvent;
use crate::transcript::{Role, Transcript};

use super::ChatClient;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

#[derive(Debug)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    model: String,
}

impl ClaudeClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }

    async fn post_chat(&self, transcript: &Transcript, stream: bool) -> Result<reqwest::Response> {
        // Anthropic carries the system message in its own field; the
        // messages array holds only the user/assistant turns.
        let messages: Vec<WireMessage> = transcript
            .turns()
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                },
                content: &m.content,
            })
            .collect();

        let request = ChatRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: &transcript.system().content,
            messages,
            stream,
        };

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Claude API error {status}: {body}"));
        }

        Ok(response)
    }
}

/// Translate one SSE line into a stream event, if it carries one.
fn parse_sse_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim_end_matches('\r');
    let payload = line.strip_prefix("data:")?.trim();
    let value: Value = serde_json::from_str(payload).ok()?;

    match value.get("type")?.as_str()? {
        "content_block_delta" => {
            let text = value.get("delta")?.get("text")?.as_str()?;
            if text.is_empty() {
                None
            } else {
                Some(StreamEvent::Delta(text.to_string()))
            }
        }
        "message_stop" => Some(StreamEvent::Done),
        "error" => {
            let message = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown Claude API error");
            Some(StreamEvent::Failed(message.to_string()))
        }
        _ => None,
    }
}

#[async_trait]
impl ChatClient for ClaudeClient {
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
                                let terminal = !matches!(event, StreamEvent::Delta(_));
                                if tx.send(event).await.is_err() || terminal {
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
            .content
            .first()
            .map(|block| block.text.clone())
            .unwrap_or_default())
    }
}
