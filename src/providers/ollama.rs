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
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct ChunkMessage {
    content: String,
}

#[derive(Debug)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    async fn post_chat(&self, transcript: &Transcript, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: transcript.messages(),
            stream,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Ollama request failed with status {status}: {body}. \
                 Make sure Ollama is running with: ollama serve"
            ));
        }

        Ok(response)
    }
}

/// Translate one NDJSON line into stream events. The final `done` line may
/// carry trailing text, which is emitted as its own delta so nothing is
/// lost; the terminal marker itself never contributes text.
fn parse_chat_line(line: &str) -> Vec<StreamEvent> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }
    let Ok(chunk) = serde_json::from_str::<ChatChunk>(line) else {
        return Vec::new();
    };

    let mut events = Vec::new();
    if let Some(message) = chunk.message {
        if !message.content.is_empty() {
            events.push(StreamEvent::Delta(message.content));
        }
    }
    if chunk.done {
        events.push(StreamEvent::Done);
    }
    events
}

#[async_trait]
impl ChatClient for OllamaClient {
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

                        // Parse newline-delimited JSON
                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].to_string();
                            buffer.drain(..=pos);

                            for event in parse_chat_line(&line) {
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
        let chunk: ChatChunk = response.json().await?;
        Ok(chunk.message.map(|m| m.content).unwrap_or_default())
    }
}
