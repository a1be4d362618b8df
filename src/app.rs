use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::history::PromptHistory;
use crate::providers::{ChatClient, Provider};
use crate::stream::{StreamAccumulator, StreamEvent, StreamOutcome};
use crate::transcript::{default_system_message, Transcript};

/// In-flight provider response for the current turn.
pub enum PendingResponse {
    /// Streaming: events drained from the channel on every tick.
    Streaming {
        rx: mpsc::Receiver<StreamEvent>,
        acc: StreamAccumulator,
    },
    /// Non-streaming: one blocking call running in the background.
    Blocking { task: JoinHandle<Result<String>> },
}

/// The conversation loop has exactly two states.
pub enum Turn {
    AwaitingInput,
    AwaitingResponse(PendingResponse),
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub transcript: Transcript,
    pub turn: Turn,
    client: Arc<dyn ChatClient>,
    stream: bool,

    // Session presentation
    pub provider: Provider,
    pub model: String,
    pub avatar: String,
    pub panel: bool,
    pub width: u16,

    // Input editing state
    pub input: String,
    pub cursor: usize, // position in chars, not bytes
    pub history: PromptHistory,
    draft: Option<String>, // stashed input while recalling history

    // Status and scroll state
    pub status: Option<String>,
    pub scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub animation_frame: u8,
}

impl App {
    pub fn new(settings: &Settings, client: Arc<dyn ChatClient>, history: PromptHistory) -> Self {
        let system_message = settings
            .system_message
            .clone()
            .unwrap_or_else(|| default_system_message(&settings.model));

        Self {
            should_quit: false,
            transcript: Transcript::new(system_message),
            turn: Turn::AwaitingInput,
            client,
            stream: settings.stream,
            provider: settings.provider,
            model: settings.model.clone(),
            avatar: settings.avatar.clone(),
            panel: settings.panel,
            width: settings.width,
            input: String::new(),
            cursor: 0,
            history,
            draft: None,
            status: None,
            scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.turn, Turn::AwaitingResponse(_))
    }

    /// Text accumulated so far for the in-flight response, if any.
    /// Empty while a blocking call runs.
    pub fn partial_response(&self) -> Option<&str> {
        match &self.turn {
            Turn::AwaitingResponse(PendingResponse::Streaming { acc, .. }) => Some(acc.text()),
            Turn::AwaitingResponse(PendingResponse::Blocking { .. }) => Some(""),
            Turn::AwaitingInput => None,
        }
    }

    /// Submit user text and start a response turn. Whitespace-only text is
    /// re-solicited: no provider call, no transcript change.
    pub async fn submit(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() || self.is_busy() {
            return Ok(());
        }

        if let Err(e) = self.history.append(text) {
            warn!("failed to persist prompt history: {e}");
        }
        self.draft = None;
        self.transcript.push_user(text);
        self.status = None;
        debug!(provider = self.provider.as_str(), "starting response turn");

        if self.stream {
            match self.client.send_streaming(&self.transcript).await {
                Ok(rx) => {
                    self.turn = Turn::AwaitingResponse(PendingResponse::Streaming {
                        rx,
                        acc: StreamAccumulator::new(),
                    });
                }
                Err(e) => self.fail_turn(e.to_string()),
            }
        } else {
            let client = Arc::clone(&self.client);
            let transcript = self.transcript.clone();
            let task = tokio::spawn(async move { client.send(&transcript).await });
            self.turn = Turn::AwaitingResponse(PendingResponse::Blocking { task });
        }

        self.scroll_to_bottom();
        Ok(())
    }

    /// Tick: advance the busy animation and drain whatever the provider has
    /// produced since the last redraw. Draining everything per tick is what
    /// coalesces bursts under the redraw rate cap.
    pub async fn on_tick(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }

        let outcome = match &mut self.turn {
            Turn::AwaitingInput => None,
            Turn::AwaitingResponse(PendingResponse::Streaming { rx, acc }) => {
                let mut outcome = None;
                loop {
                    match rx.try_recv() {
                        Ok(event) => {
                            if let Some(o) = acc.feed(event) {
                                outcome = Some(o);
                                break;
                            }
                        }
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            outcome = Some(acc.complete());
                            break;
                        }
                    }
                }
                outcome
            }
            Turn::AwaitingResponse(PendingResponse::Blocking { task }) => {
                if task.is_finished() {
                    Some(match task.await {
                        Ok(Ok(text)) => StreamOutcome::Completed(text),
                        Ok(Err(e)) => StreamOutcome::Failed(e.to_string()),
                        Err(e) => StreamOutcome::Failed(e.to_string()),
                    })
                } else {
                    None
                }
            }
        };

        if let Some(outcome) = outcome {
            self.finish_turn(outcome);
        } else if self.is_busy() {
            self.scroll_to_bottom();
        }
    }

    /// Unconditionally returns to AwaitingInput; the transcript gains the
    /// assistant message only on success.
    fn finish_turn(&mut self, outcome: StreamOutcome) {
        match outcome {
            StreamOutcome::Completed(text) => {
                debug!(chars = text.len(), "response turn completed");
                self.transcript.push_assistant(text);
                self.turn = Turn::AwaitingInput;
            }
            StreamOutcome::Failed(err) => {
                debug!("response turn failed: {err}");
                self.fail_turn(err);
            }
        }
        self.scroll_to_bottom();
    }

    fn fail_turn(&mut self, err: String) {
        self.status = Some(format!("Error: {err}"));
        self.turn = Turn::AwaitingInput;
    }

    /// Recall the previous history entry into the input box.
    pub fn recall_prev(&mut self) {
        if !self.history.is_recalling() {
            self.draft = Some(self.input.clone());
        }
        if let Some(entry) = self.history.prev() {
            self.input = entry.to_string();
            self.cursor = self.input.chars().count();
        }
    }

    /// Recall the next history entry, or restore the stashed draft when
    /// walking past the newest one.
    pub fn recall_next(&mut self) {
        if !self.history.is_recalling() {
            return;
        }
        match self.history.next() {
            Some(entry) => self.input = entry.to_string(),
            None => self.input = self.draft.take().unwrap_or_default(),
        }
        self.cursor = self.input.chars().count();
    }

    /// Tick animation frame used by the Thinking indicator.
    pub fn thinking_dots(&self) -> String {
        ".".repeat(self.animation_frame as usize + 1)
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.total_chat_lines().saturating_sub(self.chat_height);
        self.scroll = (self.scroll + lines).min(max);
    }

    /// Scroll the chat pane so the newest content is visible.
    pub fn scroll_to_bottom(&mut self) {
        let total_lines = self.total_chat_lines();
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        if total_lines > visible_height {
            self.scroll = total_lines - visible_height;
        } else {
            self.scroll = 0;
        }
    }

    /// Estimate of wrapped chat lines, mirroring the render layout.
    fn total_chat_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        let count_body = |content: &str| -> u16 {
            let mut lines: u16 = 0;
            for line in content.lines() {
                // Character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    lines += 1;
                } else {
                    lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            lines
        };

        for msg in self.transcript.turns() {
            total_lines += 1; // role line
            total_lines += count_body(&msg.content);
            total_lines += 1; // blank line after message
        }

        if let Some(partial) = self.partial_response() {
            total_lines += 2; // role line + Thinking indicator
            total_lines += count_body(partial);
        }

        total_lines
    }
}
