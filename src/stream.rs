//! Normalized streaming contract between the providers and the chat loop.
//!
//! Every provider back end maps its own wire format (NDJSON lines, SSE
//! events) into [`StreamEvent`]s at its boundary, so nothing downstream ever
//! inspects provider-specific response shapes.

/// One normalized unit of provider output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental chunk of assistant text.
    Delta(String),
    /// The provider signaled the end of the response. Carries no text.
    Done,
    /// The stream failed mid-flight.
    Failed(String),
}

/// How a response turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The fully accumulated assistant text (may be empty).
    Completed(String),
    /// The turn failed; any partial text has been discarded.
    Failed(String),
}

/// Accumulates streamed deltas into a single assistant message.
///
/// Deltas are appended in arrival order. `Done` (or channel exhaustion,
/// reported via [`StreamAccumulator::complete`]) terminates the stream;
/// events arriving after termination are ignored. A failure discards the
/// partial text.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    finished: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text accumulated so far, for intermediate rendering.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one event. Returns the outcome once the stream terminates.
    pub fn feed(&mut self, event: StreamEvent) -> Option<StreamOutcome> {
        if self.finished {
            return None;
        }
        match event {
            StreamEvent::Delta(chunk) => {
                self.text.push_str(&chunk);
                None
            }
            StreamEvent::Done => {
                self.finished = true;
                Some(StreamOutcome::Completed(self.text.clone()))
            }
            StreamEvent::Failed(err) => {
                self.finished = true;
                self.text.clear();
                Some(StreamOutcome::Failed(err))
            }
        }
    }

    /// Terminate on channel exhaustion. Equivalent to receiving `Done`.
    pub fn complete(&mut self) -> StreamOutcome {
        self.finished = true;
        StreamOutcome::Completed(self.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deltas(parts: &[&str]) -> Vec<StreamEvent> {
        parts
            .iter()
            .map(|p| StreamEvent::Delta((*p).to_string()))
            .collect()
    }

    #[test]
    fn test_concatenates_deltas_in_order() {
        let mut acc = StreamAccumulator::new();
        for event in deltas(&["one ", "two ", "three"]) {
            assert_eq!(acc.feed(event), None);
        }
        assert_eq!(acc.complete(), StreamOutcome::Completed("one two three".into()));
    }

    #[test]
    fn test_hello_world_scenario() {
        let mut acc = StreamAccumulator::new();
        for event in deltas(&["Hel", "lo, ", "world"]) {
            acc.feed(event);
        }
        assert_eq!(
            acc.feed(StreamEvent::Done),
            Some(StreamOutcome::Completed("Hello, world".into()))
        );
    }

    #[test]
    fn test_done_truncates_later_fragments() {
        let mut acc = StreamAccumulator::new();
        acc.feed(StreamEvent::Delta("kept".into()));
        let outcome = acc.feed(StreamEvent::Done);
        assert_eq!(outcome, Some(StreamOutcome::Completed("kept".into())));

        // Fragments after the terminal marker are ignored, whatever they carry.
        assert_eq!(acc.feed(StreamEvent::Delta("dropped".into())), None);
        assert_eq!(acc.feed(StreamEvent::Done), None);
        assert_eq!(acc.text(), "kept");
    }

    #[test]
    fn test_empty_stream_yields_empty_message() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.complete(), StreamOutcome::Completed(String::new()));
        assert!(acc.is_finished());
    }

    #[test]
    fn test_done_carries_no_text() {
        let mut acc = StreamAccumulator::new();
        let outcome = acc.feed(StreamEvent::Done);
        assert_eq!(outcome, Some(StreamOutcome::Completed(String::new())));
    }

    #[test]
    fn test_failure_discards_partial_text() {
        let mut acc = StreamAccumulator::new();
        acc.feed(StreamEvent::Delta("partial ".into()));
        acc.feed(StreamEvent::Delta("answer".into()));
        let outcome = acc.feed(StreamEvent::Failed("connection reset".into()));
        assert_eq!(outcome, Some(StreamOutcome::Failed("connection reset".into())));
        assert_eq!(acc.text(), "");
    }

    #[test]
    fn test_intermediate_text_visible_while_streaming() {
        let mut acc = StreamAccumulator::new();
        acc.feed(StreamEvent::Delta("par".into()));
        assert_eq!(acc.text(), "par");
        assert!(!acc.is_finished());
        acc.feed(StreamEvent::Delta("tial".into()));
        assert_eq!(acc.text(), "partial");
    }
}
