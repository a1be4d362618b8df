use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

pub const APP_NAME: &str = "llm-term";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One transcript entry. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered conversation history sent to the provider on every turn.
///
/// The first entry is always the system message; it is never removed or
/// reordered. Only the conversation loop appends to it.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new(system_message: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_message)],
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system(&self) -> &Message {
        &self.messages[0]
    }

    /// Messages after the system entry, oldest first.
    pub fn turns(&self) -> &[Message] {
        &self.messages[1..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Build the default system message when the user supplies none.
pub fn default_system_message(model: &str) -> String {
    format!(
        "You are a helpful AI assistant named {APP_NAME}, based on the model {model}. \
         Help the user by responding to their request, the output should be concise and \
         always written in markdown. Ensure that all code blocks have the correct \
         language tag.\n\n\
         The current UTC date and time at the start of this conversation is {}.",
        utc_timestamp()
    )
}

/// Current UTC time as "YYYY-MM-DD HH:MM:SS UTC" from the system clock.
fn utc_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hour, minute, second) = (rem / 3600, (rem % 3600) / 60, rem % 60);
    let (year, month, day) = civil_from_days(days as i64);
    format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02} UTC")
}

/// Gregorian calendar date from days since 1970-01-01.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_starts_with_system_message() {
        let transcript = Transcript::new("be helpful");
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.system().role, Role::System);
        assert_eq!(transcript.system().content, "be helpful");
    }

    #[test]
    fn test_transcript_appends_in_order() {
        let mut transcript = Transcript::new("sys");
        transcript.push_user("hello");
        transcript.push_assistant("hi there");
        transcript.push_user("how are you?");

        let roles: Vec<Role> = transcript.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(transcript.system().role, Role::System);
        assert_eq!(transcript.turns().len(), 3);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = Message::assistant("ok");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "ok");
    }

    #[test]
    fn test_default_system_message_mentions_model() {
        let msg = default_system_message("gpt-4o-mini");
        assert!(msg.contains("gpt-4o-mini"));
        assert!(msg.contains(APP_NAME));
        assert!(msg.contains("UTC"));
    }

    #[test]
    fn test_civil_from_days_epoch_and_leap() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        // 2000-02-29 is day 11016
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
        // 2024-01-01 is day 19723
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }
}
