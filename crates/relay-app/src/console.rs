//! Console platform adapter.
//!
//! Reads one JSON message per stdin line and writes answers to stdout as
//! JSON lines. Stands in for a real messaging platform.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use relay_chat::{CompletionError, CompletionHandler};
use relay_core::types::{InboundMessage, Session};

/// One inbound line, e.g. `{"message_id":"1","sender_id":"ann","text":"hi"}`.
#[derive(Debug, Deserialize)]
pub struct ConsoleEvent {
    pub message_id: String,
    pub sender_id: String,
    pub text: String,
    /// Defaults to the time the line is read.
    #[serde(default)]
    pub send_time: Option<DateTime<Utc>>,
}

impl ConsoleEvent {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn into_message(self, platform: &str) -> InboundMessage {
        let mut message =
            InboundMessage::text(platform, &self.message_id, &self.sender_id, &self.text);
        if let Some(sent) = self.send_time {
            message.send_time = sent;
        }
        message
    }
}

/// Prints each completed answer to stdout.
pub struct ConsoleReply;

#[async_trait]
impl CompletionHandler for ConsoleReply {
    fn name(&self) -> &str {
        "console_reply"
    }

    async fn on_completion(&self, session: &mut Session) -> Result<(), CompletionError> {
        let line = serde_json::json!({
            "session_id": session.id.as_str(),
            "answer_id": session.answer_id,
            "to": session.question.source_id(),
            "answer": session.answer,
        });
        println!("{}", line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::types::{MessageType, SessionId};

    #[test]
    fn test_parse_minimal_line() {
        let event =
            ConsoleEvent::parse(r#"{"message_id":"1","sender_id":"ann","text":"hi"}"#).unwrap();
        let before = Utc::now();
        let msg = event.into_message("console");
        assert_eq!(msg.session_id(), SessionId::new("console", "1"));
        assert_eq!(msg.message_type, MessageType::Text);
        assert_eq!(msg.text_content(), Some("hi"));
        assert!(msg.send_time >= before);
    }

    #[test]
    fn test_parse_with_send_time() {
        let event = ConsoleEvent::parse(
            r#"{"message_id":"2","sender_id":"ann","text":"hi","send_time":"2026-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        let msg = event.into_message("console");
        assert_eq!(msg.send_time.to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert!(ConsoleEvent::parse(r#"{"message_id":"1"}"#).is_err());
        assert!(ConsoleEvent::parse("not json").is_err());
    }

    #[tokio::test]
    async fn test_reply_succeeds() {
        let mut session = Session::new(
            None,
            "echo:1",
            InboundMessage::text("console", "1", "ann", "hi"),
        );
        session.answer = Some("hi".to_string());
        assert!(ConsoleReply.on_completion(&mut session).await.is_ok());
    }
}
