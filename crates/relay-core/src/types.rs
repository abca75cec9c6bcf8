use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deterministic user and configure ids.
const RELAY_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93d7_4b0a_8e55_1d2c_3b4a_5f60);

// =============================================================================
// Identifiers
// =============================================================================

/// Opaque, stable internal user identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserUid(pub String);

impl UserUid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Derive a uid from a platform-specific external id.
    ///
    /// The same external id always yields the same uid, which keeps roster
    /// re-imports idempotent.
    pub fn derive(external_id: &str) -> Self {
        Self(Uuid::new_v5(&RELAY_NAMESPACE, external_id.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one inbound event: `<platform>:<native message id>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(platform: &str, message_id: &str) -> Self {
        Self(format!("{}:{}", platform, message_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build a deterministic configure id from a kind and its discriminating fields.
///
/// Re-adding an identical configuration yields the same id.
pub fn configure_id(kind: &str, discriminators: &[&str]) -> String {
    let joined = discriminators.join("\u{1f}");
    format!(
        "{}:{}",
        kind,
        Uuid::new_v5(&RELAY_NAMESPACE, joined.as_bytes()).simple()
    )
}

/// Opaque configuration blob used to materialize providers and adapters.
pub type Configure = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// Users
// =============================================================================

/// Account status of a user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Disabled,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Disabled => write!(f, "disabled"),
        }
    }
}

/// An internal user record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: UserUid,
    pub name: String,
    #[serde(default)]
    pub status: UserStatus,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

// =============================================================================
// Inbound messages
// =============================================================================

/// Capability class of a platform message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Voice,
    Event,
    Unknown,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Text => write!(f, "text"),
            MessageType::Image => write!(f, "image"),
            MessageType::Voice => write!(f, "voice"),
            MessageType::Event => write!(f, "event"),
            MessageType::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "voice" => Ok(MessageType::Voice),
            "event" => Ok(MessageType::Event),
            "unknown" => Ok(MessageType::Unknown),
            _ => Err(format!("Unknown message type: {}", s)),
        }
    }
}

/// Payload of a platform message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text { content: String },
    /// Anything the relay does not interpret; kept for the history record.
    Opaque { raw: serde_json::Value },
}

/// A platform-native inbound message, reduced to what the relay needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform label, e.g. `wecom`.
    pub platform: String,
    /// Native message id, unique per delivered event on that platform.
    pub message_id: String,
    /// Native sender id.
    pub sender_id: String,
    pub message_type: MessageType,
    pub content: MessageContent,
    pub send_time: DateTime<Utc>,
}

impl InboundMessage {
    /// Build a plain-text message sent now.
    pub fn text(platform: &str, message_id: &str, sender_id: &str, content: &str) -> Self {
        Self {
            platform: platform.to_string(),
            message_id: message_id.to_string(),
            sender_id: sender_id.to_string(),
            message_type: MessageType::Text,
            content: MessageContent::Text {
                content: content.to_string(),
            },
            send_time: Utc::now(),
        }
    }

    /// Text body, if the message carries one.
    pub fn text_content(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { content } => Some(content),
            MessageContent::Opaque { .. } => None,
        }
    }

    pub fn send_time(&self) -> DateTime<Utc> {
        self.send_time
    }

    pub fn source_id(&self) -> &str {
        &self.sender_id
    }

    pub fn session_id(&self) -> SessionId {
        SessionId::new(&self.platform, &self.message_id)
    }
}

// =============================================================================
// Sessions
// =============================================================================

/// Processing state of a session in the dedup ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    None,
    Processing,
    Completion,
    Error,
}

impl SessionStatus {
    /// `Completion` and `Error` end a processing attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completion | SessionStatus::Error)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::None => write!(f, "none"),
            SessionStatus::Processing => write!(f, "processing"),
            SessionStatus::Completion => write!(f, "completion"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SessionStatus::None),
            "processing" => Ok(SessionStatus::Processing),
            "completion" => Ok(SessionStatus::Completion),
            "error" => Ok(SessionStatus::Error),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// One (event, answer provider) unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Owning user; `None` means the sender is not authorized.
    pub user: Option<User>,
    /// Which answer provider handles this branch.
    pub answer_id: String,
    pub question: InboundMessage,
    pub answer: Option<String>,
}

impl Session {
    pub fn new(user: Option<User>, answer_id: &str, question: InboundMessage) -> Self {
        Self {
            id: question.session_id(),
            user,
            answer_id: answer_id.to_string(),
            question,
            answer: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_derivation_is_deterministic() {
        let a = UserUid::derive("13800000000");
        let b = UserUid::derive("13800000000");
        let c = UserUid::derive("13800000001");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn test_configure_id_is_deterministic() {
        let a = configure_id("chatgpt", &["sk-token"]);
        let b = configure_id("chatgpt", &["sk-token"]);
        assert_eq!(a, b);
        assert!(a.starts_with("chatgpt:"));
        assert_ne!(a, configure_id("chatgpt", &["sk-other"]));
    }

    #[test]
    fn test_configure_id_separates_fields() {
        // ["ab", "c"] and ["a", "bc"] must not collide.
        assert_ne!(
            configure_id("wecom", &["ab", "c"]),
            configure_id("wecom", &["a", "bc"])
        );
    }

    #[test]
    fn test_session_id_format() {
        let id = SessionId::new("wecom", "7");
        assert_eq!(id.as_str(), "wecom:7");
        assert_eq!(id.to_string(), "wecom:7");
    }

    #[test]
    fn test_inbound_text_accessors() {
        let msg = InboundMessage::text("wecom", "42", "alice", "hello");
        assert_eq!(msg.text_content(), Some("hello"));
        assert_eq!(msg.source_id(), "alice");
        assert_eq!(msg.session_id(), SessionId::new("wecom", "42"));
    }

    #[test]
    fn test_opaque_content_has_no_text() {
        let mut msg = InboundMessage::text("wecom", "1", "alice", "x");
        msg.message_type = MessageType::Image;
        msg.content = MessageContent::Opaque {
            raw: serde_json::json!({"media_id": "m-1"}),
        };
        assert_eq!(msg.text_content(), None);
    }

    #[test]
    fn test_session_status_roundtrip_str() {
        for status in [
            SessionStatus::None,
            SessionStatus::Processing,
            SessionStatus::Completion,
            SessionStatus::Error,
        ] {
            let parsed: SessionStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("done".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_session_status_terminal() {
        assert!(!SessionStatus::None.is_terminal());
        assert!(!SessionStatus::Processing.is_terminal());
        assert!(SessionStatus::Completion.is_terminal());
        assert!(SessionStatus::Error.is_terminal());
    }

    #[test]
    fn test_session_new_derives_id_from_question() {
        let q = InboundMessage::text("wecom", "7", "bob", "hi");
        let s = Session::new(None, "gpt-a", q);
        assert_eq!(s.id.as_str(), "wecom:7");
        assert_eq!(s.answer_id, "gpt-a");
        assert!(s.answer.is_none());
    }

    #[test]
    fn test_session_serde_roundtrip() {
        let user = User {
            uid: UserUid::new("u-1"),
            name: "Bob".to_string(),
            status: UserStatus::Active,
        };
        let mut s = Session::new(
            Some(user),
            "gpt-a",
            InboundMessage::text("wecom", "7", "bob", "hi"),
        );
        s.answer = Some("hello".to_string());
        let json = serde_json::to_string(&s).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_user_status_defaults_to_active() {
        let user: User = serde_json::from_str(r#"{"uid":"u-1","name":"Ann"}"#).unwrap();
        assert!(user.is_active());
    }
}
