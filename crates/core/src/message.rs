//! Message and Conversation domain types.
//!
//! A message is an ordered list of [`Part`]s. Callers may still submit the
//! older single-`content` shape; it is folded into one text part when the
//! message is deserialized, so nothing past the wire boundary ever sees it.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::identity::UserId;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

/// Lifecycle of a tool invocation recorded inside a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationState {
    /// The model asked for the tool; no result yet.
    Call,
    /// The tool ran (or was rejected) and `result` is populated.
    Result,
}

/// A tool call and, once available, its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    /// Matches the model's tool call id
    pub tool_call_id: String,

    /// Name of the tool that was invoked
    pub tool_name: String,

    /// Arguments as supplied by the model
    #[serde(default)]
    pub args: serde_json::Value,

    pub state: InvocationState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Generation step that produced the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
}

impl ToolInvocation {
    pub fn call(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: serde_json::Value,
        step: u32,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args,
            state: InvocationState::Call,
            result: None,
            step: Some(step),
        }
    }

    /// Transition to the `result` state.
    pub fn complete(&mut self, result: serde_json::Value) {
        self.state = InvocationState::Result;
        self.result = Some(result);
    }
}

/// A typed fragment of a message.
///
/// Part kinds this crate does not understand are kept verbatim in
/// [`Part::Unknown`] so they survive a read-modify-write cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text { text: String },
    ToolInvocation(ToolInvocation),
    Unknown(serde_json::Value),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Classify a raw JSON part.
    pub fn from_value(value: serde_json::Value) -> Self {
        match value.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                // Older rows stored text under `content`.
                let text = value
                    .get("text")
                    .or_else(|| value.get("content"))
                    .and_then(|t| t.as_str());
                match text {
                    Some(text) => Self::text(text),
                    None => Self::Unknown(value),
                }
            }
            Some("tool-invocation") => {
                let parsed = value
                    .get("toolInvocation")
                    .cloned()
                    .map(serde_json::from_value::<ToolInvocation>);
                match parsed {
                    Some(Ok(invocation)) => Self::ToolInvocation(invocation),
                    _ => Self::Unknown(value),
                }
            }
            _ => Self::Unknown(value),
        }
    }
}

impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text { text } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "text")?;
                map.serialize_entry("text", text)?;
                map.end()
            }
            Self::ToolInvocation(invocation) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "tool-invocation")?;
                map.serialize_entry("toolInvocation", invocation)?;
                map.end()
            }
            Self::Unknown(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_value(value))
    }
}

/// Wire shape accepted from callers: either `parts`, or the older `content`.
#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<String>,
    role: Role,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    parts: Option<Vec<Part>>,
}

impl From<RawMessage> for Message {
    fn from(raw: RawMessage) -> Self {
        let parts = match (raw.parts, raw.content) {
            (Some(parts), _) if !parts.is_empty() => parts,
            (_, Some(content)) => vec![Part::text(content)],
            (parts, None) => parts.unwrap_or_default(),
        };
        Self {
            id: raw.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            role: raw.role,
            parts,
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMessage")]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// Ordered content fragments
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            parts,
        }
    }

    /// Create a new user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    /// Create a new assistant message with the given parts.
    pub fn assistant(parts: Vec<Part>) -> Self {
        Self::new(Role::Assistant, parts)
    }

    /// Create a new system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Part::text(text)])
    }

    /// All text parts joined together.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// First text part, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(Part::as_text)
    }

    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolInvocation(inv) => Some(inv),
            _ => None,
        })
    }
}

/// A persisted conversation with its messages in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,

    /// The single owner of this conversation
    pub user_id: UserId,

    pub title: String,

    /// Ordered messages; index == display order
    pub messages: Vec<Message>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Conversation without message bodies, for list views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub user_id: UserId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello, agent!");
        assert_eq!(msg.parts.len(), 1);
    }

    #[test]
    fn legacy_content_becomes_text_part() {
        let msg: Message =
            serde_json::from_value(json!({"id": "m1", "role": "user", "content": "hi there"}))
                .unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.parts, vec![Part::text("hi there")]);
    }

    #[test]
    fn parts_win_over_content() {
        let msg: Message = serde_json::from_value(json!({
            "role": "assistant",
            "content": "ignored",
            "parts": [{"type": "text", "text": "kept"}]
        }))
        .unwrap();
        assert_eq!(msg.text(), "kept");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn legacy_text_part_with_content_field() {
        let part = Part::from_value(json!({"type": "text", "content": "old row"}));
        assert_eq!(part, Part::text("old row"));
    }

    #[test]
    fn tool_invocation_part_parses() {
        let part = Part::from_value(json!({
            "type": "tool-invocation",
            "toolInvocation": {
                "toolCallId": "call_1",
                "toolName": "search_web",
                "args": {"query": "weather Paris"},
                "state": "result",
                "result": [{"title": "t", "link": "l", "snippet": "s"}]
            }
        }));
        match part {
            Part::ToolInvocation(inv) => {
                assert_eq!(inv.tool_name, "search_web");
                assert_eq!(inv.state, InvocationState::Result);
                assert!(inv.result.is_some());
            }
            other => panic!("expected tool invocation, got {other:?}"),
        }
    }

    #[test]
    fn unknown_part_is_preserved_verbatim() {
        let raw = json!({"type": "reasoning", "reasoning": "thinking..."});
        let part = Part::from_value(raw.clone());
        assert_eq!(part, Part::Unknown(raw.clone()));
        assert_eq!(serde_json::to_value(&part).unwrap(), raw);
    }

    #[test]
    fn partial_call_state_falls_back_to_unknown() {
        let raw = json!({
            "type": "tool-invocation",
            "toolInvocation": {"toolCallId": "c", "toolName": "x", "state": "partial-call"}
        });
        assert!(matches!(Part::from_value(raw), Part::Unknown(_)));
    }

    #[test]
    fn invocation_serializes_in_wire_shape() {
        let mut inv = ToolInvocation::call("call_9", "search_web", json!({"query": "q"}), 0);
        inv.complete(json!(["r"]));
        let value = serde_json::to_value(Part::ToolInvocation(inv)).unwrap();
        assert_eq!(value["type"], "tool-invocation");
        assert_eq!(value["toolInvocation"]["toolCallId"], "call_9");
        assert_eq!(value["toolInvocation"]["state"], "result");
    }

    #[test]
    fn first_text_skips_tool_parts() {
        let msg = Message::assistant(vec![
            Part::ToolInvocation(ToolInvocation::call("c", "t", json!({}), 0)),
            Part::text("answer"),
        ]);
        assert_eq!(msg.first_text(), Some("answer"));
        assert_eq!(msg.tool_invocations().count(), 1);
    }
}
