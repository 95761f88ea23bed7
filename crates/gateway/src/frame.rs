//! The outbound frame protocol and its ordered sink.
//!
//! A chat response is one stream of frames. Each frame becomes one SSE
//! event whose name is the frame kind:
//!
//! - `control`: `{"type":"NEW_CHAT_CREATED","conversationId":"..."}`
//! - `text`: `{"delta":"..."}`
//! - `tool`: a tool invocation in the same shape as a stored part
//! - `error`: `{"message":"..."}`; always the last frame

use deepsearch_core::message::{ConversationId, ToolInvocation};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Out-of-band application events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlEvent {
    NewChatCreated {
        #[serde(rename = "conversationId")]
        conversation_id: ConversationId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Control(ControlEvent),
    Text { delta: String },
    ToolEvent(ToolInvocation),
    Error { message: String },
}

impl Frame {
    /// SSE event name for this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Control(_) => "control",
            Self::Text { .. } => "text",
            Self::ToolEvent(_) => "tool",
            Self::Error { .. } => "error",
        }
    }

    /// JSON body of the SSE event.
    pub fn data(&self) -> String {
        let value = match self {
            Self::Control(event) => serde_json::to_value(event),
            Self::Text { delta } => Ok(serde_json::json!({ "delta": delta })),
            Self::ToolEvent(invocation) => serde_json::to_value(invocation),
            Self::Error { message } => Ok(serde_json::json!({ "message": message })),
        };
        value.map(|v| v.to_string()).unwrap_or_default()
    }

    /// Rebuild a frame from an SSE event name and data line.
    pub fn decode(kind: &str, data: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(data).ok()?;
        match kind {
            "control" => serde_json::from_value(value).ok().map(Self::Control),
            "text" => Some(Self::Text {
                delta: value.get("delta")?.as_str()?.to_string(),
            }),
            "tool" => serde_json::from_value(value).ok().map(Self::ToolEvent),
            "error" => Some(Self::Error {
                message: value.get("message")?.as_str()?.to_string(),
            }),
            _ => None,
        }
    }
}

/// Decode a complete `text/event-stream` body into frames.
pub fn decode_sse(body: &str) -> Vec<Frame> {
    let mut frames = Vec::new();
    for block in body.split("\n\n") {
        let mut kind = None;
        let mut data = String::new();
        for line in block.lines() {
            if let Some(rest) = line.strip_prefix("event:") {
                kind = Some(rest.trim());
            } else if let Some(rest) = line.strip_prefix("data:") {
                data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
            }
        }
        if let Some(frame) = kind.and_then(|k| Frame::decode(k, &data)) {
            frames.push(frame);
        }
    }
    frames
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("stream already terminated by an error frame")]
    Closed,

    #[error("client disconnected")]
    Disconnected,

    #[error("control frame must precede all content and appear once")]
    ControlOutOfOrder,
}

/// Ordered, single-consumer sink for one response.
///
/// Frames are delivered in push order. A control frame is accepted at most
/// once and only before any text or tool frame. After an error frame the
/// sink rejects everything.
pub struct FrameSink {
    tx: mpsc::Sender<Frame>,
    control_sent: bool,
    content_sent: bool,
    closed: bool,
}

/// Create a sink and the receiver that feeds the transport.
pub fn channel(capacity: usize) -> (FrameSink, mpsc::Receiver<Frame>) {
    let (tx, rx) = mpsc::channel(capacity);
    let sink = FrameSink {
        tx,
        control_sent: false,
        content_sent: false,
        closed: false,
    };
    (sink, rx)
}

impl FrameSink {
    pub async fn push(&mut self, frame: Frame) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        match &frame {
            Frame::Control(_) => {
                if self.control_sent || self.content_sent {
                    return Err(SinkError::ControlOutOfOrder);
                }
                self.control_sent = true;
            }
            Frame::Text { .. } | Frame::ToolEvent(_) => self.content_sent = true,
            Frame::Error { .. } => self.closed = true,
        }
        self.tx.send(frame).await.map_err(|_| SinkError::Disconnected)
    }

    pub async fn control(&mut self, event: ControlEvent) -> Result<(), SinkError> {
        self.push(Frame::Control(event)).await
    }

    pub async fn text(&mut self, delta: impl Into<String>) -> Result<(), SinkError> {
        self.push(Frame::Text {
            delta: delta.into(),
        })
        .await
    }

    pub async fn tool_event(&mut self, invocation: ToolInvocation) -> Result<(), SinkError> {
        self.push(Frame::ToolEvent(invocation)).await
    }

    /// Push the terminal error frame.
    pub async fn error(&mut self, message: impl Into<String>) -> Result<(), SinkError> {
        self.push(Frame::Error {
            message: message.into(),
        })
        .await
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// A handle that resolves once the consumer has gone away.
    pub fn disconnect_watch(&self) -> DisconnectWatch {
        DisconnectWatch(self.tx.clone())
    }
}

/// Resolves when the receiving side of a sink is dropped.
#[derive(Clone)]
pub struct DisconnectWatch(mpsc::Sender<Frame>);

impl DisconnectWatch {
    pub async fn disconnected(&self) {
        self.0.closed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn created() -> ControlEvent {
        ControlEvent::NewChatCreated {
            conversation_id: ConversationId::from("c-1"),
        }
    }

    #[tokio::test]
    async fn preserves_push_order() {
        let (mut sink, mut rx) = channel(8);
        sink.control(created()).await.unwrap();
        sink.text("Hel").await.unwrap();
        sink.tool_event(ToolInvocation::call("t1", "search_web", json!({"query": "q"}), 0))
            .await
            .unwrap();
        sink.text("lo").await.unwrap();
        drop(sink);

        let mut kinds = Vec::new();
        while let Some(frame) = rx.recv().await {
            kinds.push(frame.kind());
        }
        assert_eq!(kinds, ["control", "text", "tool", "text"]);
    }

    #[tokio::test]
    async fn control_after_content_is_rejected() {
        let (mut sink, _rx) = channel(8);
        sink.text("hi").await.unwrap();
        assert_eq!(sink.control(created()).await, Err(SinkError::ControlOutOfOrder));
    }

    #[tokio::test]
    async fn control_is_accepted_once() {
        let (mut sink, _rx) = channel(8);
        sink.control(created()).await.unwrap();
        assert_eq!(sink.control(created()).await, Err(SinkError::ControlOutOfOrder));
    }

    #[tokio::test]
    async fn error_is_terminal() {
        let (mut sink, mut rx) = channel(8);
        sink.text("partial").await.unwrap();
        sink.error("Oops").await.unwrap();
        assert!(sink.is_closed());
        assert_eq!(sink.text("more").await, Err(SinkError::Closed));
        assert_eq!(sink.error("again").await, Err(SinkError::Closed));
        drop(sink);

        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].kind(), "error");
    }

    #[tokio::test]
    async fn dropped_receiver_reports_disconnect() {
        let (mut sink, rx) = channel(8);
        let watch = sink.disconnect_watch();
        drop(rx);
        watch.disconnected().await;
        assert_eq!(sink.text("x").await, Err(SinkError::Disconnected));
    }

    #[test]
    fn control_frame_wire_shape() {
        let frame = Frame::Control(created());
        let data: serde_json::Value = serde_json::from_str(&frame.data()).unwrap();
        assert_eq!(data, json!({"type": "NEW_CHAT_CREATED", "conversationId": "c-1"}));
    }

    #[test]
    fn decode_sse_body() {
        let mut invocation = ToolInvocation::call("t1", "search_web", json!({"query": "q"}), 0);
        invocation.complete(json!([]));
        let frames = vec![
            Frame::Control(created()),
            Frame::ToolEvent(invocation),
            Frame::Text { delta: "Sunny".into() },
            Frame::Error { message: "Oops".into() },
        ];
        let body: String = frames
            .iter()
            .map(|f| format!("event: {}\ndata: {}\n\n", f.kind(), f.data()))
            .collect();
        assert_eq!(decode_sse(&body), frames);
    }
}
