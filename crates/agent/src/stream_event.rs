//! Events produced by one run of the agent loop.
//!
//! The gateway turns these into wire frames; nothing here knows about HTTP.

use deepsearch_core::error::ProviderError;
use deepsearch_core::message::{Message, ToolInvocation};

/// Why a run ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The model answered without requesting another tool call.
    Stop,
    /// The step budget ran out; the transcript so far is still returned.
    StepLimit,
}

/// Why a run ended abnormally.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoopFailure {
    #[error("Model requested unknown tool: {0}")]
    UnknownTool(String),

    #[error("Generation failed: {0}")]
    Generation(#[from] ProviderError),

    #[error("Run cancelled")]
    Cancelled,
}

/// Events emitted by the agent loop, in production order.
#[derive(Debug, Clone)]
pub enum LoopEvent {
    /// Partial answer text from the model.
    TextDelta { delta: String },

    /// The model asked for a tool; `invocation.state` is `Call`.
    ToolCallRequested { step: u32, invocation: ToolInvocation },

    /// The tool ran or was rejected; `invocation.state` is `Result`.
    ToolCallResult { step: u32, invocation: ToolInvocation },

    /// One generation (plus its tool calls) is done.
    StepCompleted { step: u32 },

    /// Terminal: `messages` holds what this run produced.
    Finished {
        messages: Vec<Message>,
        steps: u32,
        reason: FinishReason,
    },

    /// Terminal: `messages` holds whatever was produced before the failure.
    Failed {
        reason: LoopFailure,
        messages: Vec<Message>,
    },
}

impl LoopEvent {
    /// Short name used in logs.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::ToolCallRequested { .. } => "tool_call_requested",
            Self::ToolCallResult { .. } => "tool_call_result",
            Self::StepCompleted { .. } => "step_completed",
            Self::Finished { .. } => "finished",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Failed { .. })
    }
}
