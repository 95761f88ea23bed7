//! The agent loop: the heart of DeepSearch.
//!
//! Each run follows a **generate → act → observe** cycle:
//!
//! 1. **Send** the conversation plus tool declarations to the provider
//! 2. **Stream** text deltas out as they arrive
//! 3. **If tool calls**: validate, execute, record results, loop back to 1
//! 4. **If text only**: finish with the produced assistant message
//!
//! The loop also stops when the step budget is spent (returning the
//! partial transcript) or when the run is cancelled.

pub mod loop_runner;
pub mod stream_event;

pub use loop_runner::{AgentLoop, DEFAULT_STEP_LIMIT, DEFAULT_SYSTEM_PROMPT};
pub use stream_event::{FinishReason, LoopEvent, LoopFailure};
