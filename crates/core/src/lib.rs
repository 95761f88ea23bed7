//! # DeepSearch Core
//!
//! Domain types, traits, and error definitions for the DeepSearch chat
//! runtime. This crate has **no framework dependencies**; it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external capability (generation, search, identity, storage) is a
//! trait here. Implementations live in their respective crates, which keeps
//! the agent loop and orchestrator testable with in-process fakes.

pub mod error;
pub mod identity;
pub mod message;
pub mod provider;
pub mod search;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use identity::{Credentials, IdentityResolver, StaticTokenResolver, UserId};
pub use message::{
    Conversation, ConversationId, ConversationSummary, InvocationState, Message, Part, Role,
    ToolInvocation,
};
pub use provider::{Provider, ProviderRequest, StreamChunk, ToolDefinition};
pub use search::{SearchProvider, SearchResult};
pub use store::{ConversationStore, UpsertConversation};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
