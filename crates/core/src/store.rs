//! ConversationStore trait: durable, per-user conversation persistence.
//!
//! Implementations live in the `deepsearch-store` crate.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::identity::UserId;
use crate::message::{Conversation, ConversationId, ConversationSummary, Message};

/// Input to [`ConversationStore::upsert`].
#[derive(Debug, Clone)]
pub struct UpsertConversation {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub title: String,
    /// The complete message list; replaces whatever was stored before.
    pub messages: Vec<Message>,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Backend name (e.g. "sqlite").
    fn name(&self) -> &str;

    /// Create or fully replace a conversation in one atomic transaction.
    ///
    /// Fails with [`StoreError::UnknownUser`] if the user row is missing and
    /// [`StoreError::OwnershipViolation`] if the id belongs to someone else.
    /// Display order of the stored messages equals their index in
    /// `request.messages`.
    async fn upsert(&self, request: UpsertConversation) -> Result<Conversation, StoreError>;

    /// Fetch a conversation owned by `user_id`.
    ///
    /// "Does not exist" and "owned by someone else" both yield `Ok(None)`.
    async fn get(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<Option<Conversation>, StoreError>;

    /// All conversations of `user_id`, most recently updated first.
    async fn list(&self, user_id: &UserId) -> Result<Vec<ConversationSummary>, StoreError>;
}
