//! Per-request coordination of the agent loop, the conversation store and
//! the outbound frame sink.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use deepsearch_agent::{AgentLoop, LoopEvent, LoopFailure};
use deepsearch_core::error::StoreError;
use deepsearch_core::identity::UserId;
use deepsearch_core::message::{Conversation, ConversationId, Message, Part, Role};
use deepsearch_core::store::{ConversationStore, UpsertConversation};

use crate::frame::{ControlEvent, FrameSink};

/// Client-facing text for every stream-terminal failure.
pub const GENERIC_ERROR: &str = "Oops, an error occurred!";

/// Title used when no user text can be found.
pub const FALLBACK_TITLE: &str = "New Chat";

const TITLE_MAX_CHARS: usize = 100;

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<Message>,

    /// Existing conversation to continue; omit to start a new one.
    #[serde(default, alias = "chatId")]
    pub conversation_id: Option<ConversationId>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Loop(#[from] LoopFailure),

    #[error("agent loop ended without a terminal event")]
    Interrupted,

    #[error("client disconnected")]
    Disconnected,

    #[error("request cancelled while saving the conversation")]
    Cancelled,
}

/// Drives one chat request from identity-resolved input to persisted output.
#[derive(Clone)]
pub struct ChatOrchestrator {
    agent: AgentLoop,
    store: Arc<dyn ConversationStore>,
    request_timeout: Duration,
}

impl ChatOrchestrator {
    pub fn new(agent: AgentLoop, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            agent,
            store,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Run a chat request to completion, pushing frames into `sink`.
    ///
    /// Returns the persisted conversation when the loop finished and the
    /// final upsert committed. Every error path has already pushed exactly
    /// one error frame (unless the client is gone).
    pub async fn run(
        &self,
        user_id: UserId,
        request: ChatRequest,
        mut sink: FrameSink,
        cancel: CancellationToken,
    ) -> Result<Conversation, ChatError> {
        let (conversation_id, is_new) = match request.conversation_id {
            Some(id) => (id, false),
            None => (ConversationId::new(), true),
        };
        let span = info_span!(
            "chat",
            conversation_id = %conversation_id,
            user_id = %user_id,
            new = is_new,
        );

        let result = self
            .drive(user_id, conversation_id, is_new, request.messages, &mut sink, cancel)
            .instrument(span)
            .await;

        if let Err(e) = &result {
            match e {
                ChatError::Disconnected => debug!("Client went away; no error frame sent"),
                other => {
                    error!(error = %other, "Chat request failed");
                    let _ = sink.error(GENERIC_ERROR).await;
                }
            }
        }
        result
    }

    async fn drive(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
        is_new: bool,
        messages: Vec<Message>,
        sink: &mut FrameSink,
        cancel: CancellationToken,
    ) -> Result<Conversation, ChatError> {
        let deadline = Instant::now() + self.request_timeout;

        if is_new {
            self.persist(
                UpsertConversation {
                    user_id: user_id.clone(),
                    conversation_id: conversation_id.clone(),
                    title: derive_title(&messages),
                    messages: messages.clone(),
                },
                deadline,
                &cancel,
            )
            .await?;
            info!("Conversation created");
            sink.control(ControlEvent::NewChatCreated {
                conversation_id: conversation_id.clone(),
            })
            .await
            .map_err(|_| ChatError::Disconnected)?;
        }

        let produced = self.pump(messages.clone(), sink, deadline, cancel.clone()).await?;

        let mut combined = messages;
        combined.extend(produced);
        let conversation = self
            .persist(
                UpsertConversation {
                    user_id,
                    conversation_id,
                    title: derive_title(&combined),
                    messages: combined,
                },
                deadline,
                &cancel,
            )
            .await?;
        info!(
            messages = conversation.messages.len(),
            "Conversation persisted"
        );
        Ok(conversation)
    }

    /// Upsert bounded by the request deadline and the cancel token.
    ///
    /// Abandoning the write drops its open transaction, which rolls it back.
    async fn persist(
        &self,
        upsert: UpsertConversation,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Conversation, ChatError> {
        tokio::select! {
            res = self.store.upsert(upsert) => res.map_err(ChatError::from),
            _ = tokio::time::sleep_until(deadline) => {
                warn!(timeout_secs = self.request_timeout.as_secs(), "Request deadline reached while saving");
                cancel.cancel();
                Err(ChatError::Cancelled)
            }
            _ = cancel.cancelled() => {
                debug!("Request cancelled while saving");
                Err(ChatError::Cancelled)
            }
        }
    }

    /// Forward loop events to the sink until the loop terminates.
    ///
    /// The deadline and a client disconnect both cancel the run; events keep
    /// draining afterwards so the loop can settle any in-flight tool call.
    async fn pump(
        &self,
        messages: Vec<Message>,
        sink: &mut FrameSink,
        deadline: Instant,
        cancel: CancellationToken,
    ) -> Result<Vec<Message>, ChatError> {
        let mut events = self.agent.run(messages, cancel.clone());
        let watch = sink.disconnect_watch();
        let deadline = tokio::time::sleep_until(deadline);
        tokio::pin!(deadline);
        let mut disconnected = false;
        let mut timed_out = false;

        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = &mut deadline, if !timed_out => {
                    warn!(timeout_secs = self.request_timeout.as_secs(), "Request deadline reached");
                    timed_out = true;
                    cancel.cancel();
                    continue;
                }
                _ = watch.disconnected(), if !disconnected => {
                    debug!("Client disconnected; cancelling run");
                    disconnected = true;
                    cancel.cancel();
                    continue;
                }
            };

            let Some(event) = event else {
                return Err(ChatError::Interrupted);
            };

            let delivered = match event {
                LoopEvent::TextDelta { delta } => sink.text(delta).await,
                LoopEvent::ToolCallRequested { invocation, .. }
                | LoopEvent::ToolCallResult { invocation, .. } => {
                    sink.tool_event(invocation).await
                }
                LoopEvent::StepCompleted { step } => {
                    debug!(step, "Step completed");
                    Ok(())
                }
                LoopEvent::Finished {
                    messages,
                    steps,
                    reason,
                } => {
                    info!(steps, ?reason, "Agent loop finished");
                    return Ok(messages);
                }
                LoopEvent::Failed { reason, .. } => {
                    if disconnected {
                        return Err(ChatError::Disconnected);
                    }
                    return Err(reason.into());
                }
            };

            if delivered.is_err() && !disconnected {
                debug!("Frame delivery failed; cancelling run");
                disconnected = true;
                cancel.cancel();
            }
        }
    }
}

/// First user-authored text, truncated, or [`FALLBACK_TITLE`].
pub fn derive_title(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.role == Role::User)
        .flat_map(|m| m.parts.iter())
        .find_map(|part| match part {
            Part::Text { text } if !text.trim().is_empty() => Some(text.trim()),
            _ => None,
        })
        .map(|text| text.chars().take(TITLE_MAX_CHARS).collect())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string())
}
