//! A provider that replays scripted turns.
//!
//! Each call to `stream` consumes the next [`ScriptedTurn`]. Used by tests
//! across the workspace and for offline runs without an API key.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use deepsearch_core::error::ProviderError;
use deepsearch_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};
use tokio_util::sync::CancellationToken;

/// One scripted response to a `stream` call.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Emit these chunks in order, then close the stream.
    Chunks(Vec<StreamChunk>),
    /// Fail the `stream` call itself.
    Fail(ProviderError),
    /// Emit `chunks`, then fail mid-stream.
    Interrupt(Vec<StreamChunk>, ProviderError),
    /// Never produce anything; close only once cancelled.
    Hang,
}

impl ScriptedTurn {
    /// A plain text answer, split into word-sized deltas.
    pub fn text(text: &str) -> Self {
        let mut chunks: Vec<StreamChunk> = text
            .split_inclusive(' ')
            .map(StreamChunk::text)
            .collect();
        chunks.push(StreamChunk::done());
        Self::Chunks(chunks)
    }

    /// A single tool call with JSON-encoded arguments.
    pub fn tool_call(id: &str, name: &str, args: serde_json::Value) -> Self {
        Self::tool_calls(vec![(id, name, args)])
    }

    /// Several tool calls requested in the same step.
    pub fn tool_calls(calls: Vec<(&str, &str, serde_json::Value)>) -> Self {
        let mut chunks: Vec<StreamChunk> = calls
            .into_iter()
            .map(|(id, name, args)| StreamChunk::tool_call(id, name, args.to_string()))
            .collect();
        chunks.push(StreamChunk::done());
        Self::Chunks(chunks)
    }
}

pub struct ScriptedProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<ProviderRequest>>,
    chunk_delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
            chunk_delay: None,
        }
    }

    /// Pause between chunks, so streams can be observed mid-flight.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkReceiver, ProviderError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let turn = self
            .turns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| ProviderError::NotConfigured("script exhausted".into()))?;

        let (chunks, trailing_error) = match turn {
            ScriptedTurn::Fail(err) => return Err(err),
            ScriptedTurn::Chunks(chunks) => (chunks, None),
            ScriptedTurn::Interrupt(chunks, err) => (chunks, Some(err)),
            ScriptedTurn::Hang => {
                let (tx, rx) = tokio::sync::mpsc::channel(1);
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    drop(tx);
                });
                return Ok(rx);
            }
        };

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let delay = self.chunk_delay;
        tokio::spawn(async move {
            for chunk in chunks {
                if let Some(delay) = delay {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                if cancel.is_cancelled() || tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            if let Some(err) = trailing_error {
                let _ = tx.send(Err(err)).await;
            }
        });

        Ok(rx)
    }
}
