//! The agent loop: generate, call tools, feed results back, repeat.
//!
//! One run produces at most one assistant message. Its parts accumulate in
//! order: text deltas, then a `tool-invocation` part per requested call,
//! which flips from `call` to `result` once the tool has run.

use std::sync::Arc;

use chrono::Utc;
use deepsearch_core::error::ToolError;
use deepsearch_core::message::{Message, Part, ToolInvocation};
use deepsearch_core::provider::{Provider, ProviderRequest, StreamToolCall, ToolDefinition};
use deepsearch_core::tool::{ToolCall, ToolRegistry, error_payload};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use crate::stream_event::{FinishReason, LoopEvent, LoopFailure};

/// Default maximum number of generation calls per run.
pub const DEFAULT_STEP_LIMIT: u32 = 10;

/// Used when no system prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful research assistant with access to a \
web search tool. Search the web whenever a question depends on current or factual information, \
and search again if the first results are not enough. Always cite your sources as markdown links \
in the form [title](url).";

/// The consumer hung up; the run stops without a terminal event.
struct ReceiverGone;

/// Drives one conversation turn against a provider and a tool registry.
#[derive(Clone)]
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    step_limit: u32,
    system_prompt: Option<String>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, model: impl Into<String>) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            step_limit: DEFAULT_STEP_LIMIT,
            system_prompt: None,
        }
    }

    /// Set the maximum number of generation calls per run (at least 1).
    pub fn with_step_limit(mut self, limit: u32) -> Self {
        self.step_limit = limit.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Prepend a system message to every generation request.
    ///
    /// The current date is appended. The prompt is never part of the
    /// produced messages.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn step_limit(&self) -> u32 {
        self.step_limit
    }

    /// Start a run over `messages`.
    ///
    /// Events arrive on the returned receiver; the last one is always
    /// [`LoopEvent::Finished`] or [`LoopEvent::Failed`] unless the receiver
    /// is dropped first, which cancels the run. The background task exits
    /// only after any in-flight generation or tool call has been abandoned.
    pub fn run(&self, messages: Vec<Message>, cancel: CancellationToken) -> mpsc::Receiver<LoopEvent> {
        let (tx, rx) = mpsc::channel::<LoopEvent>(128);
        let this = self.clone();
        let span = tracing::Span::current();

        tokio::spawn(
            async move {
                if this.drive(messages, &tx, &cancel).await.is_err() {
                    debug!("Loop consumer went away, cancelling run");
                    cancel.cancel();
                }
            }
            .instrument(span),
        );

        rx
    }

    async fn drive(
        &self,
        history: Vec<Message>,
        tx: &mpsc::Sender<LoopEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), ReceiverGone> {
        let definitions = self.tools.definitions();
        let mut parts: Vec<Part> = Vec::new();
        let mut step: u32 = 0;

        info!(
            messages = history.len(),
            step_limit = self.step_limit,
            "Starting agent run"
        );

        let outcome = loop {
            if cancel.is_cancelled() {
                break Err(LoopFailure::Cancelled);
            }

            let request = self.build_request(&history, &parts, &definitions);
            debug!(step, "Requesting generation");

            let calls = match self.generate(request, step, &mut parts, tx, cancel).await? {
                Ok(calls) => calls,
                Err(failure) => break Err(failure),
            };

            if calls.is_empty() {
                emit(tx, LoopEvent::StepCompleted { step }).await?;
                break Ok((step + 1, FinishReason::Stop));
            }

            if let Some(unknown) = calls.iter().find(|c| self.tools.get(&c.name).is_none()) {
                warn!(step, tool = %unknown.name, "Model requested unknown tool");
                break Err(LoopFailure::UnknownTool(unknown.name.clone()));
            }

            if let Err(failure) = self.run_tools(calls, step, &mut parts, tx, cancel).await? {
                break Err(failure);
            }

            emit(tx, LoopEvent::StepCompleted { step }).await?;
            step += 1;

            if step >= self.step_limit {
                warn!(steps = step, "Step limit reached, returning partial transcript");
                break Ok((step, FinishReason::StepLimit));
            }
        };

        let produced = if parts.is_empty() {
            Vec::new()
        } else {
            vec![Message::assistant(parts)]
        };

        let event = match outcome {
            Ok((steps, reason)) => {
                info!(steps, ?reason, "Agent run finished");
                LoopEvent::Finished {
                    messages: produced,
                    steps,
                    reason,
                }
            }
            Err(reason) => {
                warn!(error = %reason, "Agent run failed");
                LoopEvent::Failed {
                    reason,
                    messages: produced,
                }
            }
        };
        emit(tx, event).await
    }

    fn build_request(
        &self,
        history: &[Message],
        parts: &[Part],
        definitions: &[ToolDefinition],
    ) -> ProviderRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(format!(
                "{prompt}\n\nThe current date is {}.",
                Utc::now().format("%Y-%m-%d")
            )));
        }
        messages.extend_from_slice(history);
        if !parts.is_empty() {
            messages.push(Message::assistant(parts.to_vec()));
        }

        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: definitions.to_vec(),
        }
    }

    /// Stream one generation, forwarding text as it arrives.
    ///
    /// Returns the tool calls the model asked for (empty for a final answer).
    async fn generate(
        &self,
        request: ProviderRequest,
        step: u32,
        parts: &mut Vec<Part>,
        tx: &mpsc::Sender<LoopEvent>,
        cancel: &CancellationToken,
    ) -> Result<Result<Vec<StreamToolCall>, LoopFailure>, ReceiverGone> {
        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Err(LoopFailure::Cancelled)),
            res = self.provider.stream(request, cancel.child_token()) => res,
        };
        let mut stream = match started {
            Ok(rx) => rx,
            Err(e) => return Ok(Err(e.into())),
        };

        let mut calls: Vec<StreamToolCall> = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Err(LoopFailure::Cancelled)),
                next = stream.recv() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return Ok(Err(e.into())),
                None => break,
            };

            if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                match parts.last_mut() {
                    Some(Part::Text { text: last }) => last.push_str(&text),
                    _ => parts.push(Part::text(text.clone())),
                }
                emit(tx, LoopEvent::TextDelta { delta: text }).await?;
            }

            for delta in chunk.tool_calls {
                merge_tool_call(&mut calls, delta);
            }

            if chunk.done {
                break;
            }
        }

        debug!(step, tool_calls = calls.len(), "Generation complete");
        Ok(Ok(calls))
    }

    /// Execute the step's tool calls in order, recording each as a part.
    async fn run_tools(
        &self,
        calls: Vec<StreamToolCall>,
        step: u32,
        parts: &mut Vec<Part>,
        tx: &mpsc::Sender<LoopEvent>,
        cancel: &CancellationToken,
    ) -> Result<Result<(), LoopFailure>, ReceiverGone> {
        for call in calls {
            let parsed = parse_arguments(&call.arguments);
            let args = parsed.clone().unwrap_or_else(|_| {
                serde_json::Value::String(call.arguments.clone())
            });

            let invocation = ToolInvocation::call(&call.id, &call.name, args.clone(), step);
            parts.push(Part::ToolInvocation(invocation.clone()));
            emit(tx, LoopEvent::ToolCallRequested { step, invocation }).await?;

            let payload = match parsed {
                Err(e) => {
                    debug!(tool = %call.name, error = %e, "Tool arguments are not valid JSON");
                    error_payload(&e)
                }
                Ok(arguments) => {
                    let tool_call = ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments,
                    };
                    let started = std::time::Instant::now();
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(Err(LoopFailure::Cancelled)),
                        res = self.tools.execute(&tool_call, cancel) => res,
                    };
                    // The tool may have observed cancellation before we did.
                    if cancel.is_cancelled() {
                        return Ok(Err(LoopFailure::Cancelled));
                    }
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    match result {
                        Ok(result) => {
                            debug!(tool = %call.name, elapsed_ms, "Tool succeeded");
                            result.payload()
                        }
                        Err(e) => {
                            warn!(tool = %call.name, elapsed_ms, error = %e, "Tool failed");
                            error_payload(&e)
                        }
                    }
                }
            };

            let Some(Part::ToolInvocation(recorded)) = parts.iter_mut().rev().find(|p| {
                matches!(p, Part::ToolInvocation(inv) if inv.tool_call_id == call.id)
            }) else {
                continue;
            };
            recorded.complete(payload);
            let invocation = recorded.clone();
            emit(tx, LoopEvent::ToolCallResult { step, invocation }).await?;
        }

        Ok(Ok(()))
    }
}

async fn emit(tx: &mpsc::Sender<LoopEvent>, event: LoopEvent) -> Result<(), ReceiverGone> {
    tx.send(event).await.map_err(|_| ReceiverGone)
}

/// Merge a streamed tool-call fragment into the calls seen so far.
///
/// Fragments with the same id are concatenated. A fragment with neither id
/// nor name continues the most recent call; a named one without an id is a
/// new call and gets a positional id.
fn merge_tool_call(calls: &mut Vec<StreamToolCall>, mut delta: StreamToolCall) {
    let existing = match (delta.id.is_empty(), delta.name.is_empty()) {
        (false, _) => calls.iter_mut().find(|c| c.id == delta.id),
        (true, true) => calls.last_mut(),
        (true, false) => None,
    };
    match existing {
        Some(call) => {
            if !delta.name.is_empty() {
                call.name = delta.name;
            }
            call.arguments.push_str(&delta.arguments);
        }
        None => {
            if delta.id.is_empty() {
                delta.id = format!("call_{}", calls.len());
            }
            calls.push(delta);
        }
    }
}

fn parse_arguments(raw: &str) -> Result<serde_json::Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw)
        .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepsearch_core::error::{ProviderError, SearchError};
    use deepsearch_core::message::{InvocationState, Role};
    use deepsearch_core::provider::StreamChunk;
    use deepsearch_core::search::{SearchProvider, SearchResult};
    use deepsearch_providers::{ScriptedProvider, ScriptedTurn};
    use deepsearch_tools::{StaticSearch, default_registry};
    use serde_json::json;
    use std::time::Duration;

    fn results() -> Vec<SearchResult> {
        vec![SearchResult {
            title: "Paris forecast".into(),
            link: "https://weather.example/paris".into(),
            snippet: "Sunny, 22°C".into(),
        }]
    }

    fn registry() -> Arc<ToolRegistry> {
        Arc::new(default_registry(Arc::new(StaticSearch::new(results())), 10))
    }

    fn agent(turns: Vec<ScriptedTurn>) -> (AgentLoop, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(turns));
        (AgentLoop::new(provider.clone(), registry(), "test-model"), provider)
    }

    async fn collect(mut rx: mpsc::Receiver<LoopEvent>) -> Vec<LoopEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn question() -> Vec<Message> {
        vec![Message::user("What's the weather in Paris?")]
    }

    #[tokio::test]
    async fn text_only_answer_finishes_in_one_step() {
        let (agent, provider) = agent(vec![ScriptedTurn::text("Hello there")]);
        let events = collect(agent.run(question(), CancellationToken::new())).await;

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                LoopEvent::TextDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello there");

        match events.last().unwrap() {
            LoopEvent::Finished { messages, steps, reason } => {
                assert_eq!(*steps, 1);
                assert_eq!(*reason, FinishReason::Stop);
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].role, Role::Assistant);
                assert_eq!(messages[0].text(), "Hello there");
            }
            other => panic!("expected Finished, got {other:?}"),
        }
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_call_then_answer() {
        let (agent, provider) = agent(vec![
            ScriptedTurn::tool_call("call_1", "search_web", json!({"query": "weather Paris"})),
            ScriptedTurn::text("It is sunny in Paris."),
        ]);
        let events = collect(agent.run(question(), CancellationToken::new())).await;

        let kinds: Vec<&str> = events
            .iter()
            .map(LoopEvent::event_type)
            .filter(|k| *k != "text_delta")
            .collect();
        assert_eq!(
            kinds,
            [
                "tool_call_requested",
                "tool_call_result",
                "step_completed",
                "step_completed",
                "finished"
            ]
        );

        let LoopEvent::Finished { messages, steps, .. } = events.last().unwrap() else {
            panic!("expected Finished");
        };
        assert_eq!(*steps, 2);
        let invocation = messages[0].tool_invocations().next().unwrap();
        assert_eq!(invocation.state, InvocationState::Result);
        assert_eq!(invocation.step, Some(0));
        assert_eq!(invocation.result.as_ref().unwrap()[0]["title"], "Paris forecast");
        assert_eq!(messages[0].text(), "It is sunny in Paris.");

        // The second generation saw the tool result.
        let second = &provider.requests()[1];
        let last = second.messages.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.tool_invocations().count(), 1);
        assert_eq!(second.tools[0].name, "search_web");
    }

    #[tokio::test]
    async fn unknown_tool_fails_the_run() {
        let (agent, _) = agent(vec![ScriptedTurn::tool_call("c1", "send_email", json!({}))]);
        let events = collect(agent.run(question(), CancellationToken::new())).await;

        assert!(!events.iter().any(|e| matches!(e, LoopEvent::ToolCallRequested { .. })));
        match events.last().unwrap() {
            LoopEvent::Failed { reason: LoopFailure::UnknownTool(name), .. } => {
                assert_eq!(name, "send_email")
            }
            other => panic!("expected UnknownTool failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_arguments_become_error_result_and_loop_continues() {
        let (agent, provider) = agent(vec![
            ScriptedTurn::tool_call("c1", "search_web", json!({"q": "wrong field"})),
            ScriptedTurn::tool_call("c2", "search_web", json!({"query": "weather Paris"})),
            ScriptedTurn::text("Sunny."),
        ]);
        let events = collect(agent.run(question(), CancellationToken::new())).await;

        let results: Vec<&ToolInvocation> = events
            .iter()
            .filter_map(|e| match e {
                LoopEvent::ToolCallResult { invocation, .. } => Some(invocation),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].result.as_ref().unwrap()["error"].is_string());
        assert!(results[1].result.as_ref().unwrap().is_array());
        assert!(matches!(events.last().unwrap(), LoopEvent::Finished { .. }));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn malformed_json_arguments_are_reported_to_the_model() {
        let (agent, _) = agent(vec![
            ScriptedTurn::Chunks(vec![
                deepsearch_core::provider::StreamChunk::tool_call("c1", "search_web", "{\"query\": "),
                deepsearch_core::provider::StreamChunk::done(),
            ]),
            ScriptedTurn::text("Sorry."),
        ]);
        let events = collect(agent.run(question(), CancellationToken::new())).await;
        let error = events.iter().find_map(|e| match e {
            LoopEvent::ToolCallResult { invocation, .. } => invocation.result.clone(),
            _ => None,
        });
        assert!(error.unwrap()["error"].as_str().unwrap().contains("JSON"));
    }

    #[tokio::test]
    async fn step_limit_returns_partial_transcript() {
        let turns = (0..5)
            .map(|i| ScriptedTurn::tool_call(&format!("c{i}"), "search_web", json!({"query": "more"})))
            .collect();
        let (agent, provider) = agent(turns);
        let agent = agent.with_step_limit(3);

        let events = collect(agent.run(question(), CancellationToken::new())).await;

        assert_eq!(provider.call_count(), 3);
        match events.last().unwrap() {
            LoopEvent::Finished { messages, steps, reason } => {
                assert_eq!(*steps, 3);
                assert_eq!(*reason, FinishReason::StepLimit);
                assert_eq!(messages[0].tool_invocations().count(), 3);
            }
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_error_is_a_failure() {
        let (agent, _) = agent(vec![ScriptedTurn::Fail(ProviderError::ApiError {
            status_code: 500,
            message: "boom".into(),
        })]);
        let events = collect(agent.run(question(), CancellationToken::new())).await;
        assert!(matches!(
            events.last().unwrap(),
            LoopEvent::Failed { reason: LoopFailure::Generation(_), .. }
        ));
    }

    #[tokio::test]
    async fn mid_stream_error_keeps_partial_text() {
        let (agent, _) = agent(vec![ScriptedTurn::Interrupt(
            vec![deepsearch_core::provider::StreamChunk::text("Partial")],
            ProviderError::StreamInterrupted("reset".into()),
        )]);
        let events = collect(agent.run(question(), CancellationToken::new())).await;
        match events.last().unwrap() {
            LoopEvent::Failed { messages, .. } => assert_eq!(messages[0].text(), "Partial"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn system_prompt_is_sent_but_not_produced() {
        let (agent, provider) = agent(vec![ScriptedTurn::text("ok")]);
        let agent = agent.with_system_prompt(DEFAULT_SYSTEM_PROMPT);
        let events = collect(agent.run(question(), CancellationToken::new())).await;

        let first = &provider.requests()[0];
        assert_eq!(first.messages[0].role, Role::System);
        assert!(first.messages[0].text().contains("current date"));
        let LoopEvent::Finished { messages, .. } = events.last().unwrap() else {
            panic!("expected Finished");
        };
        assert!(messages.iter().all(|m| m.role != Role::System));
    }

    /// Search provider that never answers until cancelled.
    struct StalledSearch;

    #[async_trait::async_trait]
    impl SearchProvider for StalledSearch {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn search(
            &self,
            _query: &str,
            _num_results: usize,
            cancel: &CancellationToken,
        ) -> Result<Vec<SearchResult>, SearchError> {
            cancel.cancelled().await;
            Err(SearchError::Cancelled)
        }
    }

    #[tokio::test]
    async fn cancellation_during_tool_call_leaves_no_result() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::tool_call(
            "c1",
            "search_web",
            json!({"query": "weather Paris"}),
        )]));
        let tools = Arc::new(default_registry(Arc::new(StalledSearch), 10));
        let agent = AgentLoop::new(provider, tools, "m");

        let cancel = CancellationToken::new();
        let mut rx = agent.run(question(), cancel.clone());

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            if matches!(event, LoopEvent::ToolCallRequested { .. }) {
                cancel.cancel();
            }
            events.push(event);
        }

        assert!(!events.iter().any(|e| matches!(e, LoopEvent::ToolCallResult { .. })));
        assert!(matches!(
            events.last().unwrap(),
            LoopEvent::Failed { reason: LoopFailure::Cancelled, .. }
        ));
    }

    #[tokio::test]
    async fn cancellation_during_generation() {
        let (agent, _) = agent(vec![ScriptedTurn::Hang]);
        let cancel = CancellationToken::new();
        let rx = agent.run(question(), cancel.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let events = collect(rx).await;
        assert!(matches!(
            events.last().unwrap(),
            LoopEvent::Failed { reason: LoopFailure::Cancelled, .. }
        ));
    }

    #[tokio::test]
    async fn dropping_receiver_cancels_run() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![ScriptedTurn::text("one two three four five six")])
                .with_chunk_delay(Duration::from_millis(10)),
        );
        let agent = AgentLoop::new(provider, registry(), "m");
        let cancel = CancellationToken::new();
        let mut rx = agent.run(question(), cancel.clone());

        assert!(matches!(rx.recv().await, Some(LoopEvent::TextDelta { .. })));
        drop(rx);

        tokio::time::timeout(Duration::from_secs(2), cancel.cancelled())
            .await
            .expect("run should cancel once its consumer is gone");
    }

    #[test]
    fn fragments_merge_by_id() {
        let mut calls = Vec::new();
        merge_tool_call(&mut calls, StreamToolCall {
            id: "c1".into(),
            name: "search_web".into(),
            arguments: "{\"query\":".into(),
        });
        merge_tool_call(&mut calls, StreamToolCall {
            id: String::new(),
            name: String::new(),
            arguments: "\"x\"}".into(),
        });
        merge_tool_call(&mut calls, StreamToolCall {
            id: "c2".into(),
            name: "search_web".into(),
            arguments: "{}".into(),
        });
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments, "{\"query\":\"x\"}");
    }

    #[test]
    fn named_calls_without_ids_stay_separate() {
        let mut calls = Vec::new();
        for query in ["a", "b"] {
            merge_tool_call(&mut calls, StreamToolCall {
                id: String::new(),
                name: "search_web".into(),
                arguments: json!({"query": query}).to_string(),
            });
        }
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[1].id, "call_1");
        assert_eq!(calls[1].arguments, r#"{"query":"b"}"#);
    }

    #[tokio::test]
    async fn complete_calls_without_ids_run_individually() {
        let calls = StreamChunk {
            tool_calls: ["paris", "rome"]
                .iter()
                .map(|city| StreamToolCall {
                    id: String::new(),
                    name: "search_web".into(),
                    arguments: json!({"query": city}).to_string(),
                })
                .collect(),
            done: true,
            ..Default::default()
        };
        let (agent, _) = agent(vec![
            ScriptedTurn::Chunks(vec![calls]),
            ScriptedTurn::text("Both sunny."),
        ]);
        let events = collect(agent.run(question(), CancellationToken::new())).await;

        let results: Vec<&ToolInvocation> = events
            .iter()
            .filter_map(|e| match e {
                LoopEvent::ToolCallResult { invocation, .. } => Some(invocation),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 2);
        assert_ne!(results[0].tool_call_id, results[1].tool_call_id);
        assert_eq!(results[0].args, json!({"query": "paris"}));
        assert_eq!(results[1].args, json!({"query": "rome"}));
    }

    #[test]
    fn empty_arguments_parse_as_empty_object() {
        assert_eq!(parse_arguments("  ").unwrap(), json!({}));
        assert!(parse_arguments("{nope").is_err());
    }
}
