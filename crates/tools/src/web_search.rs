//! Web search tool: lets the model query the live web mid-generation.
//!
//! The actual lookup is delegated to a [`SearchProvider`]; the tool only
//! validates the query, fixes the result count, and shapes the output.

use std::sync::Arc;

use async_trait::async_trait;
use deepsearch_core::error::{SearchError, ToolError};
use deepsearch_core::search::SearchProvider;
use deepsearch_core::tool::{Tool, ToolResult};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Name the model uses to call this tool.
pub const SEARCH_TOOL_NAME: &str = "search_web";

pub struct WebSearchTool {
    provider: Arc<dyn SearchProvider>,
    result_count: usize,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>, result_count: usize) -> Self {
        Self {
            provider,
            result_count: result_count.max(1),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the web. Returns a list of results, each with a title, a link, and a snippet."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The query to search the web for"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| SearchError::InvalidQuery("query must be a non-empty string".into()))?;

        debug!(provider = self.provider.name(), query, "Running web search");

        let results = self
            .provider
            .search(query, self.result_count, cancel)
            .await?;

        let data = serde_json::to_value(&results)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: SEARCH_TOOL_NAME.into(),
                reason: e.to_string(),
            })?;

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: serde_json::to_string_pretty(&data).unwrap_or_default(),
            data: Some(data),
        })
    }
}
