//! Tool implementations for DeepSearch.
//!
//! The agent gets exactly one capability, web search, backed by a
//! pluggable [`SearchProvider`](deepsearch_core::search::SearchProvider).

pub mod serper;
pub mod static_search;
pub mod web_search;

use std::sync::Arc;

use deepsearch_core::search::SearchProvider;
use deepsearch_core::tool::ToolRegistry;

pub use serper::SerperSearch;
pub use static_search::StaticSearch;
pub use web_search::{SEARCH_TOOL_NAME, WebSearchTool};

/// Create the registry the agent runs with: the web search tool only.
pub fn default_registry(search: Arc<dyn SearchProvider>, result_count: usize) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WebSearchTool::new(search, result_count)));
    registry
}
