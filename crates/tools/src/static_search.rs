//! In-process search provider with fixed results.

use async_trait::async_trait;
use deepsearch_core::error::SearchError;
use deepsearch_core::search::{SearchProvider, SearchResult};
use tokio_util::sync::CancellationToken;

/// Returns the same results for every query, or always fails.
pub struct StaticSearch {
    results: Vec<SearchResult>,
    failure: Option<String>,
}

impl StaticSearch {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            failure: None,
        }
    }

    /// A provider whose every search fails as unavailable.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            failure: Some(reason.into()),
        }
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(
        &self,
        _query: &str,
        num_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        if let Some(reason) = &self.failure {
            return Err(SearchError::Unavailable(reason.clone()));
        }
        Ok(self.results.iter().take(num_results).cloned().collect())
    }
}
