//! Search capability consumed by the search tool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::SearchError;

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

/// A search provider (Serper, Brave, a fixture, ...).
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Return at most `num_results` hits, best first.
    ///
    /// When `cancel` fires the outbound request is dropped and
    /// [`SearchError::Cancelled`] is returned.
    async fn search(
        &self,
        query: &str,
        num_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, SearchError>;
}
