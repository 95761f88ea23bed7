//! Serper (Google Search API) provider.

use async_trait::async_trait;
use deepsearch_config::SearchConfig;
use deepsearch_core::error::SearchError;
use deepsearch_core::search::{SearchProvider, SearchResult};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct SerperSearch {
    base_url: String,
    api_key: String,
    max_results: usize,
    client: reqwest::Client,
}

impl SerperSearch {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_results: 10,
            client,
        }
    }

    /// Build from the `[search]` config section.
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| SearchError::Unavailable("no Serper API key configured".into()))?;
        let mut search = Self::new(&config.base_url, api_key);
        search.max_results = config.max_results;
        Ok(search)
    }
}

#[async_trait]
impl SearchProvider for SerperSearch {
    fn name(&self) -> &str {
        "serper"
    }

    async fn search(
        &self,
        query: &str,
        num_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let num = num_results.clamp(1, self.max_results);
        let url = format!("{}/search", self.base_url);
        debug!(query, num, "Querying Serper");

        let request = async {
            let response = self
                .client
                .post(&url)
                .header("X-API-KEY", &self.api_key)
                .json(&serde_json::json!({ "q": query, "num": num }))
                .send()
                .await
                .map_err(|e| SearchError::Unavailable(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), body = %body, "Serper returned error");
                return Err(SearchError::Unavailable(format!(
                    "search backend returned {status}"
                )));
            }

            response
                .json::<SerperResponse>()
                .await
                .map_err(|e| SearchError::Unavailable(format!("malformed search response: {e}")))
        };

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(SearchError::Cancelled),
            body = request => body?,
        };

        Ok(body
            .organic
            .into_iter()
            .take(num)
            .map(|hit| SearchResult {
                title: hit.title,
                link: hit.link,
                snippet: hit.snippet,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}
