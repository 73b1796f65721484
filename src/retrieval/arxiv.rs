use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::atom::parse_feed;
use super::query::clean_search_query;
use super::PaperSource;
use crate::model::PaperRecord;
use crate::progress::{ProgressEvent, ProgressSink};

pub const DEFAULT_ARXIV_URL: &str = "https://export.arxiv.org/api/query";

/// arXiv export API client.
#[derive(Clone)]
pub struct ArxivClient {
    client: reqwest::Client,
    base_url: String,
    sink: Arc<dyn ProgressSink>,
}

impl ArxivClient {
    pub fn new(base_url: &str, timeout: Duration, sink: Arc<dyn ProgressSink>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("research-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build arXiv HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            sink,
        })
    }

    /// Newest-first search over titles and abstracts.
    pub async fn try_search(
        &self,
        query: &str,
        max_results: usize,
        start: usize,
    ) -> Result<Vec<PaperRecord>> {
        let cleaned = clean_search_query(query);
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&query_params(&cleaned, max_results, start))
            .header("Accept", "application/atom+xml")
            .send()
            .await
            .context("Failed to send request to arXiv")?
            .error_for_status()
            .context("arXiv returned an error status")?;

        let body = response
            .text()
            .await
            .context("Failed to read arXiv response")?;
        let papers = parse_feed(&body)?;

        tracing::debug!(query = %cleaned, start, returned = papers.len(), "arXiv search");
        Ok(papers)
    }
}

#[async_trait]
impl PaperSource for ArxivClient {
    async fn search(&self, query: &str, max_results: usize, start: usize) -> Vec<PaperRecord> {
        match self.try_search(query, max_results, start).await {
            Ok(papers) => papers,
            Err(e) => {
                self.sink.notify(&ProgressEvent::SearchFailed {
                    query: query.to_string(),
                    detail: format!("{:#}", e),
                });
                Vec::new()
            }
        }
    }
}

fn query_params(cleaned: &str, max_results: usize, start: usize) -> [(&'static str, String); 5] {
    [
        ("search_query", format!("ti:{} OR abs:{}", cleaned, cleaned)),
        ("start", start.to_string()),
        ("max_results", max_results.to_string()),
        ("sortBy", "submittedDate".to_string()),
        ("sortOrder", "descending".to_string()),
    ]
}
