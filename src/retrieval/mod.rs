pub mod arxiv;
pub mod atom;
pub mod query;

use async_trait::async_trait;

use crate::model::PaperRecord;

pub use arxiv::ArxivClient;

/// Keyword search over a paper index.
///
/// Never fails: transport or parse problems are reported through the
/// implementation's own channel and surface here as an empty result.
#[async_trait]
pub trait PaperSource: Send + Sync {
    async fn search(&self, query: &str, max_results: usize, start: usize) -> Vec<PaperRecord>;
}

/// Source used when searching is disabled; every analysis then falls back to
/// general knowledge.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineSource;

#[async_trait]
impl PaperSource for OfflineSource {
    async fn search(&self, query: &str, _max_results: usize, _start: usize) -> Vec<PaperRecord> {
        tracing::debug!(%query, "search disabled, returning no papers");
        Vec::new()
    }
}
