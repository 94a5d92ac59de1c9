//! The persistent-memory service contract (§6): an external
//! collaborator ("MAMA") reached through a narrow search/save
//! interface. Both operations are best-effort — failures are logged by
//! the caller and never abort the turn they were trying to enrich.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub similarity: f64,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub topic: String,
    pub decision: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    pub outcome: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(default)]
    pub id: Option<String>,
}

#[async_trait]
pub trait MemoryProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> crate::Result<Vec<SearchResult>>;
    async fn save(&self, request: SaveRequest) -> crate::Result<SaveResponse>;
}

/// Used wherever memory injection is optional and no provider was
/// configured; `search`/`save` both fail with `MamaUnavailable` so
/// callers take the same swallow-and-continue path as a real outage.
pub struct NullMemoryProvider;

#[async_trait]
impl MemoryProvider for NullMemoryProvider {
    async fn search(&self, _query: &str, _limit: usize) -> crate::Result<Vec<SearchResult>> {
        Err(crate::Error::MamaUnavailable("no memory provider configured".into()))
    }

    async fn save(&self, _request: SaveRequest) -> crate::Result<SaveResponse> {
        Err(crate::Error::MamaUnavailable("no memory provider configured".into()))
    }
}
