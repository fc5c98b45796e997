//! Search backend trait

use async_trait::async_trait;

use crate::error::BackendResult;
use crate::types::{
    GetRequest, GetResponse, IndexRequest, IndexResponse, PutTemplateRequest, PutTemplateResponse,
    SearchRequest, SearchResponse,
};

/// Search engine operations used by the gateway.
///
/// Implementations are shared across every request handler, so calls must not
/// rely on per-caller state.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Store a document
    async fn index(&self, request: IndexRequest) -> BackendResult<IndexResponse>;

    /// Fetch a document by id; an absent document is `found: false`, not an error
    async fn get(&self, request: GetRequest) -> BackendResult<GetResponse>;

    /// Run a query
    async fn search(&self, request: SearchRequest) -> BackendResult<SearchResponse>;

    /// Fetch the next page of an open scroll cursor
    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> BackendResult<SearchResponse>;

    /// Register an index template
    async fn put_template(&self, request: PutTemplateRequest) -> BackendResult<PutTemplateResponse>;
}
