//! searchbus backend - search engine abstraction
//!
//! This crate provides:
//! - `SearchBackend` trait covering index, get, search, scroll and template registration
//! - In-memory engine for tests and local runs
//! - Elasticsearch REST client (optional, feature-gated)

pub mod error;
pub mod memory;
pub mod store;
pub mod types;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;

pub use error::{BackendError, BackendResult};
pub use memory::InMemoryBackend;
pub use store::SearchBackend;
pub use types::{
    GetRequest, GetResponse, IndexRequest, IndexResponse, OpType, PutTemplateRequest,
    PutTemplateResponse, SearchHit, SearchHits, SearchRequest, SearchResponse, SearchType,
    VersionType,
};

#[cfg(feature = "elasticsearch")]
pub use elasticsearch::{ElasticsearchBackend, ElasticsearchConfig};

/// Prelude for common imports
pub mod prelude {
    pub use crate::error::{BackendError, BackendResult};
    pub use crate::store::SearchBackend;
    pub use crate::types::{GetRequest, IndexRequest, PutTemplateRequest, SearchRequest};
}
