//! Request and response types exchanged with a search backend

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{BackendError, BackendResult};

/// Versioning semantics applied to an index request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionType {
    Internal,
    External,
    ExternalGte,
    Force,
}

impl VersionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionType::Internal => "internal",
            VersionType::External => "external",
            VersionType::ExternalGte => "external_gte",
            VersionType::Force => "force",
        }
    }
}

impl std::str::FromStr for VersionType {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(VersionType::Internal),
            "external" | "external_gt" => Ok(VersionType::External),
            "external_gte" => Ok(VersionType::ExternalGte),
            "force" => Ok(VersionType::Force),
            other => Err(BackendError::invalid(format!("No version type match [{other}]"))),
        }
    }
}

/// Whether an index request may overwrite an existing document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    Index,
    Create,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Index => "index",
            OpType::Create => "create",
        }
    }
}

impl std::str::FromStr for OpType {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "index" => Ok(OpType::Index),
            "create" => Ok(OpType::Create),
            other => Err(BackendError::invalid(format!(
                "opType [{other}] not allowed, either [index] or [create] are allowed"
            ))),
        }
    }
}

/// Search execution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    QueryThenFetch,
    DfsQueryThenFetch,
    QueryAndFetch,
    DfsQueryAndFetch,
    Count,
    Scan,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::QueryThenFetch => "query_then_fetch",
            SearchType::DfsQueryThenFetch => "dfs_query_then_fetch",
            SearchType::QueryAndFetch => "query_and_fetch",
            SearchType::DfsQueryAndFetch => "dfs_query_and_fetch",
            SearchType::Count => "count",
            SearchType::Scan => "scan",
        }
    }
}

impl std::str::FromStr for SearchType {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query_then_fetch" => Ok(SearchType::QueryThenFetch),
            "dfs_query_then_fetch" => Ok(SearchType::DfsQueryThenFetch),
            "query_and_fetch" => Ok(SearchType::QueryAndFetch),
            "dfs_query_and_fetch" => Ok(SearchType::DfsQueryAndFetch),
            "count" => Ok(SearchType::Count),
            "scan" => Ok(SearchType::Scan),
            other => Err(BackendError::invalid(format!(
                "No search type for [{other}]"
            ))),
        }
    }
}

/// Parse a keep-alive such as `500ms`, `30s`, `1m`, `2h` or `1d`.
///
/// A bare number is read as milliseconds.
pub fn parse_keep_alive(value: &str) -> BackendResult<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits
        .parse()
        .map_err(|_| BackendError::invalid(format!("failed to parse keep alive [{value}]")))?;

    let millis = match unit {
        "" | "ms" => amount,
        "s" => amount.saturating_mul(1_000),
        "m" => amount.saturating_mul(60_000),
        "h" => amount.saturating_mul(3_600_000),
        "d" => amount.saturating_mul(86_400_000),
        _ => {
            return Err(BackendError::invalid(format!(
                "failed to parse keep alive [{value}], unknown unit [{unit}]"
            )))
        }
    };
    Ok(Duration::from_millis(millis))
}

/// Store a document
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRequest {
    pub index: String,
    pub doc_type: String,
    /// Generated by the engine when absent
    pub id: Option<String>,
    pub source: Map<String, Value>,
    pub version: Option<i64>,
    pub version_type: Option<VersionType>,
    pub op_type: Option<OpType>,
    pub refresh: Option<bool>,
}

impl IndexRequest {
    pub fn new(
        index: impl Into<String>,
        doc_type: impl Into<String>,
        source: Map<String, Value>,
    ) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            id: None,
            source,
            version: None,
            version_type: None,
            op_type: None,
            refresh: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_version(mut self, version: i64, version_type: Option<VersionType>) -> Self {
        self.version = Some(version);
        self.version_type = version_type;
        self
    }

    pub fn with_op_type(mut self, op_type: OpType) -> Self {
        self.op_type = Some(op_type);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResponse {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type")]
    pub doc_type: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_version")]
    pub version: i64,
    pub created: bool,
}

/// Fetch one document by id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub index: String,
    pub doc_type: String,
    pub id: String,
}

impl GetRequest {
    pub fn new(
        index: impl Into<String>,
        doc_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetResponse {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type", default)]
    pub doc_type: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    pub found: bool,
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
}

/// Run a query against one or more indices
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchRequest {
    pub indices: Vec<String>,
    /// Empty means every type
    pub types: Vec<String>,
    pub search_type: Option<SearchType>,
    /// Keep-alive for a scroll cursor; opens one when present
    pub scroll: Option<String>,
    /// Raw query body (`query`, `from`, `size`, `filter`, `facets`, ...)
    pub source: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "_scroll_id", default, skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    pub hits: SearchHits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHits {
    #[serde(deserialize_with = "total_hits")]
    pub total: u64,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

impl SearchHits {
    pub fn empty() -> Self {
        Self {
            total: 0,
            max_score: None,
            hits: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type", default)]
    pub doc_type: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

/// Newer engines report `hits.total` as `{"value": n, "relation": "eq"}`.
fn total_hits<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Total {
        Count(u64),
        Object { value: u64 },
    }

    Ok(match Total::deserialize(deserializer)? {
        Total::Count(count) | Total::Object { value: count } => count,
    })
}

/// Register an index template
#[derive(Debug, Clone, PartialEq)]
pub struct PutTemplateRequest {
    pub name: String,
    pub source: Map<String, Value>,
    /// Fail instead of overwriting an existing template
    pub create: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutTemplateResponse {
    pub acknowledged: bool,
}
