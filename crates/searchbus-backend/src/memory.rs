//! In-memory search engine for tests and local runs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::{BackendError, BackendResult};
use crate::store::SearchBackend;
use crate::types::{
    parse_keep_alive, GetRequest, GetResponse, IndexRequest, IndexResponse, OpType,
    PutTemplateRequest, PutTemplateResponse, SearchHit, SearchHits, SearchRequest,
    SearchResponse, SearchType, VersionType,
};

const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone)]
struct StoredDocument {
    version: i64,
    source: Map<String, Value>,
}

/// type -> id -> document
type IndexData = BTreeMap<String, BTreeMap<String, StoredDocument>>;

#[derive(Debug)]
struct ScrollContext {
    hits: Vec<SearchHit>,
    offset: usize,
    page_size: usize,
    total: u64,
    max_score: Option<f64>,
    expires_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
enum Query {
    MatchAll,
    Term { field: String, value: Value },
    Match { field: String, text: String },
}

impl Query {
    fn matches(&self, source: &Map<String, Value>) -> bool {
        match self {
            Query::MatchAll => true,
            Query::Term { field, value } => lookup(source, field).is_some_and(|found| match found {
                Value::Array(items) => items.contains(value),
                other => other == value,
            }),
            Query::Match { field, text } => {
                let terms: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
                lookup(source, field).is_some_and(|found| {
                    let haystack = match found {
                        Value::String(s) => s.to_lowercase(),
                        other => other.to_string().to_lowercase(),
                    };
                    terms.iter().any(|term| haystack.contains(term.as_str()))
                })
            }
        }
    }
}

/// In-memory engine.
///
/// Indices are created on first write. Every write is visible immediately, so
/// the `refresh` flag has no effect. Clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    indices: Arc<RwLock<HashMap<String, IndexData>>>,
    templates: Arc<RwLock<BTreeMap<String, Map<String, Value>>>>,
    scrolls: Arc<Mutex<HashMap<String, ScrollContext>>>,
}

impl InMemoryBackend {
    /// Create an empty engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index
    pub async fn create_index(&self, name: impl Into<String>) {
        self.indices.write().await.entry(name.into()).or_default();
    }

    /// Registered template body by name
    pub async fn template(&self, name: &str) -> Option<Map<String, Value>> {
        self.templates.read().await.get(name).cloned()
    }

    /// Names of every registered template, sorted
    pub async fn template_names(&self) -> Vec<String> {
        self.templates.read().await.keys().cloned().collect()
    }

    /// Number of documents stored in an index, across all types
    pub async fn document_count(&self, index: &str) -> usize {
        self.indices
            .read()
            .await
            .get(index)
            .map_or(0, |data| data.values().map(BTreeMap::len).sum())
    }
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn index(&self, request: IndexRequest) -> BackendResult<IndexResponse> {
        let IndexRequest {
            index,
            doc_type,
            id,
            source,
            version,
            version_type,
            op_type,
            refresh: _,
        } = request;

        let mut indices = self.indices.write().await;
        let docs = indices
            .entry(index.clone())
            .or_default()
            .entry(doc_type.clone())
            .or_default();

        let id = id.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let current = docs.get(&id).map(|doc| doc.version);

        if op_type == Some(OpType::Create) && current.is_some() {
            return Err(BackendError::DocumentAlreadyExists { doc_type, id });
        }

        let next = next_version(
            &doc_type,
            &id,
            current,
            version,
            version_type.unwrap_or(VersionType::Internal),
        )?;
        docs.insert(
            id.clone(),
            StoredDocument {
                version: next,
                source,
            },
        );
        debug!(index = %index, doc_type = %doc_type, id = %id, version = next, "Document indexed");

        Ok(IndexResponse {
            index,
            doc_type,
            id,
            version: next,
            created: current.is_none(),
        })
    }

    async fn get(&self, request: GetRequest) -> BackendResult<GetResponse> {
        let indices = self.indices.read().await;
        let data = indices
            .get(&request.index)
            .ok_or_else(|| BackendError::IndexMissing(request.index.clone()))?;
        let doc = data
            .get(&request.doc_type)
            .and_then(|docs| docs.get(&request.id));

        Ok(GetResponse {
            version: doc.map(|doc| doc.version),
            found: doc.is_some(),
            source: doc.map(|doc| Value::Object(doc.source.clone())),
            index: request.index,
            doc_type: request.doc_type,
            id: request.id,
        })
    }

    async fn search(&self, request: SearchRequest) -> BackendResult<SearchResponse> {
        let started = Instant::now();
        let source = request.source.as_ref();
        let query = parse_query(source)?;
        let from = page_param(source, "from", 0)?;
        let size = page_param(source, "size", DEFAULT_PAGE_SIZE)?;
        let keep_alive = request
            .scroll
            .as_deref()
            .map(parse_keep_alive)
            .transpose()?;
        let search_type = request.search_type.unwrap_or(SearchType::QueryThenFetch);

        if search_type == SearchType::Scan && keep_alive.is_none() {
            return Err(BackendError::invalid(
                "Scroll must be provided when scanning",
            ));
        }

        let matched = {
            let indices = self.indices.read().await;
            let all = request.indices.is_empty() || request.indices.iter().any(|i| i == "_all");
            let mut targets: Vec<&String> = if all {
                indices.keys().collect()
            } else {
                request.indices.iter().collect()
            };
            if all {
                targets.sort();
            }

            let mut seen = HashSet::new();
            let mut hits = Vec::new();
            for name in targets {
                if !seen.insert(name.as_str()) {
                    continue;
                }
                let data = indices
                    .get(name.as_str())
                    .ok_or_else(|| BackendError::IndexMissing(name.clone()))?;
                for (doc_type, docs) in data {
                    if !request.types.is_empty() && !request.types.contains(doc_type) {
                        continue;
                    }
                    for (id, doc) in docs.iter().filter(|(_, doc)| query.matches(&doc.source)) {
                        hits.push(SearchHit {
                            index: name.clone(),
                            doc_type: doc_type.clone(),
                            id: id.clone(),
                            score: Some(1.0),
                            source: Value::Object(doc.source.clone()),
                        });
                    }
                }
            }
            hits
        };

        let total = matched.len() as u64;
        let max_score = if matched.is_empty() { None } else { Some(1.0) };
        let remaining: Vec<SearchHit> = matched.into_iter().skip(from).collect();

        // count and scan never return hits with the first response
        let page_len = match search_type {
            SearchType::Count | SearchType::Scan => 0,
            _ => size.min(remaining.len()),
        };
        let page = remaining[..page_len].to_vec();

        let scroll_id = match keep_alive {
            Some(keep_alive) if search_type != SearchType::Count => {
                let scroll_id = Uuid::new_v4().to_string();
                let now = Instant::now();
                let mut scrolls = self.scrolls.lock().await;
                scrolls.retain(|_, context| context.expires_at > now);
                scrolls.insert(
                    scroll_id.clone(),
                    ScrollContext {
                        hits: remaining,
                        offset: page_len,
                        page_size: size,
                        total,
                        max_score,
                        expires_at: expiry(now, keep_alive),
                    },
                );
                drop(scrolls);
                debug!(scroll_id = %scroll_id, total, "Scroll context opened");
                Some(scroll_id)
            }
            _ => None,
        };

        Ok(SearchResponse {
            scroll_id,
            took: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            timed_out: false,
            hits: SearchHits {
                total,
                max_score,
                hits: page,
            },
            aggregations: None,
            facets: None,
        })
    }

    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> BackendResult<SearchResponse> {
        let keep_alive = parse_keep_alive(keep_alive)?;
        let now = Instant::now();

        let mut scrolls = self.scrolls.lock().await;
        scrolls.retain(|_, context| context.expires_at > now);
        let context = scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| BackendError::SearchContextMissing(scroll_id.to_string()))?;

        let end = context
            .offset
            .saturating_add(context.page_size)
            .min(context.hits.len());
        let page = context.hits[context.offset..end].to_vec();
        context.offset = end;
        context.expires_at = expiry(now, keep_alive);

        Ok(SearchResponse {
            scroll_id: Some(scroll_id.to_string()),
            took: 0,
            timed_out: false,
            hits: SearchHits {
                total: context.total,
                max_score: context.max_score,
                hits: page,
            },
            aggregations: None,
            facets: None,
        })
    }

    async fn put_template(
        &self,
        request: PutTemplateRequest,
    ) -> BackendResult<PutTemplateResponse> {
        let mut templates = self.templates.write().await;
        if request.create && templates.contains_key(&request.name) {
            return Err(BackendError::TemplateAlreadyExists(request.name));
        }
        debug!(template = %request.name, "Template stored");
        templates.insert(request.name, request.source);
        Ok(PutTemplateResponse { acknowledged: true })
    }
}

fn next_version(
    doc_type: &str,
    id: &str,
    current: Option<i64>,
    provided: Option<i64>,
    version_type: VersionType,
) -> BackendResult<i64> {
    let conflict = |provided| BackendError::VersionConflict {
        doc_type: doc_type.to_string(),
        id: id.to_string(),
        current: current.unwrap_or(-1),
        provided,
    };

    match (version_type, provided) {
        (VersionType::Internal, None) => Ok(current.unwrap_or(0) + 1),
        (VersionType::Internal, Some(v)) if current == Some(v) => Ok(v + 1),
        (VersionType::Internal, Some(v)) => Err(conflict(v)),
        (_, None) => Err(BackendError::invalid(format!(
            "version type [{}] requires a version",
            version_type.as_str()
        ))),
        (VersionType::External, Some(v)) if current.map_or(true, |c| v > c) => Ok(v),
        (VersionType::ExternalGte, Some(v)) if current.map_or(true, |c| v >= c) => Ok(v),
        (VersionType::Force, Some(v)) => Ok(v),
        (_, Some(v)) => Err(conflict(v)),
    }
}

fn parse_query(source: Option<&Map<String, Value>>) -> BackendResult<Query> {
    let Some(query) = source.and_then(|source| source.get("query")) else {
        return Ok(Query::MatchAll);
    };
    let Value::Object(clauses) = query else {
        return Err(BackendError::invalid("query must be an object"));
    };

    let mut iter = clauses.iter();
    let (kind, body) = match (iter.next(), iter.next()) {
        (None, _) => return Ok(Query::MatchAll),
        (Some(clause), None) => clause,
        _ => return Err(BackendError::invalid("query must contain a single clause")),
    };

    match kind.as_str() {
        "match_all" => Ok(Query::MatchAll),
        "term" => {
            let (field, value) = single_field(kind, body)?;
            let value = match value {
                Value::Object(options) => options
                    .get("value")
                    .cloned()
                    .ok_or_else(|| BackendError::invalid("[term] query requires a value"))?,
                other => other.clone(),
            };
            Ok(Query::Term { field, value })
        }
        "match" => {
            let (field, value) = single_field(kind, body)?;
            let text = match value {
                Value::String(text) => text.clone(),
                Value::Object(options) => options
                    .get("query")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| BackendError::invalid("[match] query requires a query"))?,
                other => other.to_string(),
            };
            Ok(Query::Match { field, text })
        }
        other => Err(BackendError::invalid(format!(
            "No query registered for [{other}]"
        ))),
    }
}

fn single_field<'a>(kind: &str, body: &'a Value) -> BackendResult<(String, &'a Value)> {
    match body {
        Value::Object(fields) if fields.len() == 1 => fields
            .iter()
            .next()
            .map(|(field, value)| (field.clone(), value))
            .ok_or_else(|| BackendError::invalid(format!("[{kind}] query is empty"))),
        _ => Err(BackendError::invalid(format!(
            "[{kind}] query requires exactly one field"
        ))),
    }
}

fn page_param(
    source: Option<&Map<String, Value>>,
    key: &str,
    default: usize,
) -> BackendResult<usize> {
    match source.and_then(|source| source.get(key)) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .and_then(|value| usize::try_from(value).ok())
            .ok_or_else(|| {
                BackendError::invalid(format!("[{key}] must be a non-negative integer"))
            }),
    }
}

/// Cursor deadline; keep-alives past the clock's range are capped at a year.
fn expiry(now: Instant, keep_alive: Duration) -> Instant {
    now.checked_add(keep_alive)
        .unwrap_or_else(|| now + Duration::from_secs(365 * 86_400))
}

/// Resolve a dotted field path such as `user.name`.
fn lookup<'a>(source: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = source.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
