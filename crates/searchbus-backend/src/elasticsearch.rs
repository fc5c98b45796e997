//! Elasticsearch REST backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{BackendError, BackendResult};
use crate::store::SearchBackend;
use crate::types::{
    GetRequest, GetResponse, IndexRequest, IndexResponse, PutTemplateRequest, PutTemplateResponse,
    SearchRequest, SearchResponse,
};

/// Configuration for an Elasticsearch cluster
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    /// Base URL of any cluster node
    pub url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ElasticsearchConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Search backend talking to Elasticsearch over HTTP
#[derive(Debug, Clone)]
pub struct ElasticsearchBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl ElasticsearchBackend {
    pub fn new(config: ElasticsearchConfig) -> BackendResult<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|err| BackendError::invalid(format!("invalid url [{}]: {err}", config.url)))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::invalid(format!(
                "invalid url [{}]: not a base url",
                config.url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| BackendError::Transport(err.to_string()))?;

        Ok(Self { client, base_url })
    }

    fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> BackendResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::invalid("url cannot hold a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> BackendResult<(StatusCode, Value)> {
        debug!(method = %method, url = %url, "Elasticsearch request");
        let mut request = self.client.request(method, url).query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))?;

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(_) if !status.is_success() => Value::String(text),
                Err(err) => return Err(err.into()),
            }
        };
        Ok((status, value))
    }

    fn parse_error_response(status: StatusCode, body: &Value) -> BackendError {
        let (kind, reason) = error_details(body);
        debug!(status = status.as_u16(), kind = %kind, "Elasticsearch error response");

        match kind.as_str() {
            "index_not_found_exception" | "IndexMissingException" => {
                let index = body
                    .pointer("/error/index")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or(reason);
                BackendError::IndexMissing(index)
            }
            "search_context_missing_exception" | "SearchContextMissingException" => {
                BackendError::SearchContextMissing(reason)
            }
            _ => BackendError::Engine {
                status: status.as_u16(),
                reason,
            },
        }
    }
}

/// Extract `(type, reason)` from both the structured and the legacy string error shape.
fn error_details(body: &Value) -> (String, String) {
    match body.get("error") {
        Some(Value::Object(error)) => {
            let kind = error
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let reason = error
                .get("reason")
                .and_then(Value::as_str)
                .map_or_else(|| Value::Object(error.clone()).to_string(), str::to_string);
            (kind, reason)
        }
        Some(Value::String(message)) => {
            // legacy engines report `IndexMissingException[[name] missing]`
            let kind = message.split('[').next().unwrap_or_default().to_string();
            (kind, message.clone())
        }
        _ => match body {
            Value::String(text) => (String::new(), text.clone()),
            other => (String::new(), other.to_string()),
        },
    }
}

#[derive(Debug, Deserialize)]
struct RawIndexResponse {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_type", default)]
    doc_type: Option<String>,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_version")]
    version: i64,
    #[serde(default)]
    created: Option<bool>,
    #[serde(default)]
    result: Option<String>,
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn index(&self, request: IndexRequest) -> BackendResult<IndexResponse> {
        let mut query = Vec::new();
        if let Some(version) = request.version {
            query.push(("version", version.to_string()));
        }
        if let Some(version_type) = request.version_type {
            query.push(("version_type", version_type.as_str().to_string()));
        }
        if let Some(op_type) = request.op_type {
            query.push(("op_type", op_type.as_str().to_string()));
        }
        if let Some(refresh) = request.refresh {
            query.push(("refresh", refresh.to_string()));
        }

        let (method, url) = match &request.id {
            Some(id) => (
                Method::PUT,
                self.endpoint(&[&request.index, &request.doc_type, id])?,
            ),
            None => (
                Method::POST,
                self.endpoint(&[&request.index, &request.doc_type])?,
            ),
        };
        let body = Value::Object(request.source);
        let (status, value) = self.send(method, url, &query, Some(&body)).await?;

        if status == StatusCode::CONFLICT {
            let (kind, _) = error_details(&value);
            if kind.contains("document_already_exists") || kind.contains("DocumentAlreadyExists") {
                return Err(BackendError::DocumentAlreadyExists {
                    doc_type: request.doc_type,
                    id: request.id.unwrap_or_default(),
                });
            }
        }
        if !status.is_success() {
            return Err(Self::parse_error_response(status, &value));
        }

        let raw: RawIndexResponse = serde_json::from_value(value)?;
        Ok(IndexResponse {
            created: raw
                .created
                .unwrap_or_else(|| raw.result.as_deref() == Some("created")),
            index: raw.index,
            doc_type: raw.doc_type.unwrap_or(request.doc_type),
            id: raw.id,
            version: raw.version,
        })
    }

    async fn get(&self, request: GetRequest) -> BackendResult<GetResponse> {
        let url = self.endpoint(&[&request.index, &request.doc_type, &request.id])?;
        let (status, value) = self.send(Method::GET, url, &[], None).await?;

        // an absent document is a 404 that still carries `found`
        let absent_document = status == StatusCode::NOT_FOUND && value.get("found").is_some();
        if !status.is_success() && !absent_document {
            return Err(Self::parse_error_response(status, &value));
        }

        let mut response: GetResponse = serde_json::from_value(value)?;
        if response.doc_type.is_empty() {
            response.doc_type = request.doc_type;
        }
        Ok(response)
    }

    async fn search(&self, request: SearchRequest) -> BackendResult<SearchResponse> {
        let mut segments = vec![if request.indices.is_empty() {
            "_all".to_string()
        } else {
            request.indices.join(",")
        }];
        if !request.types.is_empty() {
            segments.push(request.types.join(","));
        }
        segments.push("_search".to_string());
        let url = self.endpoint(segments.as_slice())?;

        let mut query = Vec::new();
        if let Some(search_type) = request.search_type {
            query.push(("search_type", search_type.as_str().to_string()));
        }
        if let Some(scroll) = request.scroll {
            query.push(("scroll", scroll));
        }

        let body = Value::Object(request.source.unwrap_or_default());
        let (status, value) = self.send(Method::POST, url, &query, Some(&body)).await?;
        if !status.is_success() {
            return Err(Self::parse_error_response(status, &value));
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> BackendResult<SearchResponse> {
        let url = self.endpoint(&["_search", "scroll"])?;
        let body = json!({ "scroll": keep_alive, "scroll_id": scroll_id });
        let (status, value) = self.send(Method::POST, url, &[], Some(&body)).await?;

        if status == StatusCode::NOT_FOUND {
            warn!(scroll_id = %scroll_id, "Scroll context not found");
            return Err(BackendError::SearchContextMissing(scroll_id.to_string()));
        }
        if !status.is_success() {
            return Err(Self::parse_error_response(status, &value));
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn put_template(
        &self,
        request: PutTemplateRequest,
    ) -> BackendResult<PutTemplateResponse> {
        let url = self.endpoint(&["_template", request.name.as_str()])?;
        let query = [("create", request.create.to_string())];
        let body = Value::Object(request.source);
        let (status, value) = self.send(Method::PUT, url, &query, Some(&body)).await?;

        if !status.is_success() {
            let (kind, _) = error_details(&value);
            if kind.contains("index_template_already_exists")
                || kind.contains("IndexTemplateAlreadyExists")
            {
                return Err(BackendError::TemplateAlreadyExists(request.name));
            }
            return Err(Self::parse_error_response(status, &value));
        }
        Ok(serde_json::from_value(value)?)
    }
}
