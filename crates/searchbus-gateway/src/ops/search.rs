//! `search` operation

use searchbus_backend::{SearchBackend, SearchRequest, SearchType};
use searchbus_protocol::{fields, Envelope, FieldError};
use serde_json::{json, Value};
use tracing::debug;

use super::{parse_optional, to_envelope, OpError, OpResult};

pub(crate) const FAILURE_PREFIX: &str = "Search error: ";

/// Singular value first, then the list in order; duplicates are kept.
fn targets(envelope: &Envelope, single: &str, list: &str) -> Result<Vec<String>, FieldError> {
    let mut targets: Vec<String> = envelope
        .optional_str(single)?
        .into_iter()
        .map(str::to_string)
        .collect();
    targets.extend(envelope.optional_str_list(list)?.into_iter().map(str::to_string));
    Ok(targets)
}

pub fn translate(envelope: &Envelope) -> Result<SearchRequest, FieldError> {
    let indices = targets(envelope, fields::INDEX, fields::INDICES)?;
    if indices.is_empty() {
        return Err(FieldError::Missing(format!(
            "{} or {}",
            fields::INDEX,
            fields::INDICES
        )));
    }

    Ok(SearchRequest {
        indices,
        types: targets(envelope, fields::TYPE, fields::TYPES)?,
        search_type: parse_optional::<SearchType>(envelope, fields::SEARCH_TYPE)?,
        scroll: envelope.optional_str(fields::SCROLL)?.map(str::to_string),
        source: envelope.optional_object(fields::SOURCE)?.cloned(),
    })
}

/// Reply sent when any targeted index does not exist
pub fn empty_hits() -> Envelope {
    let mut hits = serde_json::Map::new();
    hits.insert(fields::TOTAL.to_string(), json!(0));
    hits.insert(fields::HITS.to_string(), Value::Array(Vec::new()));
    Envelope::new().with(fields::HITS, hits)
}

/// A missing index is reported as zero hits rather than a failure.
pub async fn execute(backend: &dyn SearchBackend, envelope: &Envelope) -> OpResult<Envelope> {
    let request = translate(envelope)?;
    match backend.search(request).await {
        Ok(response) => to_envelope(&response),
        Err(err) if err.is_index_missing() => {
            debug!(error = %err, "Search on missing index");
            Ok(empty_hits())
        }
        Err(err) => Err(OpError::backend(FAILURE_PREFIX, err)),
    }
}
