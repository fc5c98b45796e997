//! `index` operation

use searchbus_backend::{IndexRequest, OpType, SearchBackend, VersionType};
use searchbus_protocol::{fields, Envelope, FieldError};

use super::{parse_optional, OpError, OpResult};

pub(crate) const FAILURE_PREFIX: &str = "Index error: ";

/// Validate an `index` envelope into a backend request.
pub fn translate(envelope: &Envelope) -> Result<IndexRequest, FieldError> {
    let index = envelope.required_str(fields::INDEX)?;
    let doc_type = envelope.required_str(fields::TYPE)?;
    let source = envelope.required_object(fields::SOURCE)?.clone();

    let mut request = IndexRequest::new(index, doc_type, source);
    request.id = envelope
        .optional_str(fields::ID)?
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    request.version = envelope.optional_i64(fields::REQUEST_VERSION)?;
    request.version_type = parse_optional::<VersionType>(envelope, fields::VERSION_TYPE)?;
    request.op_type = parse_optional::<OpType>(envelope, fields::OP_TYPE)?;
    request.refresh = envelope.optional_bool(fields::REFRESH)?;
    Ok(request)
}

pub async fn execute(backend: &dyn SearchBackend, envelope: &Envelope) -> OpResult<Envelope> {
    let request = translate(envelope)?;
    let response = backend
        .index(request)
        .await
        .map_err(|err| OpError::backend(FAILURE_PREFIX, err))?;

    Ok(Envelope::new()
        .with(fields::INDEX, response.index)
        .with(fields::TYPE, response.doc_type)
        .with(fields::ID, response.id)
        .with(fields::VERSION, response.version)
        .with(fields::CREATED, response.created))
}
