//! `get` operation

use searchbus_backend::{GetRequest, SearchBackend};
use searchbus_protocol::{fields, Envelope, FieldError};
use tracing::debug;

use super::{to_envelope, OpError, OpResult};

pub(crate) const FAILURE_PREFIX: &str = "Get error: ";

pub fn translate(envelope: &Envelope) -> Result<GetRequest, FieldError> {
    Ok(GetRequest::new(
        envelope.required_str(fields::INDEX)?,
        envelope.required_str(fields::TYPE)?,
        envelope.required_str(fields::ID)?,
    ))
}

/// A missing index is reported as `{"found": false}` rather than a failure.
pub async fn execute(backend: &dyn SearchBackend, envelope: &Envelope) -> OpResult<Envelope> {
    let request = translate(envelope)?;
    match backend.get(request).await {
        Ok(response) => to_envelope(&response),
        Err(err) if err.is_index_missing() => {
            debug!(error = %err, "Get on missing index");
            Ok(Envelope::new().with(fields::FOUND, false))
        }
        Err(err) => Err(OpError::backend(FAILURE_PREFIX, err)),
    }
}
