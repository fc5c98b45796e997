//! `scroll` operation

use searchbus_backend::SearchBackend;
use searchbus_protocol::{fields, Envelope, FieldError};

use super::{to_envelope, OpError, OpResult};

pub(crate) const FAILURE_PREFIX: &str = "Scroll error: ";

/// Scroll cursor id and keep-alive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollRequest {
    pub scroll_id: String,
    pub keep_alive: String,
}

pub fn translate(envelope: &Envelope) -> Result<ScrollRequest, FieldError> {
    Ok(ScrollRequest {
        scroll_id: envelope.required_str(fields::SCROLL_ID)?.to_string(),
        keep_alive: envelope.required_str(fields::SCROLL)?.to_string(),
    })
}

pub async fn execute(backend: &dyn SearchBackend, envelope: &Envelope) -> OpResult<Envelope> {
    let request = translate(envelope)?;
    let response = backend
        .scroll(&request.scroll_id, &request.keep_alive)
        .await
        .map_err(|err| OpError::backend(FAILURE_PREFIX, err))?;
    to_envelope(&response)
}
