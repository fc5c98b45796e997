//! Operation translators
//!
//! Each operation validates the envelope into a backend request before any
//! backend call, then turns the backend outcome into a reply envelope.

pub mod get;
pub mod index;
pub mod scroll;
pub mod search;
pub mod template;

use searchbus_backend::BackendError;
use searchbus_protocol::{Envelope, Failure, FieldError};
use serde::Serialize;
use thiserror::Error;

/// Why an operation produced a failure reply
#[derive(Debug, Error)]
pub enum OpError {
    #[error(transparent)]
    Invalid(#[from] FieldError),

    #[error("{prefix}{source}")]
    Backend {
        prefix: &'static str,
        source: BackendError,
    },

    #[error("Error reading search response: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OpError {
    pub(crate) fn backend(prefix: &'static str, source: BackendError) -> Self {
        Self::Backend { prefix, source }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            OpError::Invalid(_) => "validation",
            OpError::Backend { .. } => "backend",
            OpError::Serialization(_) => "serialization",
        }
    }
}

impl From<OpError> for Failure {
    fn from(err: OpError) -> Self {
        let failure = Failure::new(err.to_string());
        match err {
            OpError::Backend { source, .. } => failure.with_cause(source),
            OpError::Serialization(source) => failure.with_cause(source),
            OpError::Invalid(_) => failure,
        }
    }
}

/// Result type for operation translators
pub type OpResult<T> = Result<T, OpError>;

/// Serialize a structured engine response into a reply envelope.
pub(crate) fn to_envelope<T: Serialize>(response: &T) -> OpResult<Envelope> {
    let value = serde_json::to_value(response)?;
    Envelope::try_from(value).map_err(|other| {
        OpError::Serialization(serde::ser::Error::custom(format!(
            "expected a JSON object, got {other}"
        )))
    })
}

/// Parse an optional string field into an enum, naming the field on failure.
pub(crate) fn parse_optional<T: std::str::FromStr>(
    envelope: &Envelope,
    key: &str,
) -> Result<Option<T>, FieldError> {
    envelope
        .optional_str(key)?
        .map(|value| {
            value.parse().map_err(|_| FieldError::InvalidValue {
                field: key.to_string(),
                value: value.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchbus_backend::SearchType;
    use serde_json::json;

    #[test]
    fn backend_failures_keep_prefix_and_cause() {
        let err = OpError::backend(
            "Index error: ",
            BackendError::Transport("connection refused".into()),
        );
        assert_eq!(err.kind(), "backend");
        let failure = Failure::from(err);
        assert_eq!(failure.message, "Index error: Transport error: connection refused");
        assert_eq!(failure.code, Failure::HANDLER);
        assert_eq!(failure.cause.as_deref(), Some("Transport error: connection refused"));
    }

    #[test]
    fn validation_failures_name_the_field() {
        let failure = Failure::from(OpError::from(FieldError::Missing("_id".into())));
        assert_eq!(failure.message, "_id is required");
        assert!(failure.cause.is_none());
    }

    #[test]
    fn optional_enum_rejects_unknown_value() {
        let envelope = Envelope::try_from(json!({"search_type": "fastest"})).unwrap();
        let err = parse_optional::<SearchType>(&envelope, "search_type").unwrap_err();
        assert_eq!(err.to_string(), "search_type has unsupported value 'fastest'");
        assert_eq!(parse_optional::<SearchType>(&envelope, "absent").unwrap(), None);
    }

    #[test]
    fn non_object_response_is_a_serialization_failure() {
        let err = to_envelope(&vec![1, 2]).unwrap_err();
        assert!(err.to_string().starts_with("Error reading search response: "));
    }
}
