//! searchbus protocol types.
//!
//! This crate defines:
//! - `Envelope`: the JSON object exchanged over the message bus
//! - `Action`: the closed set of operations a request may name
//! - `Failure` / `Reply`: the outcome of handling one envelope
//! - WebSocket frame shapes used by the gateway front end

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Envelope field names shared by the gateway and its callers.
pub mod fields {
    pub const ACTION: &str = "action";
    pub const INDEX: &str = "_index";
    pub const INDICES: &str = "_indices";
    pub const TYPE: &str = "_type";
    pub const TYPES: &str = "_types";
    pub const ID: &str = "_id";
    pub const VERSION: &str = "_version";
    pub const NAME: &str = "_name";
    pub const SOURCE: &str = "source";
    pub const CREATE: &str = "create";
    pub const CREATED: &str = "created";
    pub const FOUND: &str = "found";
    pub const HITS: &str = "hits";
    pub const TOTAL: &str = "total";
    pub const ACKNOWLEDGED: &str = "acknowledged";
    pub const REQUEST_VERSION: &str = "version";
    pub const VERSION_TYPE: &str = "version_type";
    pub const OP_TYPE: &str = "op_type";
    pub const REFRESH: &str = "refresh";
    pub const SEARCH_TYPE: &str = "search_type";
    pub const SCROLL: &str = "scroll";
    pub const SCROLL_ID: &str = "scroll_id";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "index")]
    Index,
    #[serde(rename = "get")]
    Get,
    #[serde(rename = "search")]
    Search,
    #[serde(rename = "scroll")]
    Scroll,
    #[serde(rename = "putIndexTemplate")]
    PutIndexTemplate,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Index,
        Action::Get,
        Action::Search,
        Action::Scroll,
        Action::PutIndexTemplate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Index => "index",
            Action::Get => "get",
            Action::Search => "search",
            Action::Scroll => "scroll",
            Action::PutIndexTemplate => "putIndexTemplate",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an envelope could not be routed to an operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("action must be specified")]
    Missing,
    #[error("Unrecognized action {0}")]
    Unrecognized(String),
}

impl std::str::FromStr for Action {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| ActionError::Unrecognized(s.to_string()))
    }
}

/// A required or optional envelope field that does not hold a usable value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("{0} is required")]
    Missing(String),
    #[error("{field} must be {expected}")]
    InvalidType {
        field: String,
        expected: &'static str,
    },
    #[error("{field} has unsupported value '{value}'")]
    InvalidValue { field: String, value: String },
}

impl FieldError {
    pub fn field(&self) -> &str {
        match self {
            FieldError::Missing(field) => field.as_str(),
            FieldError::InvalidType { field, .. } | FieldError::InvalidValue { field, .. } => {
                field.as_str()
            }
        }
    }
}

/// JSON object carried over the message bus.
///
/// Absent keys and explicit `null` values are treated alike by every accessor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelope carrying only an `action` discriminator.
    pub fn for_action(action: Action) -> Self {
        Self::new().with(fields::ACTION, action.as_str())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Parse the `action` discriminator.
    pub fn action(&self) -> Result<Action, ActionError> {
        match self.get(fields::ACTION) {
            None => Err(ActionError::Missing),
            Some(Value::String(action)) => action.parse(),
            Some(other) => Err(ActionError::Unrecognized(other.to_string())),
        }
    }

    /// A non-empty string field.
    pub fn required_str(&self, key: &str) -> Result<&str, FieldError> {
        match self.optional_str(key)? {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(FieldError::Missing(key.to_string())),
        }
    }

    pub fn optional_str(&self, key: &str) -> Result<Option<&str>, FieldError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.as_str())),
            Some(_) => Err(invalid_type(key, "a string")),
        }
    }

    pub fn required_object(&self, key: &str) -> Result<&Map<String, Value>, FieldError> {
        self.optional_object(key)?
            .ok_or_else(|| FieldError::Missing(key.to_string()))
    }

    pub fn optional_object(&self, key: &str) -> Result<Option<&Map<String, Value>>, FieldError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(value)) => Ok(Some(value)),
            Some(_) => Err(invalid_type(key, "an object")),
        }
    }

    pub fn optional_bool(&self, key: &str) -> Result<Option<bool>, FieldError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(value)) => Ok(Some(*value)),
            Some(_) => Err(invalid_type(key, "a boolean")),
        }
    }

    pub fn optional_i64(&self, key: &str) -> Result<Option<i64>, FieldError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| invalid_type(key, "an integer")),
        }
    }

    /// A list of strings; every element must be a string.
    pub fn optional_str_list(&self, key: &str) -> Result<Vec<&str>, FieldError> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().ok_or_else(|| invalid_type(key, "a list of strings")))
                .collect(),
            Some(_) => Err(invalid_type(key, "a list of strings")),
        }
    }
}

fn invalid_type(key: &str, expected: &'static str) -> FieldError {
    FieldError::InvalidType {
        field: key.to_string(),
        expected,
    }
}

impl From<Map<String, Value>> for Envelope {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Envelope {
    type Error = Value;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

/// Failure signal returned in place of a reply envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct Failure {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl Failure {
    /// Code used for every failure raised by a handler.
    pub const HANDLER: i32 = -1;

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: Self::HANDLER,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    pub fn with_cause(mut self, cause: impl std::fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

impl From<ActionError> for Failure {
    fn from(err: ActionError) -> Self {
        Failure::new(err.to_string())
    }
}

impl From<FieldError> for Failure {
    fn from(err: FieldError) -> Self {
        Failure::new(err.to_string())
    }
}

/// Outcome of handling one envelope: exactly one of reply or failure.
pub type Reply = Result<Envelope, Failure>;

/// Text frame sent by a WebSocket client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub body: Envelope,
}

/// Text frame returned to a WebSocket client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ReplyFrame {
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        body: Envelope,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        code: i32,
        message: String,
    },
}

impl ReplyFrame {
    pub fn from_reply(id: Option<String>, reply: Reply) -> Self {
        match reply {
            Ok(body) => ReplyFrame::Ok { id, body },
            Err(failure) => ReplyFrame::Error {
                id,
                code: failure.code,
                message: failure.message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::{
        fields, Action, ActionError, Envelope, Failure, FieldError, ReplyFrame, RequestFrame,
    };

    fn envelope(value: serde_json::Value) -> Envelope {
        Envelope::try_from(value).unwrap()
    }

    #[test]
    fn action_parses_every_known_name() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert_eq!(
            "putIndexTemplate".parse::<Action>().unwrap(),
            Action::PutIndexTemplate
        );
    }

    #[test]
    fn action_missing_and_unrecognized_are_distinct() {
        let missing = envelope(json!({"_index": "a"}));
        assert_eq!(missing.action().unwrap_err(), ActionError::Missing);
        assert_eq!(
            ActionError::Missing.to_string(),
            "action must be specified"
        );

        let unknown = envelope(json!({"action": "delete"}));
        let err = unknown.action().unwrap_err();
        assert_eq!(err, ActionError::Unrecognized("delete".to_string()));
        assert_eq!(err.to_string(), "Unrecognized action delete");
    }

    #[test]
    fn null_action_counts_as_missing() {
        let env = envelope(json!({"action": null}));
        assert_eq!(env.action().unwrap_err(), ActionError::Missing);
    }

    #[test]
    fn required_str_rejects_empty_and_wrong_type() {
        let env = envelope(json!({"_index": "", "_type": 3, "_id": "doc"}));
        assert_eq!(
            env.required_str(fields::INDEX).unwrap_err(),
            FieldError::Missing("_index".to_string())
        );
        assert_eq!(
            env.required_str(fields::TYPE).unwrap_err().to_string(),
            "_type must be a string"
        );
        assert_eq!(env.required_str(fields::ID).unwrap(), "doc");
        assert_eq!(
            env.required_str(fields::NAME).unwrap_err().to_string(),
            "_name is required"
        );
    }

    #[test]
    fn str_list_requires_string_elements() {
        let env = envelope(json!({"_indices": ["a", "b"], "_types": ["t", 1]}));
        assert_eq!(env.optional_str_list(fields::INDICES).unwrap(), vec!["a", "b"]);
        assert!(env.optional_str_list(fields::TYPES).is_err());
        assert!(env.optional_str_list("missing").unwrap().is_empty());
    }

    #[test]
    fn optional_i64_rejects_fractional_numbers() {
        let env = envelope(json!({"version": 2, "bad": 1.5}));
        assert_eq!(env.optional_i64("version").unwrap(), Some(2));
        assert!(env.optional_i64("bad").is_err());
    }

    #[test]
    fn envelope_serializes_as_plain_object() {
        let env = Envelope::for_action(Action::Get)
            .with(fields::INDEX, "test_index")
            .with(fields::ID, "1");
        let encoded = serde_json::to_value(&env).unwrap();
        assert_eq!(
            encoded,
            json!({"action": "get", "_index": "test_index", "_id": "1"})
        );
    }

    #[test]
    fn reply_frame_uses_status_tag() {
        let ok = ReplyFrame::from_reply(Some("7".into()), Ok(Envelope::new().with("found", false)));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"status": "ok", "id": "7", "body": {"found": false}})
        );

        let err = ReplyFrame::from_reply(None, Err(Failure::new("_index is required")));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"status": "error", "code": -1, "message": "_index is required"})
        );
    }

    #[test]
    fn request_frame_id_is_optional() {
        let frame: RequestFrame =
            serde_json::from_value(json!({"body": {"action": "search"}})).unwrap();
        assert!(frame.id.is_none());
        assert_eq!(frame.body.action().unwrap(), Action::Search);
    }

    proptest! {
        #[test]
        fn unknown_action_names_are_echoed(name in "[a-zA-Z]{1,16}") {
            prop_assume!(name.parse::<Action>().is_err());
            let env = Envelope::new().with(fields::ACTION, name.clone());
            let failure = Failure::from(env.action().unwrap_err());
            prop_assert_eq!(failure.message, format!("Unrecognized action {name}"));
        }
    }
}
