//! `putIndexTemplate` operation

use searchbus_backend::{PutTemplateRequest, SearchBackend};
use searchbus_protocol::{fields, Action, Envelope, FieldError};
use serde_json::{Map, Value};

use super::{OpError, OpResult};

pub(crate) const FAILURE_PREFIX: &str = "Put Index Template error: ";

pub fn translate(envelope: &Envelope) -> Result<PutTemplateRequest, FieldError> {
    Ok(PutTemplateRequest {
        name: envelope.required_str(fields::NAME)?.to_string(),
        source: envelope.required_object(fields::SOURCE)?.clone(),
        create: envelope.optional_bool(fields::CREATE)?.unwrap_or(false),
    })
}

/// Envelope registering one template, as sent during bootstrap
pub fn request_envelope(name: &str, source: Map<String, Value>, create: bool) -> Envelope {
    Envelope::for_action(Action::PutIndexTemplate)
        .with(fields::NAME, name)
        .with(fields::SOURCE, Value::Object(source))
        .with(fields::CREATE, create)
}

pub async fn execute(backend: &dyn SearchBackend, envelope: &Envelope) -> OpResult<Envelope> {
    let request = translate(envelope)?;
    let response = backend
        .put_template(request)
        .await
        .map_err(|err| OpError::backend(FAILURE_PREFIX, err))?;
    Ok(Envelope::new().with(fields::ACKNOWLEDGED, response.acknowledged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope_round_trips_through_translate() {
        let source = match json!({"template": "logs-*", "settings": {"number_of_shards": 1}}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let envelope = request_envelope("logs", source.clone(), true);
        assert_eq!(envelope.action().unwrap(), Action::PutIndexTemplate);

        let request = translate(&envelope).unwrap();
        assert_eq!(request.name, "logs");
        assert_eq!(request.source, source);
        assert!(request.create);
    }

    #[test]
    fn create_defaults_to_false() {
        let envelope = Envelope::try_from(json!({"_name": "logs", "source": {}})).unwrap();
        assert!(!translate(&envelope).unwrap().create);
    }

    #[test]
    fn name_is_required() {
        let envelope = Envelope::try_from(json!({"source": {}})).unwrap();
        assert_eq!(translate(&envelope).unwrap_err().to_string(), "_name is required");
    }
}
