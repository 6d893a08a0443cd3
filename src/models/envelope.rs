use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;
use uuid::Uuid;

use crate::error::CodecError;

// --------------------------------------------------------------------------------------------------------------
// Structured-mode event envelope
//
// Wire form (one self-contained JSON document):
//   {"specversion":"1.0","type":"...","source":"urn:...","id":"...",
//    "time":"2025-01-01T00:00:00Z","datacontenttype":"application/json","data":{...}}
// --------------------------------------------------------------------------------------------------------------

pub const SPEC_VERSION:      &str = "1.0";
pub const JSON_CONTENT_TYPE: &str = "application/json";

fn default_spec_version() -> String {
    SPEC_VERSION.to_string()
}

/// Untyped payload as it comes off the wire.
pub type RawPayload = Value;

/// One event envelope, generic over its payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope<P> {
    #[serde(rename = "specversion", default = "default_spec_version")]
    pub spec_version: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub source: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(rename = "datacontenttype", default, skip_serializing_if = "Option::is_none")]
    pub data_content_type: Option<String>,
    #[serde(default)]
    pub data: P,
}

impl<P> Envelope<P> {
    /// Fresh outbound envelope: new UUID id, current UTC time, JSON content type.
    pub fn new(event_type: &str, source: &str, data: P) -> Self {
        Self {
            spec_version:      default_spec_version(),
            event_type:        event_type.to_string(),
            source:            source.to_string(),
            id:                Uuid::new_v4().to_string(),
            time:              Some(Utc::now()),
            data_content_type: Some(JSON_CONTENT_TYPE.to_string()),
            data,
        }
    }

    /// Swap the payload while keeping every envelope attribute.
    pub fn with_data<Q>(self, data: Q) -> Envelope<Q> {
        Envelope {
            spec_version:      self.spec_version,
            event_type:        self.event_type,
            source:            self.source,
            id:                self.id,
            time:              self.time,
            data_content_type: self.data_content_type,
            data,
        }
    }
}

impl Envelope<RawPayload> {
    /// Re-materialise the payload as `P`, keeping the envelope attributes.
    pub fn into_typed<P: DeserializeOwned>(self) -> Result<Envelope<P>, CodecError> {
        let data = extract_typed::<P, _>(&self.data)?;
        Ok(self.with_data(data))
    }
}

// --------------------------------------------------------------------------------------------------------------

/// Parse a structured-mode message into an envelope with an untyped payload.
pub fn decode(raw: impl AsRef<[u8]>) -> Result<Envelope<RawPayload>, CodecError> {
    serde_json::from_slice(raw.as_ref()).map_err(CodecError::Decode)
}

/// Serialise an outbound envelope, stamping the envelope version and a UTC time when absent.
pub fn encode<P: Serialize>(envelope: &Envelope<P>) -> Result<String, CodecError> {
    let stamped = WireEnvelope {
        spec_version: if envelope.spec_version.is_empty() { SPEC_VERSION } else { &envelope.spec_version },
        event_type:        &envelope.event_type,
        source:            &envelope.source,
        id:                &envelope.id,
        time:              envelope.time.unwrap_or_else(Utc::now),
        data_content_type: envelope.data_content_type.as_deref(),
        data:              &envelope.data,
    };
    serde_json::to_string(&stamped).map_err(CodecError::Encode)
}

#[derive(Serialize)]
struct WireEnvelope<'a, P> {
    #[serde(rename = "specversion")]
    spec_version: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    source: &'a str,
    id: &'a str,
    time: DateTime<Utc>,
    #[serde(rename = "datacontenttype", skip_serializing_if = "Option::is_none")]
    data_content_type: Option<&'a str>,
    data: &'a P,
}

// --------------------------------------------------------------------------------------------------------------
// Payload extraction
//
// Depending on who produced the envelope, `data` may arrive as a JSON object, as a
// pre-parsed raw element, or as a string holding encoded JSON. Every form funnels
// through `PayloadSource` so handlers only ever see the concrete type.

/// A payload representation that can be turned into a typed value.
pub trait PayloadSource {
    fn deserialize_into<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error>;
}

impl PayloadSource for Value {
    fn deserialize_into<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        match self {
            Value::String(encoded) => serde_json::from_str(encoded),
            // An absent payload behaves like an empty object: optional fields stay None.
            Value::Null => serde_json::from_value(Value::Object(Default::default())),
            other => P::deserialize(other),
        }
    }
}

impl PayloadSource for RawValue {
    fn deserialize_into<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        let parsed: Value = serde_json::from_str(self.get())?;
        parsed.deserialize_into()
    }
}

impl PayloadSource for str {
    fn deserialize_into<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_str(self)
    }
}

impl PayloadSource for String {
    fn deserialize_into<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        self.as_str().deserialize_into()
    }
}

/// Convert any supported payload representation into `P`.
pub fn extract_typed<P, S>(raw: &S) -> Result<P, CodecError>
where
    P: DeserializeOwned,
    S: PayloadSource + ?Sized,
{
    raw.deserialize_into().map_err(|source| CodecError::PayloadShape {
        schema: std::any::type_name::<P>().rsplit("::").next().unwrap_or("payload"),
        source,
    })
}

// --------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize, Debug, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Probe {
        device_id:        String,
        duration_seconds: Option<i32>,
    }

    #[test]
    fn decode_reads_wire_attribute_names() {
        let raw = r#"{"specversion":"1.0","type":"t.v1","source":"urn:x","id":"42",
                      "time":"2025-03-01T10:00:00Z","datacontenttype":"application/json",
                      "data":{"deviceId":"D1"}}"#;
        let envelope = decode(raw).expect("decodes");

        assert_eq!(envelope.event_type, "t.v1");
        assert_eq!(envelope.id, "42");
        assert_eq!(envelope.source, "urn:x");
        assert_eq!(envelope.data_content_type.as_deref(), Some("application/json"));
        assert_eq!(envelope.data, json!({"deviceId": "D1"}));
    }

    #[test]
    fn decode_rejects_missing_type_or_id() {
        assert!(matches!(decode(r#"{"id":"1","data":{}}"#), Err(CodecError::Decode(_))));
        assert!(matches!(decode(r#"{"type":"t.v1","data":{}}"#), Err(CodecError::Decode(_))));
        assert!(matches!(decode("{not json"), Err(CodecError::Decode(_))));
    }

    #[test]
    fn decode_defaults_spec_version() {
        let envelope = decode(r#"{"type":"t.v1","id":"1"}"#).expect("decodes");
        assert_eq!(envelope.spec_version, SPEC_VERSION);
        assert_eq!(envelope.data, Value::Null);
    }

    #[test]
    fn encode_stamps_version_and_time() {
        let mut envelope = Envelope::new("t.v1", "urn:x", json!({"a": 1}));
        envelope.spec_version.clear();
        envelope.time = None;

        let wire: Value = serde_json::from_str(&encode(&envelope).expect("encodes")).expect("json");
        assert_eq!(wire["specversion"], "1.0");
        assert!(wire["time"].is_string());
        assert_eq!(wire["datacontenttype"], "application/json");
    }

    #[test]
    fn extract_accepts_object_string_and_raw_forms() {
        let expected = Probe { device_id: "D1".into(), duration_seconds: Some(30) };

        let object = json!({"deviceId": "D1", "durationSeconds": 30});
        let string = Value::String(r#"{"deviceId":"D1","durationSeconds":30}"#.to_string());
        let raw    = RawValue::from_string(r#"{"deviceId":"D1","durationSeconds":30}"#.to_string())
            .expect("raw value");

        assert_eq!(extract_typed::<Probe, _>(&object).expect("object"), expected);
        assert_eq!(extract_typed::<Probe, _>(&string).expect("string"), expected);
        assert_eq!(extract_typed::<Probe, RawValue>(&raw).expect("raw"), expected);
    }

    #[test]
    fn extract_leaves_optional_fields_empty() {
        let probe: Probe = extract_typed(&json!({"deviceId": "D1"})).expect("lenient");
        assert_eq!(probe.duration_seconds, None);
    }

    #[test]
    fn extract_reports_missing_required_field() {
        let err = extract_typed::<Probe, _>(&json!({"durationSeconds": 5})).unwrap_err();
        match err {
            CodecError::PayloadShape { schema, .. } => assert_eq!(schema, "Probe"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
