//! JSON codec for persisted records.
//!
//! Loading never fails on content: every field is read on its own and falls
//! back to its default when the key is missing or holds the wrong type.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record is not a JSON object: {0}")]
    Malformed(String),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A struct persisted as one named blob in the durable store.
pub trait Record: Serialize + Default + Sized {
    const NAME: &'static str;

    fn from_fields(fields: &mut FieldReader) -> Self;
}

pub struct FieldReader {
    object: Map<String, Value>,
    defaulted: Vec<&'static str>,
}

impl FieldReader {
    pub fn new(object: Map<String, Value>) -> Self {
        Self {
            object,
            defaulted: Vec::new(),
        }
    }

    pub fn take<T: DeserializeOwned>(&mut self, key: &'static str, default: T) -> T {
        match self
            .object
            .remove(key)
            .map(serde_json::from_value::<T>)
        {
            Some(Ok(value)) => value,
            _ => {
                self.defaulted.push(key);
                default
            }
        }
    }
}

/// Result of a lenient load.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    /// Keys that were missing or unreadable and took their default.
    pub defaulted: Vec<&'static str>,
    /// The blob was present but not a JSON object; `value` is all defaults.
    pub malformed: bool,
}

pub fn decode<T: Record>(bytes: &[u8]) -> Decoded<T> {
    match parse_object(bytes) {
        Ok(object) => {
            let mut fields = FieldReader::new(object);
            let value = T::from_fields(&mut fields);
            Decoded {
                value,
                defaulted: fields.defaulted,
                malformed: false,
            }
        }
        Err(_) => {
            let mut fields = FieldReader::new(Map::new());
            let value = T::from_fields(&mut fields);
            Decoded {
                value,
                defaulted: fields.defaulted,
                malformed: true,
            }
        }
    }
}

pub fn encode<T: Record>(record: &T) -> Result<Vec<u8>, RecordError> {
    Ok(serde_json::to_vec_pretty(record)?)
}

fn parse_object(bytes: &[u8]) -> Result<Map<String, Value>, RecordError> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(RecordError::Malformed(format!("unexpected {other}"))),
        Err(err) => Err(RecordError::Malformed(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hysteresis::HysteresisState;

    #[test]
    fn wrong_typed_field_takes_default_and_keeps_the_rest() {
        let decoded = decode::<HysteresisState>(
            br#"{"muteCold": true, "muteHot": "yes", "prevTemperature": 17}"#,
        );

        assert!(!decoded.malformed);
        assert_eq!(
            decoded.value,
            HysteresisState {
                mute_cold: true,
                mute_hot: false,
                prev_temperature: 17,
                prev_humidity: 50,
            }
        );
        assert_eq!(decoded.defaulted, vec!["muteHot", "prevHumidity"]);
    }

    #[test]
    fn garbage_yields_defaults_and_is_flagged() {
        let decoded = decode::<HysteresisState>(b"\xff\x00not json");

        assert!(decoded.malformed);
        assert_eq!(decoded.value, HysteresisState::default());
    }

    #[test]
    fn non_object_json_is_malformed() {
        let decoded = decode::<HysteresisState>(b"[1, 2, 3]");

        assert!(decoded.malformed);
        assert_eq!(decoded.value, HysteresisState::default());
    }

    #[test]
    fn encoded_record_decodes_without_defaults() {
        let state = HysteresisState {
            mute_cold: true,
            mute_hot: true,
            prev_temperature: 31,
            prev_humidity: 70,
        };

        let decoded = decode::<HysteresisState>(&encode(&state).unwrap());

        assert_eq!(decoded.value, state);
        assert!(decoded.defaulted.is_empty());
    }
}
