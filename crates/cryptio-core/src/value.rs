//! Shapes of the values callers store.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::{codec, error::CryptioError};

/// A value on its way into (or out of) storage, classified once at the
/// serialization boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    /// A keyed record, e.g. `{"id": 7}`.
    Object(Map<String, Value>),
    /// An ordered list.
    Sequence(Vec<Value>),
    /// Strings, numbers, booleans and null.
    Scalar(Value),
}

impl StoredValue {
    /// Serialize any `serde` value and classify the result.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self, CryptioError> {
        Ok(serde_json::to_value(value)?.into())
    }

    /// Deserialize into a caller type.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, CryptioError> {
        Ok(serde_json::from_value(self.into_json())?)
    }

    pub fn into_json(self) -> Value {
        match self {
            StoredValue::Object(map) => Value::Object(map),
            StoredValue::Sequence(items) => Value::Array(items),
            StoredValue::Scalar(value) => value,
        }
    }

    /// Canonical JSON text of the value.
    pub fn to_json_text(&self) -> Result<String, CryptioError> {
        let text = match self {
            StoredValue::Object(map) => serde_json::to_string(map)?,
            StoredValue::Sequence(items) => serde_json::to_string(items)?,
            StoredValue::Scalar(value) => serde_json::to_string(value)?,
        };
        Ok(text)
    }

    pub fn from_json_text(text: &str) -> Result<Self, CryptioError> {
        Ok(serde_json::from_str::<Value>(text)?.into())
    }

    /// JSON text as UTF-8 bytes, ready for signing and encryption.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CryptioError> {
        Ok(codec::encode(&self.to_json_text()?)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptioError> {
        Self::from_json_text(&codec::decode(bytes)?)
    }

    /// Number of members of an object or items of a sequence; 0 for scalars.
    pub fn entry_count(&self) -> usize {
        match self {
            StoredValue::Object(map) => map.len(),
            StoredValue::Sequence(items) => items.len(),
            StoredValue::Scalar(_) => 0,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoredValue::Object(_) => "object",
            StoredValue::Sequence(_) => "sequence",
            StoredValue::Scalar(_) => "scalar",
        }
    }
}

impl From<Value> for StoredValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => StoredValue::Object(map),
            Value::Array(items) => StoredValue::Sequence(items),
            other => StoredValue::Scalar(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Token {
        id: u32,
    }

    #[test]
    fn classifies_at_the_boundary() {
        let object = StoredValue::from_serializable(&Token { id: 7 }).expect("object");
        assert_eq!(object.kind(), "object");
        assert_eq!(object.entry_count(), 1);

        let sequence = StoredValue::from_serializable(&vec![1, 2, 3]).expect("sequence");
        assert_eq!(sequence.kind(), "sequence");
        assert_eq!(sequence.entry_count(), 3);

        let scalar = StoredValue::from_serializable("text").expect("scalar");
        assert_eq!(scalar.kind(), "scalar");
        assert_eq!(scalar.entry_count(), 0);
    }

    #[test]
    fn bytes_round_trip_to_typed_value() {
        let value = StoredValue::from_serializable(&Token { id: 7 }).expect("serialize");
        let bytes = value.to_bytes().expect("bytes");
        assert_eq!(bytes, br#"{"id":7}"#.to_vec());

        let restored: Token = StoredValue::from_bytes(&bytes)
            .expect("parse")
            .into_typed()
            .expect("typed");
        assert_eq!(restored, Token { id: 7 });
    }

    #[test]
    fn preserves_multibyte_text() {
        let value = StoredValue::from(json!({"note": "naïve 😀 €"}));
        let restored = StoredValue::from_bytes(&value.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn rejects_non_json_bytes() {
        let err = StoredValue::from_bytes(b"not json").expect_err("should fail");
        assert!(matches!(err, CryptioError::Serialization { .. }));
    }
}
