use cryptio_core::config::OutputEncoding;
use serde::{Deserialize, Serialize};

/// The unit actually persisted for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub iv: Vec<u8>,
    pub signature: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Wire shape of an [`Envelope`]: three text fields in the output encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub iv: String,
    pub signature: String,
    pub ciphertext: String,
}

/// Why a persisted record could not be turned back into an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Not a `{iv, signature, ciphertext}` record at all.
    Malformed(String),
    /// A binary field is not valid in the configured output encoding.
    Field { field: &'static str, reason: String },
}

impl Envelope {
    pub fn to_record(&self, output: OutputEncoding) -> StoredRecord {
        StoredRecord {
            iv: output.encode(&self.iv),
            signature: output.encode(&self.signature),
            ciphertext: output.encode(&self.ciphertext),
        }
    }

    /// Serialized record text, as handed to a backend.
    pub fn to_text(&self, output: OutputEncoding) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_record(output))
    }
}

impl StoredRecord {
    pub fn parse(text: &str) -> Result<Self, RecordError> {
        serde_json::from_str(text).map_err(|e| RecordError::Malformed(e.to_string()))
    }

    pub fn iv_bytes(&self, output: OutputEncoding) -> Result<Vec<u8>, RecordError> {
        decode_field("iv", &self.iv, output)
    }

    pub fn ciphertext_bytes(&self, output: OutputEncoding) -> Result<Vec<u8>, RecordError> {
        decode_field("ciphertext", &self.ciphertext, output)
    }

    pub fn signature_bytes(&self, output: OutputEncoding) -> Result<Vec<u8>, RecordError> {
        decode_field("signature", &self.signature, output)
    }
}

fn decode_field(
    field: &'static str,
    text: &str,
    output: OutputEncoding,
) -> Result<Vec<u8>, RecordError> {
    output.decode(text).map_err(|e| RecordError::Field {
        field,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        Envelope {
            iv: vec![0; 12],
            signature: vec![1, 2, 3],
            ciphertext: vec![0xFF, 0xFE],
        }
    }

    #[test]
    fn serializes_three_named_fields() {
        let text = envelope().to_text(OutputEncoding::Base64).expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["iv"], "AAAAAAAAAAAAAAAA");
        assert_eq!(value["signature"], "AQID");
        assert_eq!(value["ciphertext"], "//4=");
    }

    #[test]
    fn parses_fields_back_to_bytes() {
        let envelope = envelope();
        let text = envelope.to_text(OutputEncoding::Base64Url).unwrap();
        let record = StoredRecord::parse(&text).expect("parse");
        let output = OutputEncoding::Base64Url;

        assert_eq!(record.iv_bytes(output).unwrap(), envelope.iv);
        assert_eq!(record.signature_bytes(output).unwrap(), envelope.signature);
        assert_eq!(record.ciphertext_bytes(output).unwrap(), envelope.ciphertext);
    }

    #[test]
    fn reports_malformed_records_and_fields() {
        assert!(matches!(
            StoredRecord::parse("{\"iv\":\"AA==\"}"),
            Err(RecordError::Malformed(_))
        ));

        let record = StoredRecord {
            iv: "not base64!".into(),
            signature: String::new(),
            ciphertext: String::new(),
        };
        assert!(matches!(
            record.iv_bytes(OutputEncoding::Base64),
            Err(RecordError::Field { field: "iv", .. })
        ));
    }
}
