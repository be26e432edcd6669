//! Wire message container: a tag plus an ordered list of typed values.
//!
//! `Envelope` is the unit that gets encrypted and signed. Application code
//! never inspects positions directly; it goes through [`crate::Message`],
//! which validates arity and types once at decode time.

use serde::{Deserialize, Serialize};

use crate::{
    Token,
    errors::{ProtocolError, Result},
};

/// One positional payload value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Signed integer (challenges, ports, indices, sequence numbers)
    Int(i64),
    /// UTF-8 string
    Str(String),
    /// Raw bytes (keys, file chunks)
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    /// List of strings (member names, file paths)
    List(Vec<String>),
    /// Capability token
    Token(Token),
}

impl Value {
    /// Short type name used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Token(_) => "token",
        }
    }
}

/// Tagged, ordered-payload message container.
///
/// # Invariants
///
/// - Payload order is significant and defined per tag.
/// - On an established channel the last payload value is the sequence
///   number; [`Envelope::push_sequence`] and [`Envelope::pop_sequence`] are
///   the only code paths that touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    tag: String,
    payload: Vec<Value>,
}

impl Envelope {
    /// Envelope with an empty payload.
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), payload: Vec::new() }
    }

    /// Envelope with the given payload.
    pub fn with_payload(tag: impl Into<String>, payload: Vec<Value>) -> Self {
        Self { tag: tag.into(), payload }
    }

    /// Append a value.
    pub fn push(&mut self, value: Value) {
        self.payload.push(value);
    }

    /// Request/response discriminator.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Positional payload.
    #[must_use]
    pub fn payload(&self) -> &[Value] {
        &self.payload
    }

    /// Take ownership of tag and payload.
    #[must_use]
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.tag, self.payload)
    }

    /// Append a sequence number as the final payload element.
    ///
    /// # Errors
    ///
    /// - `InvalidValue` if `sequence` does not fit the wire integer type
    pub fn push_sequence(&mut self, sequence: u64) -> Result<()> {
        let value = i64::try_from(sequence).map_err(|_| ProtocolError::InvalidValue {
            tag: self.tag.clone(),
            index: self.payload.len(),
            expected: "sequence number within i64 range",
        })?;
        self.payload.push(Value::Int(value));
        Ok(())
    }

    /// Remove and return the trailing sequence number.
    ///
    /// # Errors
    ///
    /// - `MissingSequence` if the payload is empty or the last value is not a
    ///   non-negative integer
    pub fn pop_sequence(&mut self) -> Result<u64> {
        match self.payload.pop() {
            Some(Value::Int(n)) => u64::try_from(n).map_err(|_| ProtocolError::MissingSequence),
            Some(other) => {
                self.payload.push(other);
                Err(ProtocolError::MissingSequence)
            },
            None => Err(ProtocolError::MissingSequence),
        }
    }

    /// Encode as CBOR.
    ///
    /// # Errors
    ///
    /// - `CborEncode` if serialization fails
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR.
    ///
    /// # Errors
    ///
    /// - `CborDecode` on malformed input
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
    }
}

/// Outer container of a `Signed` frame.
///
/// The HMAC covers `ciphertext` exactly as transmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedContainer {
    /// AES-CBC ciphertext of a CBOR envelope
    #[serde(with = "serde_bytes")]
    pub ciphertext: Vec<u8>,
    /// Lowercase hex HMAC-SHA1 of `ciphertext`
    pub hmac: String,
}

impl SignedContainer {
    /// Encode as CBOR.
    ///
    /// # Errors
    ///
    /// - `CborEncode` if serialization fails
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.ciphertext.len() + 64);
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR.
    ///
    /// # Errors
    ///
    /// - `CborDecode` on malformed input
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_trailing_value() {
        let mut env = Envelope::new("CGROUP");
        env.push(Value::Str("eng".to_string()));
        env.push_sequence(41).unwrap();

        assert_eq!(env.payload().last(), Some(&Value::Int(41)));
        assert_eq!(env.pop_sequence().unwrap(), 41);
        assert_eq!(env.payload(), &[Value::Str("eng".to_string())]);
    }

    #[test]
    fn pop_sequence_rejects_non_integer() {
        let mut env = Envelope::with_payload("X", vec![Value::Str("nope".to_string())]);
        assert_eq!(env.pop_sequence(), Err(ProtocolError::MissingSequence));
        // payload untouched on failure
        assert_eq!(env.payload().len(), 1);

        let mut empty = Envelope::new("X");
        assert_eq!(empty.pop_sequence(), Err(ProtocolError::MissingSequence));

        let mut negative = Envelope::with_payload("X", vec![Value::Int(-3)]);
        assert_eq!(negative.pop_sequence(), Err(ProtocolError::MissingSequence));
    }

    #[test]
    fn cbor_round_trip_preserves_order() {
        let env = Envelope::with_payload(
            "CHUNK",
            vec![Value::Bytes(vec![0, 1, 2, 255]), Value::Int(4), Value::List(vec!["a".into()])],
        );
        let decoded = Envelope::from_cbor(&env.to_cbor().unwrap()).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            Envelope::from_cbor(&[0xff, 0x00, 0x13]),
            Err(ProtocolError::CborDecode(_))
        ));
    }
}
