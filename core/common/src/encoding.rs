//! Serde helpers for binary fields stored in JSON documents.
//!
//! Raw bytes are written as standard base64 strings so configs and
//! manifests stay readable and compact.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de, Deserialize, Deserializer, Serializer};

/// Encode bytes as base64.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 string.
pub fn decode(text: &str) -> crate::Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| crate::Error::Serialization(format!("Invalid base64: {}", e)))
}

/// `#[serde(with = "lifechest_common::encoding::base64_bytes")]` for `Vec<u8>`.
pub mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(de::Error::custom)
    }
}

/// Same as [`base64_bytes`] for maps of string to bytes.
pub mod base64_map {
    use super::*;
    use serde::ser::SerializeMap;
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (key, value) in map {
            out.serialize_entry(key, &STANDARD.encode(value))?;
        }
        out.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, value)| {
                STANDARD
                    .decode(value)
                    .map(|bytes| (key, bytes))
                    .map_err(de::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        #[serde(with = "base64_bytes")]
        blob: Vec<u8>,
        #[serde(with = "base64_map")]
        extra: BTreeMap<String, Vec<u8>>,
    }

    #[test]
    fn test_bytes_written_as_base64() {
        let mut extra = BTreeMap::new();
        extra.insert("iv".to_string(), vec![0xff, 0x00]);
        let sample = Sample {
            blob: b"hi".to_vec(),
            extra,
        };

        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"blob":"aGk=","extra":{"iv":"/wA="}}"#);
        assert_eq!(serde_json::from_str::<Sample>(&json).unwrap(), sample);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("not base64!!").is_err());
    }
}
