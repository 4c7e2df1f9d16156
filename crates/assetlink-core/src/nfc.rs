//! NFC payload documents.
//!
//! An NFC artifact is a JSON document carrying a snapshot of the asset,
//! a timestamp, a checksum and a signature. The checksum is the SHA-256 of
//! the RFC 8785 (JCS) canonical form of the document with `checksum` and
//! `signature` removed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// User-visible message when an NFC document cannot be loaded.
pub const NFC_LOAD_FAILED: &str = "Failed to load NFC data";

const CHECKSUM_FIELD: &str = "checksum";
const SIGNATURE_FIELD: &str = "signature";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfcPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Lowercase hex SHA-256, see module docs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Remaining asset metadata (type, brand, location, url...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Result of recomputing an NFC checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumStatus {
    Match,
    Mismatch { expected: String, computed: String },
    /// The document carries no checksum.
    Unverifiable,
}

/// Strips an optional `{ "data": {...} }` envelope from a fetched NFC document.
pub fn unwrap_document(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.get("data").map_or(false, Value::is_object) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

impl NfcPayload {
    /// Parses a fetched document, unwrapping a `data` envelope if present.
    pub fn from_document(body: Value) -> Result<Self, CoreError> {
        let document = unwrap_document(body);
        if !document.is_object() {
            return Err(CoreError::UnknownShape {
                endpoint: "NFC document",
                detail: "expected a JSON object".to_string(),
            });
        }
        serde_json::from_value(document).map_err(|source| CoreError::Payload {
            endpoint: "NFC document",
            source,
        })
    }

    /// Computes the checksum this payload should carry.
    pub fn compute_checksum(&self) -> Result<String, CoreError> {
        let mut value =
            serde_json::to_value(self).map_err(|e| CoreError::Canonicalization(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.remove(CHECKSUM_FIELD);
            map.remove(SIGNATURE_FIELD);
        }
        let canonical =
            serde_jcs::to_string(&value).map_err(|e| CoreError::Canonicalization(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Returns the payload with its checksum filled in.
    pub fn sealed(mut self) -> Result<Self, CoreError> {
        self.checksum = Some(self.compute_checksum()?);
        Ok(self)
    }

    pub fn verify_checksum(&self) -> Result<ChecksumStatus, CoreError> {
        let Some(expected) = self.checksum.as_deref() else {
            return Ok(ChecksumStatus::Unverifiable);
        };
        let computed = self.compute_checksum()?;
        if computed.eq_ignore_ascii_case(expected) {
            Ok(ChecksumStatus::Match)
        } else {
            Ok(ChecksumStatus::Mismatch {
                expected: expected.to_string(),
                computed,
            })
        }
    }

    /// Field/value pairs for display, known fields first, long values abbreviated.
    pub fn display_fields(&self) -> Vec<(String, String)> {
        let mut rows = Vec::new();
        let known = [
            ("Asset ID", &self.asset_id),
            ("Tag", &self.tag_id),
            ("Timestamp", &self.timestamp),
        ];
        for (label, value) in known {
            if let Some(v) = value {
                rows.push((label.to_string(), v.clone()));
            }
        }
        for (key, value) in &self.fields {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rows.push((key.clone(), rendered));
        }
        if let Some(checksum) = &self.checksum {
            rows.push(("Checksum".to_string(), abbreviate(checksum, 12, 8)));
        }
        if let Some(signature) = &self.signature {
            rows.push(("Signature".to_string(), abbreviate(signature, 12, 8)));
        }
        rows
    }
}

/// Shortens long identifiers for display: "first…last".
pub fn abbreviate(value: &str, head: usize, tail: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= head + tail + 3 {
        return value.to_string();
    }
    let prefix: String = chars[..head].iter().collect();
    let suffix: String = chars[chars.len() - tail..].iter().collect();
    format!("{}...{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> NfcPayload {
        NfcPayload::from_document(json!({
            "assetId": "66b0c0ffee",
            "tagId": "ASSET555",
            "timestamp": "2025-08-04T08:33:53Z",
            "brand": "Carrier",
            "location": {"name": "Plant Room 2"}
        }))
        .unwrap()
    }

    #[test]
    fn test_unwrap_data_envelope() {
        let doc = unwrap_document(json!({"data": {"tagId": "ASSET1"}, "success": true}));
        assert_eq!(doc, json!({"tagId": "ASSET1"}));

        let plain = unwrap_document(json!({"tagId": "ASSET1", "data": "raw"}));
        assert_eq!(plain["data"], "raw");
    }

    #[test]
    fn test_from_document_rejects_non_object() {
        assert!(NfcPayload::from_document(json!(["a"])).is_err());
        assert!(NfcPayload::from_document(json!({"data": {"tagId": "A"}})).is_ok());
    }

    #[test]
    fn test_sealed_payload_verifies() {
        let sealed = sample().sealed().unwrap();
        assert_eq!(sealed.checksum.as_ref().map(String::len), Some(64));
        assert_eq!(sealed.verify_checksum().unwrap(), ChecksumStatus::Match);
    }

    #[test]
    fn test_checksum_ignores_signature_and_key_order() {
        let mut sealed = sample().sealed().unwrap();
        sealed.signature = Some("c2lnbmF0dXJl".to_string());
        assert_eq!(sealed.verify_checksum().unwrap(), ChecksumStatus::Match);

        let reordered: NfcPayload = serde_json::from_str(&format!(
            r#"{{"location": {{"name": "Plant Room 2"}}, "brand": "Carrier",
                "timestamp": "2025-08-04T08:33:53Z", "tagId": "ASSET555",
                "assetId": "66b0c0ffee", "checksum": "{}"}}"#,
            sealed.checksum.clone().unwrap()
        ))
        .unwrap();
        assert_eq!(reordered.verify_checksum().unwrap(), ChecksumStatus::Match);
    }

    #[test]
    fn test_tampered_payload_mismatches() {
        let mut sealed = sample().sealed().unwrap();
        sealed.fields.insert("brand".to_string(), json!("Trane"));
        assert!(matches!(
            sealed.verify_checksum().unwrap(),
            ChecksumStatus::Mismatch { .. }
        ));
    }

    #[test]
    fn test_missing_checksum_is_unverifiable() {
        assert_eq!(sample().verify_checksum().unwrap(), ChecksumStatus::Unverifiable);
    }

    #[test]
    fn test_display_fields_abbreviate_checksum() {
        let sealed = sample().sealed().unwrap();
        let rows = sealed.display_fields();
        assert_eq!(rows[0], ("Asset ID".to_string(), "66b0c0ffee".to_string()));
        let checksum_row = rows.iter().find(|(k, _)| k == "Checksum").unwrap();
        assert!(checksum_row.1.contains("..."));
        assert!(rows.iter().any(|(k, v)| k == "location" && v.contains("Plant Room 2")));
    }

    #[test]
    fn test_abbreviate_short_values_unchanged() {
        assert_eq!(abbreviate("short", 4, 4), "short");
        assert_eq!(abbreviate("0123456789abcdefghij", 4, 4), "0123...ghij");
    }
}
