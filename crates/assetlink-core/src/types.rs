//! Type definitions for assets and their digital artifacts.
//!
//! Field names follow the backend's JSON contract (camelCase, `_id` for the
//! internal identifier). Unknown asset fields are preserved so that a
//! read-through display never loses data the backend sent.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// The three kinds of artifact the backend can generate for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Qr,
    Barcode,
    Nfc,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::Qr, ArtifactKind::Barcode, ArtifactKind::Nfc];

    /// Key under which the backend returns this artifact (`qrCode`, `barcode`, `nfcData`).
    pub fn response_key(&self) -> &'static str {
        match self {
            ArtifactKind::Qr => "qrCode",
            ArtifactKind::Barcode => "barcode",
            ArtifactKind::Nfc => "nfcData",
        }
    }

    /// Path segment used by the generation endpoints and the bulk `types` list.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Qr => "qr",
            ArtifactKind::Barcode => "barcode",
            ArtifactKind::Nfc => "nfc",
        }
    }

    /// Whether the artifact is an image (QR, barcode) rather than a JSON document.
    pub fn is_image(&self) -> bool {
        !matches!(self, ArtifactKind::Nfc)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qr" | "qrcode" => Ok(ArtifactKind::Qr),
            "barcode" => Ok(ArtifactKind::Barcode),
            "nfc" | "nfcdata" => Ok(ArtifactKind::Nfc),
            other => Err(CoreError::InvalidOption(format!(
                "unknown artifact type '{}' (expected qr, barcode or nfc)",
                other
            ))),
        }
    }
}

/// Asset metadata as owned by the backend. Never mutated locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Backend internal identifier.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Human-readable tag, e.g. `ASSET555`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Free-form location: a plain string or a structured object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Value>,
    /// Sub-document describing previously generated artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_assets: Option<Value>,
    /// Any other fields the backend sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Asset {
    /// Tag shown to users, falling back to the internal id.
    pub fn display_tag(&self) -> &str {
        self.tag_id
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("(untagged)")
    }

    /// Renders a location value (string or object) as a single line.
    pub fn location_label(&self) -> Option<String> {
        self.location.as_ref().map(value_label)
    }

    pub fn project_label(&self) -> Option<String> {
        self.project.as_ref().map(value_label)
    }
}

/// Flattens a JSON value into a short human-readable label.
fn value_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            for key in ["name", "address", "building", "title"] {
                if let Some(Value::String(s)) = map.get(key) {
                    return s.clone();
                }
            }
            value.to_string()
        }
        other => other.to_string(),
    }
}

/// One generated artifact: its location and the encoded payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitalArtifact {
    /// Host-relative path as returned by the backend, or an absolute URL once joined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// The encoded payload: a tag string or small object for QR/barcode, a
    /// JSON document for NFC.
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_url: Option<String>,
}

/// QR generation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrOptions {
    /// Edge length in pixels.
    pub size: u32,
    /// Encode a link to the asset page rather than the bare tag.
    pub include_url: bool,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            size: 300,
            include_url: true,
        }
    }
}

impl QrOptions {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(32..=2048).contains(&self.size) {
            return Err(CoreError::InvalidOption(format!(
                "QR size must be between 32 and 2048 pixels, got {}",
                self.size
            )));
        }
        Ok(())
    }
}

/// Barcode symbologies accepted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarcodeFormat {
    Code128,
    Code39,
    Ean13,
    Ean8,
    Upca,
    Upce,
}

impl BarcodeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarcodeFormat::Code128 => "code128",
            BarcodeFormat::Code39 => "code39",
            BarcodeFormat::Ean13 => "ean13",
            BarcodeFormat::Ean8 => "ean8",
            BarcodeFormat::Upca => "upca",
            BarcodeFormat::Upce => "upce",
        }
    }
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for BarcodeFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "code128" => Ok(BarcodeFormat::Code128),
            "code39" => Ok(BarcodeFormat::Code39),
            "ean13" => Ok(BarcodeFormat::Ean13),
            "ean8" => Ok(BarcodeFormat::Ean8),
            "upca" => Ok(BarcodeFormat::Upca),
            "upce" => Ok(BarcodeFormat::Upce),
            other => Err(CoreError::InvalidOption(format!(
                "unsupported barcode format '{}'",
                other
            ))),
        }
    }
}

/// Barcode generation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarcodeOptions {
    pub format: BarcodeFormat,
    /// Bar height in millimetres.
    pub height: u32,
    /// Module scale factor.
    pub scale: u32,
}

impl Default for BarcodeOptions {
    fn default() -> Self {
        Self {
            format: BarcodeFormat::Code128,
            height: 10,
            scale: 3,
        }
    }
}

impl BarcodeOptions {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.height == 0 {
            return Err(CoreError::InvalidOption(
                "barcode height must be positive".to_string(),
            ));
        }
        if !(1..=10).contains(&self.scale) {
            return Err(CoreError::InvalidOption(format!(
                "barcode scale must be between 1 and 10, got {}",
                self.scale
            )));
        }
        Ok(())
    }
}

/// Per-kind options carried by a bulk generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<QrOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<BarcodeOptions>,
}

/// Body of `POST /digital-assets/all/{assetId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkRequest {
    pub types: Vec<ArtifactKind>,
    #[serde(default)]
    pub options: BulkOptions,
}

impl BulkRequest {
    /// Requests every artifact kind with default options.
    pub fn all() -> Self {
        Self {
            types: ArtifactKind::ALL.to_vec(),
            options: BulkOptions {
                qr: Some(QrOptions::default()),
                barcode: Some(BarcodeOptions::default()),
            },
        }
    }

    pub fn requests(&self, kind: ArtifactKind) -> bool {
        self.types.contains(&kind)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.types.is_empty() {
            return Err(CoreError::InvalidOption(
                "bulk generation needs at least one artifact type".to_string(),
            ));
        }
        if let Some(qr) = &self.options.qr {
            qr.validate()?;
        }
        if let Some(barcode) = &self.options.barcode {
            barcode.validate()?;
        }
        Ok(())
    }
}

/// Outcome of one artifact kind within a bulk generation.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactStatus {
    Succeeded(DigitalArtifact),
    /// The backend reported an explicit error for this kind.
    Failed(String),
    NotRequested,
    /// Requested, but the backend returned neither the artifact nor an error.
    NotReturned,
}

impl ArtifactStatus {
    pub fn artifact(&self) -> Option<&DigitalArtifact> {
        match self {
            ArtifactStatus::Succeeded(artifact) => Some(artifact),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ArtifactStatus::Succeeded(_) => "succeeded",
            ArtifactStatus::Failed(_) => "failed",
            ArtifactStatus::NotRequested => "not requested",
            ArtifactStatus::NotReturned => "not returned",
        }
    }
}

/// Decoded result of a bulk generation, one status per kind.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOutcome {
    pub qr: ArtifactStatus,
    pub barcode: ArtifactStatus,
    pub nfc: ArtifactStatus,
}

impl BulkOutcome {
    pub fn get(&self, kind: ArtifactKind) -> &ArtifactStatus {
        match kind {
            ArtifactKind::Qr => &self.qr,
            ArtifactKind::Barcode => &self.barcode,
            ArtifactKind::Nfc => &self.nfc,
        }
    }

    pub fn get_mut(&mut self, kind: ArtifactKind) -> &mut ArtifactStatus {
        match kind {
            ArtifactKind::Qr => &mut self.qr,
            ArtifactKind::Barcode => &mut self.barcode,
            ArtifactKind::Nfc => &mut self.nfc,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArtifactKind, &ArtifactStatus)> {
        ArtifactKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    pub fn succeeded_count(&self) -> usize {
        self.iter()
            .filter(|(_, s)| matches!(s, ArtifactStatus::Succeeded(_)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.iter()
            .filter(|(_, s)| matches!(s, ArtifactStatus::Failed(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_deserialization_keeps_unknown_fields() {
        let json = r#"{
            "_id": "66b0c0ffee",
            "tagId": "ASSET555",
            "type": "HVAC",
            "brand": "Carrier",
            "status": "active",
            "location": {"name": "Plant Room 2"},
            "serialNumber": "SN-001"
        }"#;

        let asset: Asset = serde_json::from_str(json).unwrap();
        assert_eq!(asset.id.as_deref(), Some("66b0c0ffee"));
        assert_eq!(asset.tag_id.as_deref(), Some("ASSET555"));
        assert_eq!(asset.asset_type.as_deref(), Some("HVAC"));
        assert_eq!(asset.location_label().as_deref(), Some("Plant Room 2"));
        assert_eq!(asset.extra["serialNumber"], "SN-001");

        let back = serde_json::to_value(&asset).unwrap();
        assert_eq!(back["_id"], "66b0c0ffee");
        assert_eq!(back["serialNumber"], "SN-001");
    }

    #[test]
    fn test_display_tag_falls_back_to_id() {
        let asset = Asset {
            id: Some("abc".to_string()),
            ..Asset::default()
        };
        assert_eq!(asset.display_tag(), "abc");
        assert_eq!(Asset::default().display_tag(), "(untagged)");
    }

    #[test]
    fn test_qr_options_wire_names() {
        let json = serde_json::to_value(QrOptions::default()).unwrap();
        assert_eq!(json, serde_json::json!({"size": 300, "includeUrl": true}));
    }

    #[test]
    fn test_barcode_format_parsing() {
        assert_eq!("EAN13".parse::<BarcodeFormat>().unwrap(), BarcodeFormat::Ean13);
        assert_eq!("upce".parse::<BarcodeFormat>().unwrap(), BarcodeFormat::Upce);
        let err = "qr".parse::<BarcodeFormat>().unwrap_err();
        assert!(err.to_string().contains("unsupported barcode format"));
    }

    #[test]
    fn test_barcode_options_validation() {
        assert!(BarcodeOptions::default().validate().is_ok());
        let zero_height = BarcodeOptions {
            height: 0,
            ..BarcodeOptions::default()
        };
        assert!(zero_height.validate().is_err());
        let big_scale = BarcodeOptions {
            scale: 11,
            ..BarcodeOptions::default()
        };
        assert!(big_scale.validate().is_err());
    }

    #[test]
    fn test_bulk_request_serialization() {
        let request = BulkRequest::all();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["types"], serde_json::json!(["qr", "barcode", "nfc"]));
        assert_eq!(json["options"]["qr"]["size"], 300);
        assert_eq!(json["options"]["barcode"]["format"], "code128");
    }

    #[test]
    fn test_bulk_request_rejects_empty_types() {
        let request = BulkRequest {
            types: vec![],
            options: BulkOptions::default(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_artifact_kind_parsing() {
        assert_eq!("qrCode".parse::<ArtifactKind>().unwrap(), ArtifactKind::Qr);
        assert_eq!("NFC".parse::<ArtifactKind>().unwrap(), ArtifactKind::Nfc);
        assert!("rfid".parse::<ArtifactKind>().is_err());
    }
}
