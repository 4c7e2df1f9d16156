//! Response envelope decoding.
//!
//! The backend wraps payloads inconsistently across endpoints. Each endpoint
//! gets one decoder that classifies the body into a known shape and fails
//! with [`CoreError::UnknownShape`] when none matches.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CoreError;
use crate::types::{ArtifactKind, ArtifactStatus, Asset, BulkOutcome, DigitalArtifact};

const ASSET_ENDPOINT: &str = "asset lookup";
const ASSET_LIST_ENDPOINT: &str = "asset list";
const BULK_ENDPOINT: &str = "bulk generation";

/// Known shapes of the asset-list response.
#[derive(Debug, PartialEq)]
enum AssetListShape<'a> {
    /// `{ "success": true, "assets": [...] }` or `{ "assets": [...] }`
    Assets(&'a Value),
    /// `[...]`
    Bare(&'a Value),
    /// `{ "data": [...] }` or `{ "data": { "assets": [...] } }`
    Data(&'a Value),
    /// `{ "success": false, "message": "..." }`
    Rejected(String),
}

/// Known shapes of the single-asset response.
#[derive(Debug, PartialEq)]
enum AssetShape<'a> {
    /// `{ "asset": {...} }`
    Asset(&'a Value),
    /// `{ "data": { "asset": {...} } }`
    NestedAsset(&'a Value),
    /// `{ "success": true, "data": {...} }`
    Data(&'a Value),
    Rejected(String),
}

fn rejection(body: &Value) -> Option<String> {
    match body.get("success") {
        Some(Value::Bool(false)) => Some(
            body.get("message")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("no reason given")
                .to_string(),
        ),
        _ => None,
    }
}

fn classify_asset_list(body: &Value) -> Option<AssetListShape<'_>> {
    if body.is_array() {
        return Some(AssetListShape::Bare(body));
    }
    if let Some(message) = rejection(body) {
        return Some(AssetListShape::Rejected(message));
    }
    if let Some(assets) = body.get("assets").filter(|v| v.is_array()) {
        return Some(AssetListShape::Assets(assets));
    }
    match body.get("data") {
        Some(data) if data.is_array() => Some(AssetListShape::Data(data)),
        Some(data) => data
            .get("assets")
            .filter(|v| v.is_array())
            .map(AssetListShape::Data),
        None => None,
    }
}

fn classify_asset(body: &Value) -> Option<AssetShape<'_>> {
    if let Some(message) = rejection(body) {
        return Some(AssetShape::Rejected(message));
    }
    if let Some(asset) = body.get("asset").filter(|v| v.is_object()) {
        return Some(AssetShape::Asset(asset));
    }
    let data = body.get("data").filter(|v| v.is_object())?;
    if let Some(asset) = data.get("asset").filter(|v| v.is_object()) {
        return Some(AssetShape::NestedAsset(asset));
    }
    if data.get("_id").is_some() || data.get("tagId").is_some() {
        return Some(AssetShape::Data(data));
    }
    None
}

fn payload<T: DeserializeOwned>(endpoint: &'static str, value: &Value) -> Result<T, CoreError> {
    T::deserialize(value).map_err(|source| CoreError::Payload { endpoint, source })
}

/// Short description of a body for diagnostics, without echoing large payloads.
fn describe(body: &Value) -> String {
    match body {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
        Value::Array(items) => format!("array of {} items", items.len()),
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
    }
}

/// Decodes the body of `GET /assets/{id}`.
pub fn decode_asset(body: &Value) -> Result<Asset, CoreError> {
    match classify_asset(body) {
        Some(AssetShape::Asset(v))
        | Some(AssetShape::NestedAsset(v))
        | Some(AssetShape::Data(v)) => payload(ASSET_ENDPOINT, v),
        Some(AssetShape::Rejected(message)) => Err(CoreError::Rejected {
            endpoint: ASSET_ENDPOINT,
            message,
        }),
        None => Err(CoreError::UnknownShape {
            endpoint: ASSET_ENDPOINT,
            detail: describe(body),
        }),
    }
}

/// Decodes the body of `GET /assets`.
pub fn decode_asset_list(body: &Value) -> Result<Vec<Asset>, CoreError> {
    match classify_asset_list(body) {
        Some(AssetListShape::Assets(v))
        | Some(AssetListShape::Bare(v))
        | Some(AssetListShape::Data(v)) => payload(ASSET_LIST_ENDPOINT, v),
        Some(AssetListShape::Rejected(message)) => Err(CoreError::Rejected {
            endpoint: ASSET_LIST_ENDPOINT,
            message,
        }),
        None => Err(CoreError::UnknownShape {
            endpoint: ASSET_LIST_ENDPOINT,
            detail: describe(body),
        }),
    }
}

fn endpoint_name(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Qr => "QR generation",
        ArtifactKind::Barcode => "barcode generation",
        ArtifactKind::Nfc => "NFC generation",
    }
}

/// Member `key` of `value`, treating an explicit `null` as absent.
fn present<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|v| !v.is_null())
}

/// Finds the object holding the artifact keys: the body itself or its `data` member.
fn artifact_container(body: &Value) -> &Value {
    let has_artifact_key = |v: &Value| {
        ArtifactKind::ALL
            .iter()
            .any(|k| present(v, k.response_key()).is_some())
            || present(v, "errors").is_some()
    };
    match body.get("data") {
        Some(data) if !has_artifact_key(body) && has_artifact_key(data) => data,
        _ => body,
    }
}

fn artifact_from(kind: ArtifactKind, value: &Value) -> Result<DigitalArtifact, CoreError> {
    let endpoint = endpoint_name(kind);
    let artifact: DigitalArtifact = payload(endpoint, value)?;
    if kind.is_image() && artifact.url.as_deref().map_or(true, str::is_empty) {
        return Err(CoreError::UnknownShape {
            endpoint,
            detail: "artifact has no url".to_string(),
        });
    }
    Ok(artifact)
}

/// Decodes the body of `POST /digital-assets/{kind}/{assetId}`.
///
/// Accepts `{ "<key>": {...} }` and the same wrapped in `data`.
/// QR and barcode artifacts must carry a `url`.
pub fn decode_artifact(kind: ArtifactKind, body: &Value) -> Result<DigitalArtifact, CoreError> {
    let endpoint = endpoint_name(kind);
    if let Some(message) = rejection(body) {
        return Err(CoreError::Rejected { endpoint, message });
    }
    match artifact_container(body).get(kind.response_key()) {
        Some(value) if value.is_object() => artifact_from(kind, value),
        _ => Err(CoreError::UnknownShape {
            endpoint,
            detail: describe(body),
        }),
    }
}

/// Decodes the body of `POST /digital-assets/all/{assetId}` into one status per kind.
///
/// A kind listed under `errors` is `Failed`; a requested kind with neither an
/// artifact nor an error is `NotReturned`. A body carrying none of the
/// artifact keys and no `errors` map is rejected as unknown.
pub fn decode_bulk(requested: &[ArtifactKind], body: &Value) -> Result<BulkOutcome, CoreError> {
    if let Some(message) = rejection(body) {
        return Err(CoreError::Rejected {
            endpoint: BULK_ENDPOINT,
            message,
        });
    }

    let container = artifact_container(body);
    let errors = present(container, "errors");
    let any_artifact = ArtifactKind::ALL
        .iter()
        .any(|k| present(container, k.response_key()).is_some());
    if !container.is_object() || (!any_artifact && errors.is_none()) {
        return Err(CoreError::UnknownShape {
            endpoint: BULK_ENDPOINT,
            detail: describe(body),
        });
    }

    let mut outcome = BulkOutcome {
        qr: ArtifactStatus::NotRequested,
        barcode: ArtifactStatus::NotRequested,
        nfc: ArtifactStatus::NotRequested,
    };

    for kind in requested {
        let reported_error = errors.and_then(|e| {
            present(e, kind.response_key())
                .or_else(|| present(e, kind.as_str()))
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
        });

        let status = match (present(container, kind.response_key()), reported_error) {
            (_, Some(message)) => ArtifactStatus::Failed(message),
            (Some(value), None) => match artifact_from(*kind, value) {
                Ok(artifact) => ArtifactStatus::Succeeded(artifact),
                Err(e) => ArtifactStatus::Failed(e.to_string()),
            },
            (None, None) => ArtifactStatus::NotReturned,
        };
        *outcome.get_mut(*kind) = status;
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn asset_json(tag: &str) -> Value {
        json!({"_id": format!("id-{}", tag), "tagId": tag, "status": "active"})
    }

    #[test]
    fn test_asset_list_shapes() {
        let list = json!([asset_json("A1"), asset_json("A2")]);
        let shapes = [
            json!({"success": true, "assets": list}),
            json!({"assets": list}),
            list.clone(),
            json!({"data": list}),
            json!({"data": {"assets": list}}),
        ];
        for body in shapes {
            let assets = decode_asset_list(&body).unwrap();
            assert_eq!(assets.len(), 2, "body: {}", body);
            assert_eq!(assets[1].tag_id.as_deref(), Some("A2"));
        }
    }

    #[test]
    fn test_asset_list_unknown_shape_fails() {
        let err = decode_asset_list(&json!({"items": []})).unwrap_err();
        assert!(matches!(err, CoreError::UnknownShape { .. }));
        assert!(err.to_string().contains("keys [items]"));
    }

    #[test]
    fn test_asset_list_rejection_carries_message() {
        let err = decode_asset_list(&json!({"success": false, "message": "Token expired"}))
            .unwrap_err();
        assert!(err.to_string().contains("Token expired"));
    }

    #[test]
    fn test_asset_shapes() {
        let shapes = [
            json!({"asset": asset_json("ASSET555")}),
            json!({"data": {"asset": asset_json("ASSET555")}}),
            json!({"success": true, "data": asset_json("ASSET555")}),
        ];
        for body in shapes {
            let asset = decode_asset(&body).unwrap();
            assert_eq!(asset.tag_id.as_deref(), Some("ASSET555"));
        }
    }

    #[test]
    fn test_asset_unknown_shape_fails() {
        assert!(decode_asset(&json!({"tagId": "ASSET555"})).is_err());
        assert!(decode_asset(&json!([])).is_err());
    }

    #[test]
    fn test_decode_qr_artifact() {
        let body = json!({
            "qrCode": {
                "data": {"tagId": "ASSET555"},
                "url": "/uploads/digital-assets/qr_ASSET555_1754296433008.png",
                "shortUrl": "http://s.example/abc"
            }
        });
        let artifact = decode_artifact(ArtifactKind::Qr, &body).unwrap();
        assert_eq!(
            artifact.url.as_deref(),
            Some("/uploads/digital-assets/qr_ASSET555_1754296433008.png")
        );
        assert_eq!(artifact.short_url.as_deref(), Some("http://s.example/abc"));
    }

    #[test]
    fn test_decode_artifact_wrapped_in_data() {
        let body = json!({
            "success": true,
            "data": {"barcode": {"data": "ASSET1", "url": "/b.png"}}
        });
        let artifact = decode_artifact(ArtifactKind::Barcode, &body).unwrap();
        assert_eq!(artifact.data, json!("ASSET1"));
    }

    #[test]
    fn test_image_artifact_requires_url() {
        let body = json!({"qrCode": {"data": "ASSET1"}});
        let err = decode_artifact(ArtifactKind::Qr, &body).unwrap_err();
        assert!(err.to_string().contains("no url"));
    }

    #[test]
    fn test_nfc_artifact_without_url() {
        let body = json!({"nfcData": {"data": {"tagId": "ASSET1", "checksum": "abc"}}});
        let artifact = decode_artifact(ArtifactKind::Nfc, &body).unwrap();
        assert!(artifact.url.is_none());
        assert_eq!(artifact.data["tagId"], "ASSET1");
    }

    #[test]
    fn test_artifact_for_wrong_kind_is_unknown() {
        let body = json!({"barcode": {"data": "x", "url": "/b.png"}});
        assert!(matches!(
            decode_artifact(ArtifactKind::Qr, &body),
            Err(CoreError::UnknownShape { .. })
        ));
    }

    #[test]
    fn test_bulk_partial_result() {
        let body = json!({
            "qrCode": {"data": "ASSET1", "url": "/q.png"},
            "barcode": {"data": "ASSET1", "url": "/b.png"}
        });
        let outcome = decode_bulk(&ArtifactKind::ALL, &body).unwrap();
        assert_eq!(outcome.succeeded_count(), 2);
        assert_eq!(outcome.failed_count(), 0);
        assert_eq!(outcome.nfc, ArtifactStatus::NotReturned);
    }

    #[test]
    fn test_bulk_null_entries_are_not_returned() {
        let body = json!({
            "qrCode": {"data": "ASSET1", "url": "/q.png"},
            "barcode": {"data": "ASSET1", "url": "/b.png"},
            "nfcData": null,
            "errors": {"qrCode": null}
        });
        let outcome = decode_bulk(&ArtifactKind::ALL, &body).unwrap();
        assert_eq!(outcome.succeeded_count(), 2);
        assert_eq!(outcome.failed_count(), 0);
        assert_eq!(outcome.nfc, ArtifactStatus::NotReturned);

        let err = decode_bulk(&ArtifactKind::ALL, &json!({"qrCode": null})).unwrap_err();
        assert!(matches!(err, CoreError::UnknownShape { .. }));
    }

    #[test]
    fn test_bulk_explicit_errors_and_unrequested() {
        let body = json!({
            "data": {
                "qrCode": {"data": "ASSET1", "url": "/q.png"},
                "errors": {"nfcData": "NFC writer offline"}
            }
        });
        let requested = [ArtifactKind::Qr, ArtifactKind::Nfc];
        let outcome = decode_bulk(&requested, &body).unwrap();
        assert!(outcome.qr.artifact().is_some());
        assert_eq!(outcome.barcode, ArtifactStatus::NotRequested);
        assert_eq!(
            outcome.nfc,
            ArtifactStatus::Failed("NFC writer offline".to_string())
        );
    }

    #[test]
    fn test_bulk_malformed_entry_is_failed() {
        let body = json!({"qrCode": {"data": "ASSET1"}});
        let outcome = decode_bulk(&[ArtifactKind::Qr], &body).unwrap();
        assert!(matches!(outcome.qr, ArtifactStatus::Failed(_)));
    }

    #[test]
    fn test_bulk_unknown_shape() {
        let err = decode_bulk(&ArtifactKind::ALL, &json!({"ok": true})).unwrap_err();
        assert!(matches!(err, CoreError::UnknownShape { .. }));
    }
}
