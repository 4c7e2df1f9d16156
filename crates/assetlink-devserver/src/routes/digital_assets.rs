//! Digital-asset generation endpoints.
//!
//! Generated files get a millisecond suffix (`qr_<TAG>_<millis>.png`), so
//! generating twice never yields the same URL.

use std::collections::BTreeSet;

use assetlink_core::{
    ArtifactKind, Asset, BarcodeOptions, BulkRequest, DigitalArtifact, NfcPayload, QrOptions,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::error::AppError;
use crate::routes::uploads::upload_url;
use crate::state::{Access, AppState, Upload};

/// 1x1 transparent PNG served in place of rendered symbols.
pub const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/all/{asset_id}", post(generate_all))
        .route("/{kind}/{asset_id}", post(generate_one))
}

/// Options for one generation, defaults where the request gave none.
#[derive(Debug, Default, Clone, Copy)]
struct Options {
    qr: QrOptions,
    barcode: BarcodeOptions,
}

/// POST /api/digital-assets/{qr|barcode|nfc}/{assetId}
async fn generate_one(
    State(state): State<AppState>,
    Path((kind, asset_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    state.authorize(&headers, Access::Generate)?;
    let kind: ArtifactKind = kind
        .parse()
        .map_err(|_| AppError::NotFound(format!("Unknown artifact type '{}'", kind)))?;
    let asset = find(&state, &asset_id).await?;

    let mut options = Options::default();
    match kind {
        ArtifactKind::Qr => options.qr = parse_body(&body)?.unwrap_or_default(),
        ArtifactKind::Barcode => options.barcode = parse_body(&body)?.unwrap_or_default(),
        ArtifactKind::Nfc => {}
    }

    let artifact = produce(&state, &asset, kind, options).await?;
    let mut response = Map::new();
    response.insert("success".to_string(), Value::Bool(true));
    response.insert(kind.response_key().to_string(), to_json(&artifact)?);
    Ok(Json(Value::Object(response)))
}

/// POST /api/digital-assets/all/{assetId}
///
/// Kinds whose generator fails are reported under `errors` instead of
/// failing the whole request.
async fn generate_all(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<BulkRequest>,
) -> Result<Json<Value>, AppError> {
    state.authorize(&headers, Access::Generate)?;
    if request.types.is_empty() {
        return Err(AppError::BadRequest(
            "At least one artifact type is required".to_string(),
        ));
    }
    let asset = find(&state, &asset_id).await?;
    let options = Options {
        qr: request.options.qr.unwrap_or_default(),
        barcode: request.options.barcode.unwrap_or_default(),
    };

    let kinds: BTreeSet<ArtifactKind> = request.types.iter().copied().collect();
    let mut data = Map::new();
    let mut errors = Map::new();
    for kind in kinds {
        match produce(&state, &asset, kind, options).await {
            Ok(artifact) => {
                data.insert(kind.response_key().to_string(), to_json(&artifact)?);
            }
            Err(e @ (AppError::GenerationFailed(_) | AppError::BadRequest(_))) => {
                tracing::warn!(%kind, error = %e, "bulk generation entry failed");
                errors.insert(kind.response_key().to_string(), Value::String(e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }
    if !errors.is_empty() {
        data.insert("errors".to_string(), Value::Object(errors));
    }

    Ok(Json(json!({ "success": true, "data": data })))
}

async fn find(state: &AppState, asset_id: &str) -> Result<Asset, AppError> {
    state
        .find_asset(asset_id)
        .await
        .ok_or_else(|| AppError::NotFound("Asset not found".to_string()))
}

/// Parses an optional JSON body; an empty body means defaults.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<Option<T>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("Invalid options: {}", e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.to_string()))
}

/// Generates one artifact, stores its file and records it on the asset.
async fn produce(
    state: &AppState,
    asset: &Asset,
    kind: ArtifactKind,
    options: Options,
) -> Result<DigitalArtifact, AppError> {
    if state.generator_fails(kind) {
        return Err(AppError::GenerationFailed(format!(
            "{} generator is unavailable",
            kind
        )));
    }

    let id = asset.id.clone().unwrap_or_default();
    let tag = asset.display_tag().to_string();
    let stamp = state.next_stamp();
    let asset_path = format!("/assets/{}", tag);

    let (file, upload, data, short_url) = match kind {
        ArtifactKind::Qr => {
            options
                .qr
                .validate()
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            let data = if options.qr.include_url {
                Value::String(asset_path.clone())
            } else {
                Value::String(tag.clone())
            };
            (
                format!("qr_{}_{}.png", tag, stamp),
                png(),
                data,
                Some(asset_path),
            )
        }
        ArtifactKind::Barcode => {
            options
                .barcode
                .validate()
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            let data = json!({
                "value": tag,
                "format": options.barcode.format,
                "height": options.barcode.height,
                "scale": options.barcode.scale,
            });
            (format!("barcode_{}_{}.png", tag, stamp), png(), data, None)
        }
        ArtifactKind::Nfc => {
            let payload = NfcPayload {
                asset_id: Some(id.clone()),
                tag_id: Some(tag.clone()),
                timestamp: Some(Utc::now().to_rfc3339()),
                checksum: None,
                signature: None,
                fields: nfc_fields(asset, &asset_path),
            }
            .sealed()
            .map_err(|e| AppError::Internal(e.to_string()))?;
            let document = to_json(&payload)?;
            let bytes = serde_json::to_vec_pretty(&json!({ "data": document }))
                .map_err(|e| AppError::Internal(e.to_string()))?;
            let upload = Upload {
                content_type: "application/json",
                bytes,
            };
            (format!("nfc_{}_{}.json", tag, stamp), upload, document, None)
        }
    };

    state.replace_upload(&id, kind, file.clone(), upload).await;
    let artifact = DigitalArtifact {
        url: Some(upload_url(&file)),
        data,
        short_url,
    };
    state.record_artifact(&id, kind, &artifact).await;
    tracing::info!(tag = %tag, %kind, file = %file, "artifact generated");
    Ok(artifact)
}

fn png() -> Upload {
    Upload {
        content_type: "image/png",
        bytes: PLACEHOLDER_PNG.to_vec(),
    }
}

/// Asset metadata written into an NFC payload.
fn nfc_fields(asset: &Asset, asset_path: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    let text = [
        ("type", asset.asset_type.clone()),
        ("brand", asset.brand.clone()),
        ("model", asset.model.clone()),
        ("status", asset.status.clone()),
        ("location", asset.location_label()),
    ];
    for (key, value) in text {
        if let Some(value) = value {
            fields.insert(key.to_string(), Value::String(value));
        }
    }
    fields.insert("url".to_string(), Value::String(asset_path.to_string()));
    fields
}
