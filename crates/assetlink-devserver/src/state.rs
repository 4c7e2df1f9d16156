//! Shared in-memory state: assets, generated uploads and access tokens.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use assetlink_core::{ArtifactKind, Asset, DigitalArtifact};
use axum::http::{header, HeaderMap};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::config::DevServerConfig;
use crate::error::AppError;

/// A stored file under `/uploads/digital-assets/`.
#[derive(Debug, Clone)]
pub struct Upload {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// What a request is about to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Generate,
}

/// Stored files plus the current file name per (asset, kind).
#[derive(Default)]
struct Uploads {
    files: HashMap<String, Upload>,
    current: HashMap<(String, ArtifactKind), String>,
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Shared>,
}

struct Shared {
    token: String,
    read_only_token: Option<String>,
    fail_kinds: BTreeSet<ArtifactKind>,
    assets: RwLock<Vec<Asset>>,
    uploads: RwLock<Uploads>,
    last_stamp: AtomicI64,
}

impl AppState {
    pub fn new(config: &DevServerConfig) -> Self {
        Self {
            inner: Arc::new(Shared {
                token: config.token.clone(),
                read_only_token: config.read_only_token.clone(),
                fail_kinds: config.fail_kinds.clone(),
                assets: RwLock::new(config.assets.clone()),
                uploads: RwLock::new(Uploads::default()),
                last_stamp: AtomicI64::new(0),
            }),
        }
    }

    /// Checks the bearer token for the requested access.
    pub fn authorize(&self, headers: &HeaderMap, access: Access) -> Result<(), AppError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(AppError::Unauthorized)?;

        if token == self.inner.token {
            return Ok(());
        }
        if self.inner.read_only_token.as_deref() == Some(token) {
            return match access {
                Access::Read => Ok(()),
                Access::Generate => Err(AppError::Forbidden(
                    "This token may not generate digital assets".to_string(),
                )),
            };
        }
        Err(AppError::Unauthorized)
    }

    pub fn generator_fails(&self, kind: ArtifactKind) -> bool {
        self.inner.fail_kinds.contains(&kind)
    }

    /// Millisecond timestamp, strictly increasing across calls.
    pub fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .inner
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    pub async fn assets(&self) -> Vec<Asset> {
        self.inner.assets.read().await.clone()
    }

    /// Finds an asset by internal id or tag.
    pub async fn find_asset(&self, id: &str) -> Option<Asset> {
        self.inner
            .assets
            .read()
            .await
            .iter()
            .find(|a| matches_id(a, id))
            .cloned()
    }

    /// Records a generated artifact under the asset's `digitalAssets` entry.
    pub async fn record_artifact(&self, id: &str, kind: ArtifactKind, artifact: &DigitalArtifact) {
        let mut assets = self.inner.assets.write().await;
        let Some(asset) = assets.iter_mut().find(|a| matches_id(a, id)) else {
            return;
        };
        let digital = asset.digital_assets.get_or_insert_with(|| json!({}));
        if !digital.is_object() {
            *digital = json!({});
        }
        if let Value::Object(map) = digital {
            map.insert(
                kind.response_key().to_string(),
                json!({
                    "url": artifact.url,
                    "data": artifact.data,
                    "generatedAt": Utc::now().to_rfc3339(),
                }),
            );
        }
    }

    /// Stores the newest file of `kind` for asset `id`. The file it
    /// supersedes is dropped and its URL answers 404 from then on.
    pub async fn replace_upload(&self, id: &str, kind: ArtifactKind, name: String, upload: Upload) {
        let mut uploads = self.inner.uploads.write().await;
        uploads.files.insert(name.clone(), upload);
        if let Some(previous) = uploads.current.insert((id.to_string(), kind), name) {
            uploads.files.remove(&previous);
            tracing::debug!(file = %previous, "superseded upload dropped");
        }
    }

    pub async fn upload(&self, name: &str) -> Option<Upload> {
        self.inner.uploads.read().await.files.get(name).cloned()
    }
}

fn matches_id(asset: &Asset, id: &str) -> bool {
    asset.id.as_deref() == Some(id) || asset.tag_id.as_deref() == Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_stamps_strictly_increase() {
        let state = AppState::new(&DevServerConfig::default());
        let mut last = state.next_stamp();
        for _ in 0..1000 {
            let next = state.next_stamp();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_authorize() {
        let config = DevServerConfig {
            read_only_token: Some("viewer".to_string()),
            ..DevServerConfig::default()
        };
        let state = AppState::new(&config);

        assert!(state.authorize(&headers("dev-token"), Access::Generate).is_ok());
        assert!(state.authorize(&headers("viewer"), Access::Read).is_ok());
        assert!(matches!(
            state.authorize(&headers("viewer"), Access::Generate),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            state.authorize(&headers("wrong"), Access::Read),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            state.authorize(&HeaderMap::new(), Access::Read),
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_regeneration_drops_superseded_upload() {
        let state = AppState::new(&DevServerConfig::default());
        let upload = || Upload {
            content_type: "image/png",
            bytes: vec![1, 2, 3],
        };

        state
            .replace_upload("a1", ArtifactKind::Qr, "qr_A_1.png".to_string(), upload())
            .await;
        state
            .replace_upload("a1", ArtifactKind::Barcode, "barcode_A_1.png".to_string(), upload())
            .await;
        state
            .replace_upload("a1", ArtifactKind::Qr, "qr_A_2.png".to_string(), upload())
            .await;

        assert!(state.upload("qr_A_1.png").await.is_none());
        assert!(state.upload("qr_A_2.png").await.is_some());
        assert!(state.upload("barcode_A_1.png").await.is_some());
    }

    #[tokio::test]
    async fn test_find_by_id_or_tag() {
        let state = AppState::new(&DevServerConfig::default());
        let by_tag = state.find_asset("ASSET555").await.unwrap();
        let by_id = state.find_asset(by_tag.id.as_deref().unwrap()).await.unwrap();
        assert_eq!(by_tag, by_id);
        assert!(state.find_asset("ASSET999").await.is_none());
    }
}
