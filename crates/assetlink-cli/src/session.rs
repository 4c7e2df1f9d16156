// Scan sessions: raw scanned value -> canonical tag -> asset -> history

use assetlink_core::{resolve_reference, ArtifactKind, Asset, ScanHistory, ScannedAsset};
use chrono::Utc;

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::ClientError;

/// Turns a captured frame into a scanned string, if one is found.
///
/// Only text input is supported: image frames are not decoded.
pub trait FrameDecoder {
    fn detect(&mut self, frame: &[u8]) -> Option<String>;
}

/// Treats the frame as UTF-8 text (manual entry, piped input, keyboard-wedge scanners).
#[derive(Debug, Default)]
pub struct TextFrameDecoder;

impl FrameDecoder for TextFrameDecoder {
    fn detect(&mut self, frame: &[u8]) -> Option<String> {
        let text = std::str::from_utf8(frame).ok()?.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Source of asset metadata for resolved tags.
pub trait AssetDirectory {
    fn lookup(&self, id: &str) -> Result<Asset, ClientError>;
}

impl AssetDirectory for Client {
    fn lookup(&self, id: &str) -> Result<Asset, ClientError> {
        self.get_asset(id)
    }
}

pub struct ScanSession<D: AssetDirectory> {
    directory: D,
    history: ScanHistory,
}

impl<D: AssetDirectory> ScanSession<D> {
    pub fn new(directory: D) -> Self {
        Self {
            directory,
            history: ScanHistory::new(),
        }
    }

    pub fn history(&self) -> &ScanHistory {
        &self.history
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Resolves a scanned value and records it. On failure the history is untouched.
    pub fn scan(&mut self, raw: &str) -> Result<ScannedAsset, ClientError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ClientError::InvalidInput("scanned value is empty".to_string()));
        }
        let tag = resolve_reference(raw);
        if tag.trim().is_empty() {
            return Err(ClientError::InvalidInput(format!(
                "no asset tag found in '{}'",
                raw
            )));
        }

        let asset = self.directory.lookup(&tag)?;
        let entry = ScannedAsset {
            asset,
            scanned_at: Utc::now(),
            artifact_url: raw.to_string(),
        };
        tracing::info!(tag = %tag, "asset scanned");
        self.history.record(entry.clone());
        Ok(entry)
    }

    /// Runs `decoder` on a frame and scans whatever it detects.
    pub fn scan_frame<F: FrameDecoder + ?Sized>(
        &mut self,
        decoder: &mut F,
        frame: &[u8],
    ) -> Result<Option<ScannedAsset>, ClientError> {
        match decoder.detect(frame) {
            Some(raw) => self.scan(&raw).map(Some),
            None => Ok(None),
        }
    }
}

/// Artifact URLs already recorded on the asset (`digitalAssets.<key>.url`), joined with the host.
pub fn stored_artifact_urls(asset: &Asset, config: &ClientConfig) -> Vec<(ArtifactKind, String)> {
    let Some(digital) = asset.digital_assets.as_ref() else {
        return Vec::new();
    };
    ArtifactKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let url = digital
                .get(kind.response_key())
                .and_then(|entry| entry.get("url"))
                .and_then(|url| url.as_str())
                .filter(|url| !url.is_empty())?;
            Some((kind, config.artifact_url(url)))
        })
        .collect()
}
