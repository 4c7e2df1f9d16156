//! Artifact loading over HTTP.
//!
//! [`ArtifactPanel`] is the view that shows one asset's artifacts: an
//! [`ArtifactLoader`] per image kind plus the NFC document state, all bound
//! to one [`ViewScope`]. Unmounting the panel discards late completions and
//! releases every blob handle it holds.

use std::collections::BTreeMap;
use std::io::Read;
use std::time::{Duration, Instant};

use assetlink_core::{
    ArtifactKind, ArtifactLoader, Blob, BlobRegistry, NfcPayload, ViewScope, NFC_LOAD_FAILED,
};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::credentials::TokenSource;

/// Upper bound on a downloaded artifact body.
const MAX_ARTIFACT_BYTES: u64 = 10 * 1024 * 1024;

const PREVIEW_PANICKED: &str = "preview load aborted unexpectedly";

/// How artifacts are fetched. The loader state machine is transport-agnostic.
pub trait ArtifactTransport {
    /// Direct image load: must produce bytes of a recognisable image.
    fn load_image(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, String>;

    /// Fallback: raw bytes of whatever the URL serves.
    fn fetch_blob(&self, url: &str, timeout: Duration) -> Result<Blob, String>;

    fn fetch_json(&self, url: &str, timeout: Duration) -> Result<Value, String>;
}

/// Identifies image bytes by signature and returns their MIME type.
pub fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]);
    let head = head.trim_start();
    if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
        return Some("image/svg+xml");
    }
    None
}

/// Fetches artifacts over HTTP. The bearer token is attached only to URLs
/// on the configured API host; artifacts stored elsewhere are fetched
/// without credentials.
pub struct HttpTransport {
    agent: ureq::Agent,
    config: ClientConfig,
    tokens: TokenSource,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig, tokens: TokenSource) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.artifact_timeout)
            .build();
        Self {
            agent,
            config: config.clone(),
            tokens,
        }
    }

    fn get(&self, url: &str, accept: &str, timeout: Duration) -> Result<ureq::Response, String> {
        let mut request = self.agent.get(url).timeout(timeout).set("Accept", accept);
        if self.config.is_same_origin(url) {
            if let Ok(token) = self.tokens.token() {
                request = request.set("Authorization", &format!("Bearer {}", token));
            }
        } else {
            tracing::debug!(url, "foreign artifact host, sending no credentials");
        }
        request.call().map_err(|e| match e {
            ureq::Error::Status(status, _) => format!("HTTP {}", status),
            ureq::Error::Transport(t) => t.to_string(),
        })
    }
}

fn read_body(response: ureq::Response) -> Result<(Option<String>, Vec<u8>), String> {
    let content_type = response
        .header("Content-Type")
        .map(|_| response.content_type().to_string());
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_ARTIFACT_BYTES)
        .read_to_end(&mut bytes)
        .map_err(|e| format!("failed to read body: {}", e))?;
    Ok((content_type, bytes))
}

impl ArtifactTransport for HttpTransport {
    fn load_image(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, String> {
        let (content_type, bytes) = read_body(self.get(url, "image/*", timeout)?)?;
        if let Some(ct) = content_type.as_deref() {
            if !ct.starts_with("image/") {
                return Err(format!("not an image (content-type {})", ct));
            }
        }
        if sniff_image(&bytes).is_none() {
            return Err("response is not a renderable image".to_string());
        }
        Ok(bytes)
    }

    fn fetch_blob(&self, url: &str, timeout: Duration) -> Result<Blob, String> {
        let (content_type, bytes) = read_body(self.get(url, "*/*", timeout)?)?;
        if bytes.is_empty() {
            return Err("empty response".to_string());
        }
        let content_type = content_type.or_else(|| sniff_image(&bytes).map(str::to_string));
        Ok(Blob {
            bytes,
            content_type,
        })
    }

    fn fetch_json(&self, url: &str, timeout: Duration) -> Result<Value, String> {
        self.get(url, "application/json", timeout)?
            .into_json::<Value>()
            .map_err(|e| format!("invalid JSON: {}", e))
    }
}

/// Runs one image load through native load, fallback and deadline.
pub fn drive_image_load<T: ArtifactTransport + ?Sized>(
    loader: &mut ArtifactLoader,
    transport: &T,
    url: &str,
) {
    loader.set_url(url, Instant::now());

    let Some(remaining) = loader.remaining(Instant::now()) else {
        return;
    };
    let native = transport.load_image(url, remaining);
    if loader.check_deadline(Instant::now()) {
        return;
    }
    let error = match native {
        Ok(bytes) => {
            loader.native_loaded(url, bytes);
            return;
        }
        Err(error) => error,
    };

    if !loader.native_failed(url, error) {
        return;
    }
    let Some(remaining) = loader.remaining(Instant::now()) else {
        return;
    };
    let fallback = transport.fetch_blob(url, remaining);
    if loader.check_deadline(Instant::now()) {
        return;
    }
    match fallback {
        Ok(blob) => {
            loader.fallback_loaded(url, blob);
        }
        Err(error) => {
            loader.fallback_failed(url, error);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NfcLoadState {
    Idle,
    Loading { url: String },
    Loaded(NfcPayload),
    Failed {
        url: String,
        message: String,
        detail: String,
    },
}

/// The artifacts shown for one asset.
#[derive(Debug)]
pub struct ArtifactPanel {
    scope: ViewScope,
    registry: BlobRegistry,
    timeout: Duration,
    images: BTreeMap<ArtifactKind, ArtifactLoader>,
    nfc: NfcLoadState,
}

impl ArtifactPanel {
    pub fn new(timeout: Duration) -> Self {
        Self {
            scope: ViewScope::new(),
            registry: BlobRegistry::new(),
            timeout,
            images: BTreeMap::new(),
            nfc: NfcLoadState::Idle,
        }
    }

    /// Handle that can unmount the panel from elsewhere.
    pub fn scope(&self) -> ViewScope {
        self.scope.clone()
    }

    pub fn registry(&self) -> &BlobRegistry {
        &self.registry
    }

    pub fn image(&self, kind: ArtifactKind) -> Option<&ArtifactLoader> {
        self.images.get(&kind)
    }

    pub fn nfc(&self) -> &NfcLoadState {
        &self.nfc
    }

    fn new_loader(&self) -> ArtifactLoader {
        ArtifactLoader::new(self.registry.clone(), self.scope.clone())
            .with_timeout(self.timeout)
    }

    /// A loader that ends in `Failed` for `url` without fetching anything.
    fn failed_loader(&self, url: &str, reason: &str) -> ArtifactLoader {
        let mut loader = self.new_loader();
        loader.set_url(url, Instant::now());
        loader.abort(url, reason);
        loader
    }

    /// Loads one image artifact, replacing the previous one of that kind.
    pub fn show_image<T: ArtifactTransport + ?Sized>(
        &mut self,
        kind: ArtifactKind,
        url: &str,
        transport: &T,
    ) {
        if !self.scope.is_mounted() {
            return;
        }
        let mut loader = self.new_loader();
        drive_image_load(&mut loader, transport, url);
        if self.scope.is_mounted() {
            self.images.insert(kind, loader);
        }
    }

    /// Loads several image previews concurrently, one thread per artifact.
    pub fn load_previews<T: ArtifactTransport + Sync + ?Sized>(
        &mut self,
        urls: &[(ArtifactKind, String)],
        transport: &T,
    ) {
        if !self.scope.is_mounted() {
            return;
        }
        let finished: Vec<(ArtifactKind, ArtifactLoader)> = std::thread::scope(|s| {
            let handles: Vec<_> = urls
                .iter()
                .map(|(kind, url)| {
                    let mut loader = self.new_loader();
                    let handle = s.spawn(move || {
                        drive_image_load(&mut loader, transport, url);
                        loader
                    });
                    (*kind, url, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(kind, url, handle)| {
                    let loader = handle.join().unwrap_or_else(|_| {
                        tracing::error!(%kind, url = %url, "preview load thread panicked");
                        self.failed_loader(url, PREVIEW_PANICKED)
                    });
                    (kind, loader)
                })
                .collect()
        });

        if !self.scope.is_mounted() {
            return;
        }
        self.images.extend(finished);
    }

    /// Reloads an image with a cache-busting parameter.
    pub fn refresh<T: ArtifactTransport + ?Sized>(
        &mut self,
        kind: ArtifactKind,
        transport: &T,
    ) -> Option<String> {
        let loader = self.images.get_mut(&kind)?;
        let url = loader.refresh(Instant::now())?;
        drive_image_load(loader, transport, &url);
        Some(url)
    }

    /// Fetches and parses an NFC document.
    pub fn load_nfc<T: ArtifactTransport + ?Sized>(&mut self, url: &str, transport: &T) {
        if !self.scope.is_mounted() {
            return;
        }
        self.nfc = NfcLoadState::Loading {
            url: url.to_string(),
        };

        let result = transport
            .fetch_json(url, self.timeout)
            .and_then(|body| NfcPayload::from_document(body).map_err(|e| e.to_string()));

        if !self.scope.is_mounted() {
            return;
        }
        self.nfc = match result {
            Ok(payload) => NfcLoadState::Loaded(payload),
            Err(detail) => {
                tracing::warn!(url, error = %detail, "NFC document load failed");
                NfcLoadState::Failed {
                    url: url.to_string(),
                    message: NFC_LOAD_FAILED.to_string(),
                    detail,
                }
            }
        };
    }

    /// Tears the view down: pending work is discarded and blobs are released.
    pub fn unmount(&mut self) {
        self.scope.unmount();
        self.images.clear();
        self.nfc = NfcLoadState::Idle;
    }
}
