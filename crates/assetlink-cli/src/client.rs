//! HTTP client for the asset and digital-asset endpoints.
//!
//! Every request carries `Authorization: Bearer <token>`. The token is read
//! before the request is sent, so a missing token never reaches the network.
//! Response bodies go through the per-endpoint decoders in
//! [`assetlink_core::envelope`].

use assetlink_core::{
    decode_artifact, decode_asset, decode_asset_list, decode_bulk, ArtifactKind, ArtifactStatus,
    Asset, BarcodeOptions, BulkOutcome, BulkRequest, CoreError, DigitalArtifact, QrOptions,
};
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::credentials::TokenSource;
use crate::error::ClientError;

pub struct Client {
    agent: ureq::Agent,
    config: ClientConfig,
    tokens: TokenSource,
}

impl Client {
    pub fn new(config: ClientConfig, tokens: TokenSource) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.request_timeout)
            .build();
        Self {
            agent,
            config,
            tokens,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenSource {
        &self.tokens
    }

    /// `GET /api/assets/{id}`. Accepts a tag or an internal id.
    pub fn get_asset(&self, id: &str) -> Result<Asset, ClientError> {
        let id = non_empty(id, "asset identifier")?;
        let url = self.config.api_url(&["assets", id]);
        let body = self.send(self.agent.get(&url), None::<&()>, "asset lookup")?;
        Ok(decode_asset(&body)?)
    }

    /// `GET /api/assets`.
    pub fn list_assets(&self) -> Result<Vec<Asset>, ClientError> {
        let url = self.config.api_url(&["assets"]);
        let body = self.send(self.agent.get(&url), None::<&()>, "asset list")?;
        Ok(decode_asset_list(&body)?)
    }

    /// Maps a displayed tag to the backend id that generation endpoints expect.
    pub fn resolve_internal_id(&self, tag: &str) -> Result<String, ClientError> {
        let tag = non_empty(tag, "asset tag")?;
        let assets = self.list_assets()?;
        internal_id_for_tag(&assets, tag)
            .map(str::to_string)
            .ok_or_else(|| ClientError::InvalidInput(format!("no asset with tag '{}'", tag)))
    }

    /// `POST /api/digital-assets/qr/{assetId}`.
    pub fn generate_qr(
        &self,
        asset_id: &str,
        options: &QrOptions,
    ) -> Result<DigitalArtifact, ClientError> {
        options.validate().map_err(invalid_option)?;
        self.generate(ArtifactKind::Qr, asset_id, Some(options))
    }

    /// `POST /api/digital-assets/barcode/{assetId}`.
    pub fn generate_barcode(
        &self,
        asset_id: &str,
        options: &BarcodeOptions,
    ) -> Result<DigitalArtifact, ClientError> {
        options.validate().map_err(invalid_option)?;
        self.generate(ArtifactKind::Barcode, asset_id, Some(options))
    }

    /// `POST /api/digital-assets/nfc/{assetId}`.
    pub fn generate_nfc(&self, asset_id: &str) -> Result<DigitalArtifact, ClientError> {
        self.generate(ArtifactKind::Nfc, asset_id, None::<&()>)
    }

    /// `POST /api/digital-assets/all/{assetId}`; one status per artifact kind.
    pub fn generate_all(
        &self,
        asset_id: &str,
        request: &BulkRequest,
    ) -> Result<BulkOutcome, ClientError> {
        request.validate().map_err(invalid_option)?;
        let asset_id = non_empty(asset_id, "asset id")?;
        let url = self.config.api_url(&["digital-assets", "all", asset_id]);
        let body = self.send(self.agent.post(&url), Some(request), "bulk generation")?;

        let mut outcome = decode_bulk(&request.types, &body)?;
        for kind in ArtifactKind::ALL {
            if let ArtifactStatus::Succeeded(artifact) = outcome.get_mut(kind) {
                self.absolutize(artifact);
            }
        }
        tracing::info!(
            asset_id,
            succeeded = outcome.succeeded_count(),
            failed = outcome.failed_count(),
            "bulk generation finished"
        );
        Ok(outcome)
    }

    fn generate<B: Serialize + ?Sized>(
        &self,
        kind: ArtifactKind,
        asset_id: &str,
        options: Option<&B>,
    ) -> Result<DigitalArtifact, ClientError> {
        let asset_id = non_empty(asset_id, "asset id")?;
        let url = self
            .config
            .api_url(&["digital-assets", kind.as_str(), asset_id]);
        let body = self.send(self.agent.post(&url), options, kind.response_key())?;

        let mut artifact = decode_artifact(kind, &body)?;
        self.absolutize(&mut artifact);
        tracing::info!(asset_id, %kind, url = ?artifact.url, "artifact generated");
        Ok(artifact)
    }

    fn absolutize(&self, artifact: &mut DigitalArtifact) {
        if let Some(url) = artifact.url.as_mut() {
            *url = self.config.artifact_url(url);
        }
    }

    fn send<B: Serialize + ?Sized>(
        &self,
        request: ureq::Request,
        body: Option<&B>,
        endpoint: &'static str,
    ) -> Result<Value, ClientError> {
        let token = self.tokens.token()?;
        let request = request
            .set("Authorization", &format!("Bearer {}", token))
            .set("Accept", "application/json");

        tracing::debug!(method = request.method(), url = request.url(), "sending request");
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };

        match result {
            Ok(response) => response.into_json::<Value>().map_err(|e| {
                ClientError::MalformedResponse(CoreError::UnknownShape {
                    endpoint,
                    detail: format!("body is not JSON: {}", e),
                })
            }),
            Err(ureq::Error::Status(status, response)) => Err(self.status_error(status, response)),
            Err(ureq::Error::Transport(transport)) => {
                tracing::warn!(endpoint, error = %transport, "request failed");
                Err(ClientError::Network(transport.to_string()))
            }
        }
    }

    fn status_error(&self, status: u16, response: ureq::Response) -> ClientError {
        let status_text = response.status_text().to_string();
        let message = response
            .into_string()
            .ok()
            .and_then(|text| error_message(&text))
            .unwrap_or(status_text);

        match status {
            401 => {
                if let Err(e) = self.tokens.invalidate() {
                    tracing::warn!(error = %e, "failed to clear rejected token");
                }
                ClientError::Unauthorized
            }
            403 => ClientError::Forbidden(message),
            _ => ClientError::Http { status, message },
        }
    }
}

/// Finds the internal id of the asset displayed as `tag`.
pub fn internal_id_for_tag<'a>(assets: &'a [Asset], tag: &str) -> Option<&'a str> {
    assets
        .iter()
        .find(|a| a.tag_id.as_deref() == Some(tag))
        .and_then(|a| a.id.as_deref())
}

/// Extracts `message` or `error` from an error body; plain text bodies are used as-is.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => json
            .get("message")
            .or_else(|| json.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Err(_) => Some(trimmed.chars().take(200).collect()),
    }
}

fn non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str, ClientError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ClientError::InvalidInput(format!("{} must not be empty", what)));
    }
    Ok(trimmed)
}

fn invalid_option(e: CoreError) -> ClientError {
    ClientError::InvalidInput(e.to_string())
}
