// Client configuration: one backend host, injected everywhere

use std::time::Duration;

use assetlink_core::DEFAULT_ARTIFACT_TIMEOUT;
use url::Url;

use crate::error::ClientError;

pub const DEFAULT_HOST: &str = "http://localhost:5000";

/// Deadline for lookup and generation requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST endpoints live under this prefix; stored artifacts are served from the host root.
const API_PREFIX: &str = "api";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    host: Url,
    pub request_timeout: Duration,
    pub artifact_timeout: Duration,
}

impl ClientConfig {
    /// Builds a configuration for `host` (scheme, host and optional port).
    pub fn new(host: &str) -> Result<Self, ClientError> {
        let mut parsed = Url::parse(host.trim()).map_err(|e| {
            ClientError::InvalidInput(format!("invalid API host '{}': {}", host, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidInput(format!(
                "API host must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        parsed.set_query(None);
        parsed.set_fragment(None);
        parsed.set_path("");

        Ok(Self {
            host: parsed,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            artifact_timeout: DEFAULT_ARTIFACT_TIMEOUT,
        })
    }

    pub fn host(&self) -> &str {
        self.host.as_str().trim_end_matches('/')
    }

    /// Builds `<host>/api/<segments...>`, percent-encoding each segment.
    pub fn api_url(&self, segments: &[&str]) -> String {
        let mut url = self.host.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.clear().push(API_PREFIX).extend(segments);
        }
        url.to_string()
    }

    /// Joins a host-relative artifact path with the host. Absolute and
    /// `blob:` URLs pass through unchanged.
    pub fn artifact_url(&self, url: &str) -> String {
        if url.starts_with("blob:") || Url::parse(url).is_ok() {
            return url.to_string();
        }
        match self.host.join(url) {
            Ok(joined) => joined.to_string(),
            Err(_) => format!("{}/{}", self.host(), url.trim_start_matches('/')),
        }
    }

    /// True when `url` has the configured host's scheme, host and port.
    /// Credentials are only ever sent to this origin.
    pub fn is_same_origin(&self, url: &str) -> bool {
        let Ok(other) = Url::parse(url) else {
            return false;
        };
        other.scheme() == self.host.scheme()
            && other.host_str() == self.host.host_str()
            && other.port_or_known_default() == self.host.port_or_known_default()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: Url::parse(DEFAULT_HOST).expect("default host is a valid URL"),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            artifact_timeout: DEFAULT_ARTIFACT_TIMEOUT,
        }
    }
}
