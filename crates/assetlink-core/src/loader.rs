//! Artifact loading state machine.
//!
//! ```text
//! Idle -> Loading -> Loaded                       (native load ok)
//!         Loading -> FallbackFetching -> LoadedBlob (fetch+blob ok)
//!                                     -> Failed     (fetch failed)
//! any pending state -> Failed when the deadline passes
//! ```
//!
//! The loader only records transitions; the caller performs the I/O and
//! reports completions. Completions for a URL other than the current one, or
//! arriving after the owning view was unmounted, are ignored. Blob fallbacks
//! are held through [`ObjectUrl`] handles that release the blob on drop.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Pending loads are forced to `Failed` after this long.
pub const DEFAULT_ARTIFACT_TIMEOUT: Duration = Duration::from_secs(10);

/// Query parameter appended by a manual refresh.
const CACHE_BUST_PARAM: &str = "t";

/// Raw bytes fetched by the fallback path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Local store of fetched blobs addressed by `blob:<uuid>` URLs.
#[derive(Clone, Default)]
pub struct BlobRegistry {
    blobs: Arc<Mutex<HashMap<String, Arc<Blob>>>>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Blob>>> {
        self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a blob and returns the handle that keeps it alive.
    pub fn create_object_url(&self, blob: Blob) -> ObjectUrl {
        let url = format!("blob:{}", Uuid::new_v4());
        self.lock().insert(url.clone(), Arc::new(blob));
        ObjectUrl {
            url,
            registry: self.clone(),
        }
    }

    pub fn get(&self, url: &str) -> Option<Arc<Blob>> {
        self.lock().get(url).cloned()
    }

    /// Number of object URLs not yet released.
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    fn revoke(&self, url: &str) {
        if self.lock().remove(url).is_some() {
            tracing::debug!(url, "revoked object url");
        }
    }
}

impl fmt::Debug for BlobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobRegistry")
            .field("live", &self.live_count())
            .finish()
    }
}

/// Owning handle to a registered blob. Dropping it revokes the URL.
pub struct ObjectUrl {
    url: String,
    registry: BlobRegistry,
}

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn blob(&self) -> Option<Arc<Blob>> {
        self.registry.get(&self.url)
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        self.registry.revoke(&self.url);
    }
}

impl fmt::Debug for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectUrl").field(&self.url).finish()
    }
}

/// Shared "still mounted" flag for one view.
#[derive(Debug, Clone)]
pub struct ViewScope {
    mounted: Arc<AtomicBool>,
}

impl Default for ViewScope {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewScope {
    pub fn new() -> Self {
        Self {
            mounted: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub enum LoadState {
    Idle,
    Loading {
        url: String,
        started: Instant,
    },
    FallbackFetching {
        url: String,
        started: Instant,
        native_error: String,
    },
    Loaded {
        url: String,
        bytes: Vec<u8>,
    },
    LoadedBlob {
        url: String,
        object_url: ObjectUrl,
    },
    Failed {
        url: String,
        reason: String,
    },
}

impl LoadState {
    pub fn url(&self) -> Option<&str> {
        match self {
            LoadState::Idle => None,
            LoadState::Loading { url, .. }
            | LoadState::FallbackFetching { url, .. }
            | LoadState::Loaded { url, .. }
            | LoadState::LoadedBlob { url, .. }
            | LoadState::Failed { url, .. } => Some(url),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            LoadState::Loading { .. } | LoadState::FallbackFetching { .. }
        )
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded { .. } | LoadState::LoadedBlob { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            LoadState::Idle => "idle",
            LoadState::Loading { .. } => "loading",
            LoadState::FallbackFetching { .. } => "fallback-fetching",
            LoadState::Loaded { .. } => "loaded",
            LoadState::LoadedBlob { .. } => "loaded-blob",
            LoadState::Failed { .. } => "failed",
        }
    }
}

/// Loading state for one artifact.
#[derive(Debug)]
pub struct ArtifactLoader {
    state: LoadState,
    timeout: Duration,
    registry: BlobRegistry,
    scope: ViewScope,
}

impl ArtifactLoader {
    pub fn new(registry: BlobRegistry, scope: ViewScope) -> Self {
        Self {
            state: LoadState::Idle,
            timeout: DEFAULT_ARTIFACT_TIMEOUT,
            registry,
            scope,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn current_url(&self) -> Option<&str> {
        self.state.url()
    }

    fn accepts(&self, url: &str) -> bool {
        self.scope.is_mounted() && self.state.url() == Some(url)
    }

    /// Starts loading `url`, replacing (and releasing) whatever was loaded before.
    pub fn set_url(&mut self, url: impl Into<String>, now: Instant) {
        if !self.scope.is_mounted() {
            return;
        }
        let url = url.into();
        tracing::debug!(url = %url, "artifact load started");
        self.state = LoadState::Loading { url, started: now };
    }

    /// Native load succeeded. Returns whether the completion was applied.
    pub fn native_loaded(&mut self, url: &str, bytes: Vec<u8>) -> bool {
        if !self.accepts(url) || !matches!(self.state, LoadState::Loading { .. }) {
            return false;
        }
        self.state = LoadState::Loaded {
            url: url.to_string(),
            bytes,
        };
        true
    }

    /// Native load failed; moves to the fallback fetch. Returns whether applied.
    pub fn native_failed(&mut self, url: &str, error: impl Into<String>) -> bool {
        if !self.accepts(url) {
            return false;
        }
        let LoadState::Loading { started, .. } = self.state else {
            return false;
        };
        let native_error = error.into();
        tracing::warn!(url, error = %native_error, "native artifact load failed, fetching blob");
        self.state = LoadState::FallbackFetching {
            url: url.to_string(),
            started,
            native_error,
        };
        true
    }

    /// Fallback fetch succeeded; the blob is registered under a new object URL.
    pub fn fallback_loaded(&mut self, url: &str, blob: Blob) -> bool {
        if !self.accepts(url) || !matches!(self.state, LoadState::FallbackFetching { .. }) {
            return false;
        }
        let object_url = self.registry.create_object_url(blob);
        self.state = LoadState::LoadedBlob {
            url: url.to_string(),
            object_url,
        };
        true
    }

    pub fn fallback_failed(&mut self, url: &str, error: impl Into<String>) -> bool {
        if !self.accepts(url) || !matches!(self.state, LoadState::FallbackFetching { .. }) {
            return false;
        }
        let reason = match &self.state {
            LoadState::FallbackFetching { native_error, .. } => {
                format!("{}; fallback fetch: {}", native_error, error.into())
            }
            _ => error.into(),
        };
        self.state = LoadState::Failed {
            url: url.to_string(),
            reason,
        };
        true
    }

    /// Time left before the pending load is forced to fail.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match &self.state {
            LoadState::Loading { started, .. } | LoadState::FallbackFetching { started, .. } => {
                Some(self.timeout.saturating_sub(now.saturating_duration_since(*started)))
            }
            _ => None,
        }
    }

    /// Forces a pending load past its deadline into `Failed`. Returns whether it fired.
    pub fn check_deadline(&mut self, now: Instant) -> bool {
        if self.remaining(now) != Some(Duration::ZERO) {
            return false;
        }
        let url = self.state.url().unwrap_or_default().to_string();
        tracing::warn!(url = %url, timeout = ?self.timeout, "artifact load timed out");
        self.state = LoadState::Failed {
            url,
            reason: format!("timed out after {}s", self.timeout.as_secs()),
        };
        true
    }

    /// Fails a pending load of `url` outright, skipping any remaining phase.
    pub fn abort(&mut self, url: &str, reason: impl Into<String>) -> bool {
        if !self.accepts(url) || !self.state.is_pending() {
            return false;
        }
        self.state = LoadState::Failed {
            url: url.to_string(),
            reason: reason.into(),
        };
        true
    }

    /// Reloads the current URL with a cache-busting query parameter.
    /// Returns the new URL, or `None` when nothing has been loaded yet or
    /// the view is gone.
    pub fn refresh(&mut self, now: Instant) -> Option<String> {
        if !self.scope.is_mounted() {
            return None;
        }
        let base = self.state.url()?.to_string();
        let busted = cache_busted(&base, chrono::Utc::now().timestamp_millis());
        self.set_url(busted.clone(), now);
        Some(busted)
    }

    /// Returns to `Idle`, releasing any blob.
    pub fn reset(&mut self) {
        self.state = LoadState::Idle;
    }
}

/// Sets the cache-busting parameter on `url`, replacing an earlier one.
pub fn cache_busted(url: &str, stamp: i64) -> String {
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    };
    let prefix = format!("{}=", CACHE_BUST_PARAM);
    let mut params: Vec<&str> = query
        .map(|q| {
            q.split('&')
                .filter(|p| !p.is_empty() && !p.starts_with(&prefix))
                .collect()
        })
        .unwrap_or_default();
    let bust = format!("{}{}", prefix, stamp);
    params.push(&bust);
    format!("{}?{}", path, params.join("&"))
}
