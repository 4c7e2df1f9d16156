//! Recent scan history, newest first, bounded to [`SCAN_HISTORY_LIMIT`].

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::Asset;

pub const SCAN_HISTORY_LIMIT: usize = 10;

/// An asset resolved from a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedAsset {
    pub asset: Asset,
    pub scanned_at: DateTime<Utc>,
    /// The raw scanned value (usually an artifact URL) that produced this entry.
    pub artifact_url: String,
}

#[derive(Debug, Default)]
pub struct ScanHistory {
    entries: VecDeque<ScannedAsset>,
}

impl ScanHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: ScannedAsset) {
        self.entries.push_front(entry);
        self.entries.truncate(SCAN_HISTORY_LIMIT);
    }

    pub fn latest(&self) -> Option<&ScannedAsset> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScannedAsset> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
