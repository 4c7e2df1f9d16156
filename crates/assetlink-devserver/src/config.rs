//! Server configuration from environment variables.

use std::collections::BTreeSet;
use std::env;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use assetlink_core::{decode_asset_list, ArtifactKind, Asset};
use serde_json::json;

pub const DEFAULT_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_TOKEN: &str = "dev-token";

#[derive(Debug, Clone)]
pub struct DevServerConfig {
    pub addr: SocketAddr,
    /// Bearer token accepted for every endpoint.
    pub token: String,
    /// Token that may read assets but gets 403 on generation.
    pub read_only_token: Option<String>,
    /// Artifact kinds whose generator always fails.
    pub fail_kinds: BTreeSet<ArtifactKind>,
    pub assets: Vec<Asset>,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            token: DEFAULT_TOKEN.to_string(),
            read_only_token: None,
            fail_kinds: BTreeSet::new(),
            assets: default_assets(),
        }
    }
}

impl DevServerConfig {
    /// Reads `ASSETLINK_DEV_ADDR`, `ASSETLINK_DEV_TOKEN`,
    /// `ASSETLINK_DEV_READONLY_TOKEN`, `ASSETLINK_DEV_FAIL` (comma-separated
    /// kinds) and `ASSETLINK_DEV_SEED` (path to a JSON asset list).
    pub fn from_env() -> anyhow::Result<Self> {
        let addr = env::var("ASSETLINK_DEV_ADDR")
            .unwrap_or_else(|_| DEFAULT_ADDR.to_string());
        let addr = addr
            .parse()
            .with_context(|| format!("Invalid ASSETLINK_DEV_ADDR '{}'", addr))?;

        let fail_kinds = match env::var("ASSETLINK_DEV_FAIL") {
            Ok(list) => parse_kinds(&list)?,
            Err(_) => BTreeSet::new(),
        };

        let assets = match env::var("ASSETLINK_DEV_SEED") {
            Ok(path) => load_seed(Path::new(&path))?,
            Err(_) => default_assets(),
        };

        Ok(Self {
            addr,
            token: env::var("ASSETLINK_DEV_TOKEN")
                .unwrap_or_else(|_| DEFAULT_TOKEN.to_string()),
            read_only_token: env::var("ASSETLINK_DEV_READONLY_TOKEN").ok(),
            fail_kinds,
            assets,
        })
    }
}

fn parse_kinds(list: &str) -> anyhow::Result<BTreeSet<ArtifactKind>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<ArtifactKind>().map_err(anyhow::Error::from))
        .collect()
}

/// Loads seed assets from any asset-list shape the client accepts.
/// Assets without an `_id` get a generated one.
pub fn load_seed(path: &Path) -> anyhow::Result<Vec<Asset>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file '{}'", path.display()))?;
    let body: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Seed file '{}' is not JSON", path.display()))?;
    let mut assets = decode_asset_list(&body)?;
    for asset in &mut assets {
        if asset.id.is_none() {
            asset.id = Some(uuid::Uuid::new_v4().simple().to_string());
        }
    }
    Ok(assets)
}

/// A small fixed inventory so the server is useful without a seed file.
pub fn default_assets() -> Vec<Asset> {
    let seed = json!([
        {
            "_id": "66b0c1e2a5550000000a0555",
            "tagId": "ASSET555",
            "type": "HVAC Unit",
            "brand": "Carrier",
            "model": "48TC",
            "status": "active",
            "priority": "high",
            "location": { "name": "Building A, Roof" },
            "project": { "name": "North Campus Retrofit" }
        },
        {
            "_id": "66b0c1e2a7770000000a0777",
            "tagId": "ASSET777",
            "type": "Generator",
            "brand": "Cummins",
            "model": "C150D6",
            "status": "maintenance",
            "priority": "medium",
            "location": "Basement plant room"
        },
        {
            "_id": "66b0c1e2a1000000000a0100",
            "tagId": "ASSET100",
            "type": "Fire Pump",
            "status": "active"
        }
    ]);
    serde_json::from_value(seed).unwrap_or_default()
}
