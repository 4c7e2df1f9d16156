// AssetLink Core - reference resolution, response decoding and artifact loading

pub mod envelope;
pub mod error;
pub mod history;
pub mod loader;
pub mod nfc;
pub mod resolver;
pub mod types;

pub use envelope::{decode_artifact, decode_asset, decode_asset_list, decode_bulk};
pub use error::CoreError;
pub use history::{ScanHistory, ScannedAsset, SCAN_HISTORY_LIMIT};
pub use loader::{
    cache_busted, ArtifactLoader, Blob, BlobRegistry, LoadState, ObjectUrl, ViewScope,
    DEFAULT_ARTIFACT_TIMEOUT,
};
pub use nfc::{abbreviate, ChecksumStatus, NfcPayload, NFC_LOAD_FAILED};
pub use resolver::{classify_reference, resolve_reference, ReferenceForm};
pub use types::{
    ArtifactKind, ArtifactStatus, Asset, BarcodeFormat, BarcodeOptions, BulkOptions, BulkOutcome,
    BulkRequest, DigitalArtifact, QrOptions,
};
