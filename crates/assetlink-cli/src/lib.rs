// AssetLink CLI - client library behind the `assetlink` command

pub mod artifacts;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod session;

pub use artifacts::{ArtifactPanel, ArtifactTransport, HttpTransport, NfcLoadState};
pub use client::Client;
pub use config::ClientConfig;
pub use credentials::{TokenSource, TokenStore};
pub use error::ClientError;
pub use session::{AssetDirectory, FrameDecoder, ScanSession, TextFrameDecoder};
