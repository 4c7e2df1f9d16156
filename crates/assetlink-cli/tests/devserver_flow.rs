//! End-to-end tests of the client against the in-memory dev server.
//!
//! Each test starts its own server on an ephemeral port, driven by a tokio
//! runtime on a background thread, and talks to it with the blocking client.

use std::io::{Read, Write};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use assetlink_cli::artifacts::{ArtifactPanel, HttpTransport, NfcLoadState};
use assetlink_cli::{Client, ClientConfig, ClientError, ScanSession, TokenSource, TokenStore};
use assetlink_core::{
    resolve_reference, ArtifactKind, ArtifactStatus, BarcodeOptions, BulkRequest, ChecksumStatus,
    LoadState, QrOptions, SCAN_HISTORY_LIMIT,
};
use assetlink_devserver::{serve, AppState, DevServerConfig};
use tempfile::TempDir;

const TOKEN: &str = "dev-token";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

/// Starts a dev server and returns its base URL.
fn spawn_server(config: DevServerConfig) -> String {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().expect("Failed to build runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("Failed to bind");
            tx.send(listener.local_addr().expect("No local address"))
                .expect("Test thread went away");
            serve(listener, AppState::new(&config))
                .await
                .expect("Server failed");
        });
    });
    let addr = rx.recv().expect("Server did not start");
    format!("http://{}", addr)
}

/// Plain HTTP listener that answers every request with a PNG and reports
/// each request head, lowercased, on the returned channel.
fn spawn_recorder() -> (String, mpsc::Receiver<String>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let addr = listener.local_addr().expect("No local address");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => head.extend_from_slice(&buf[..n]),
                }
            }
            let _ = tx.send(String::from_utf8_lossy(&head).to_lowercase());
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n",
                PNG.len()
            );
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.write_all(PNG);
        }
    });
    (format!("http://{}", addr), rx)
}

fn client_for(host: &str, token: &str) -> Client {
    let config = ClientConfig::new(host).unwrap();
    Client::new(config, TokenSource::Fixed(token.to_string()))
}

/// Client whose token lives in a temporary store.
fn stored_client(host: &str, token: &str) -> (Client, TokenStore, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = TokenStore::new(dir.path());
    store.save(token).unwrap();
    let config = ClientConfig::new(host).unwrap();
    (
        Client::new(config, TokenSource::Stored(store.clone())),
        store,
        dir,
    )
}

#[test]
fn test_lookup_and_list() {
    let host = spawn_server(DevServerConfig::default());
    let client = client_for(&host, TOKEN);

    let assets = client.list_assets().unwrap();
    assert_eq!(assets.len(), 3);

    let tag = resolve_reference(
        "https://example.com/uploads/digital-assets/qr_ASSET555_1754296433008.png",
    );
    let asset = client.get_asset(&tag).unwrap();
    assert_eq!(asset.tag_id.as_deref(), Some("ASSET555"));
    assert_eq!(asset.location_label().as_deref(), Some("Building A, Roof"));

    let id = client.resolve_internal_id("ASSET777").unwrap();
    assert_eq!(id, "66b0c1e2a7770000000a0777");
}

#[test]
fn test_error_statuses() {
    let host = spawn_server(DevServerConfig {
        read_only_token: Some("viewer".to_string()),
        ..DevServerConfig::default()
    });

    let client = client_for(&host, TOKEN);
    match client.get_asset("ASSET404") {
        Err(ClientError::Http { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "Asset not found");
        }
        other => panic!("expected 404, got {:?}", other),
    }
    assert!(matches!(
        client.resolve_internal_id("ASSET404"),
        Err(ClientError::InvalidInput(_))
    ));

    let viewer = client_for(&host, "viewer");
    assert!(viewer.get_asset("ASSET555").is_ok());
    assert!(matches!(
        viewer.generate_qr("ASSET555", &QrOptions::default()),
        Err(ClientError::Forbidden(_))
    ));
}

#[test]
fn test_rejected_token_is_cleared() {
    let host = spawn_server(DevServerConfig::default());
    let (client, store, _dir) = stored_client(&host, "stale-token");

    assert!(matches!(
        client.get_asset("ASSET555"),
        Err(ClientError::Unauthorized)
    ));
    assert_eq!(store.load().unwrap(), None);

    // Nothing left to send.
    assert!(matches!(
        client.get_asset("ASSET555"),
        Err(ClientError::AuthMissing)
    ));
}

#[test]
fn test_unreachable_host_is_network_error() {
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    // The listener is dropped, so the port refuses connections.
    let client = client_for(&format!("http://{}", addr), TOKEN);
    let err = client.list_assets().unwrap_err();
    assert!(matches!(err, ClientError::Network(_)));
    assert!(err.is_retryable());
}

#[test]
fn test_generation_yields_fresh_urls_and_loads() {
    let host = spawn_server(DevServerConfig::default());
    let client = client_for(&host, TOKEN);
    let id = client.resolve_internal_id("ASSET555").unwrap();

    let first = client.generate_qr(&id, &QrOptions::default()).unwrap();
    let second = client.generate_qr(&id, &QrOptions::default()).unwrap();
    let (first, second) = (first.url.unwrap(), second.url.unwrap());
    assert_ne!(first, second);
    assert!(second.starts_with(&format!("{}/uploads/digital-assets/qr_ASSET555_", host)));
    assert_eq!(resolve_reference(&second), "ASSET555");

    let barcode = client
        .generate_barcode(&id, &BarcodeOptions::default())
        .unwrap();
    let barcode_url = barcode.url.unwrap();

    let transport = HttpTransport::new(client.config(), client.tokens().clone());
    let mut panel = ArtifactPanel::new(client.config().artifact_timeout);
    panel.load_previews(
        &[
            (ArtifactKind::Qr, second.clone()),
            (ArtifactKind::Barcode, barcode_url),
        ],
        &transport,
    );

    for kind in [ArtifactKind::Qr, ArtifactKind::Barcode] {
        let state = panel.image(kind).unwrap().state();
        assert!(
            matches!(state, LoadState::Loaded { bytes, .. } if bytes.starts_with(b"\x89PNG")),
            "{} ended in {}",
            kind,
            state.name()
        );
    }

    // A cache-busted reload hits the same file.
    let refreshed = panel.refresh(ArtifactKind::Qr, &transport).unwrap();
    assert!(refreshed.starts_with(&second));
    assert!(refreshed.contains("t="));
    assert!(panel.image(ArtifactKind::Qr).unwrap().state().is_loaded());

    panel.unmount();
    assert_eq!(panel.registry().live_count(), 0);
}

#[test]
fn test_token_is_only_sent_to_api_host() {
    let (api_host, api_requests) = spawn_recorder();
    let (foreign_host, foreign_requests) = spawn_recorder();
    let config = ClientConfig::new(&api_host).unwrap();
    let tokens = TokenSource::Fixed("SECRET-TOKEN".to_string());
    let transport = HttpTransport::new(&config, tokens);
    let mut panel = ArtifactPanel::new(config.artifact_timeout);

    let foreign = format!("{}/cdn/qr_ASSET555_1754296433008.png", foreign_host);
    panel.show_image(ArtifactKind::Qr, &foreign, &transport);
    assert!(panel.image(ArtifactKind::Qr).unwrap().state().is_loaded());
    let request = foreign_requests
        .recv_timeout(Duration::from_secs(5))
        .expect("Foreign host saw no request");
    assert!(!request.contains("authorization"), "request: {}", request);
    assert!(!request.contains("secret-token"), "request: {}", request);

    let own = format!("{}/uploads/digital-assets/barcode_ASSET555_1.png", api_host);
    panel.show_image(ArtifactKind::Barcode, &own, &transport);
    assert!(panel.image(ArtifactKind::Barcode).unwrap().state().is_loaded());
    let request = api_requests
        .recv_timeout(Duration::from_secs(5))
        .expect("API host saw no request");
    assert!(request.contains("authorization: bearer secret-token"), "request: {}", request);
}

#[test]
fn test_missing_artifact_fails_with_url() {
    let host = spawn_server(DevServerConfig::default());
    let client = client_for(&host, TOKEN);
    let transport = HttpTransport::new(client.config(), client.tokens().clone());
    let url = format!("{}/uploads/digital-assets/qr_GONE_1.png", host);

    let mut panel = ArtifactPanel::new(client.config().artifact_timeout);
    panel.show_image(ArtifactKind::Qr, &url, &transport);
    match panel.image(ArtifactKind::Qr).unwrap().state() {
        LoadState::Failed { url: failed, reason } => {
            assert_eq!(failed, &url);
            assert!(reason.contains("404"), "reason: {}", reason);
        }
        other => panic!("expected failure, got {}", other.name()),
    }
}

#[test]
fn test_bulk_generation_partial_failure() {
    let host = spawn_server(DevServerConfig {
        fail_kinds: [ArtifactKind::Nfc].into_iter().collect(),
        ..DevServerConfig::default()
    });
    let client = client_for(&host, TOKEN);
    let id = client.resolve_internal_id("ASSET100").unwrap();

    let outcome = client.generate_all(&id, &BulkRequest::all()).unwrap();
    assert_eq!(outcome.succeeded_count(), 2);
    assert_eq!(outcome.failed_count(), 1);
    assert!(matches!(outcome.nfc, ArtifactStatus::Failed(_)));

    let qr_url = outcome.qr.artifact().and_then(|a| a.url.clone()).unwrap();
    assert!(qr_url.starts_with(&host));
}

#[test]
fn test_nfc_document_loads_and_verifies() {
    let host = spawn_server(DevServerConfig::default());
    let client = client_for(&host, TOKEN);
    let id = client.resolve_internal_id("ASSET777").unwrap();

    let artifact = client.generate_nfc(&id).unwrap();
    let url = artifact.url.unwrap();

    let transport = HttpTransport::new(client.config(), client.tokens().clone());
    let mut panel = ArtifactPanel::new(client.config().artifact_timeout);
    panel.load_nfc(&url, &transport);
    match panel.nfc() {
        NfcLoadState::Loaded(payload) => {
            assert_eq!(payload.tag_id.as_deref(), Some("ASSET777"));
            assert_eq!(payload.verify_checksum().unwrap(), ChecksumStatus::Match);
        }
        other => panic!("expected loaded NFC data, got {:?}", other),
    }

    let gone = format!("{}/uploads/digital-assets/nfc_GONE_1.json", host);
    panel.load_nfc(&gone, &transport);
    assert!(matches!(
        panel.nfc(),
        NfcLoadState::Failed { message, .. } if message == "Failed to load NFC data"
    ));
}

#[test]
fn test_scan_session_keeps_recent_history() {
    let host = spawn_server(DevServerConfig::default());
    let client = client_for(&host, TOKEN);
    let generated = client
        .generate_qr("ASSET555", &QrOptions::default())
        .unwrap()
        .url
        .unwrap();

    let mut session = ScanSession::new(client);
    let scanned = session.scan(&generated).unwrap();
    assert_eq!(scanned.asset.display_tag(), "ASSET555");
    assert_eq!(scanned.artifact_url, generated);

    // Unknown tags leave the history alone.
    assert!(session.scan("ASSET404").is_err());
    assert_eq!(session.history().len(), 1);

    let tags = ["ASSET555", "ASSET777", "ASSET100"];
    for i in 0..12 {
        session.scan(tags[i % tags.len()]).unwrap();
    }
    assert_eq!(session.history().len(), SCAN_HISTORY_LIMIT);
    let recent: Vec<&str> = session
        .history()
        .iter()
        .map(|entry| entry.asset.display_tag())
        .collect();
    // Last scan was i = 11 -> ASSET100, then ASSET777, ASSET555...
    assert_eq!(&recent[..3], &["ASSET100", "ASSET777", "ASSET555"]);
}
