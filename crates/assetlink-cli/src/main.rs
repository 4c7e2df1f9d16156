// AssetLink CLI - resolve, look up, generate and load asset artifacts

use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::Context;
use assetlink_cli::artifacts::{ArtifactPanel, HttpTransport, NfcLoadState};
use assetlink_cli::credentials::{self, TokenSource, TokenStore};
use assetlink_cli::session::{stored_artifact_urls, FrameDecoder, ScanSession, TextFrameDecoder};
use assetlink_cli::{Client, ClientConfig, ClientError};
use assetlink_core::{
    abbreviate, classify_reference, resolve_reference, ArtifactKind, ArtifactStatus, Asset,
    BarcodeFormat, BarcodeOptions, BulkOptions, BulkRequest, ChecksumStatus, DigitalArtifact,
    LoadState, QrOptions,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

/// AssetLink - digital-asset artifacts for facility assets
#[derive(Parser)]
#[command(name = "assetlink")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Backend host, e.g. https://assets.example.com
    #[arg(
        long,
        env = "ASSETLINK_API_URL",
        default_value = assetlink_cli::config::DEFAULT_HOST,
        global = true
    )]
    api_url: String,

    /// Directory holding the stored token (defaults to ~/.assetlink)
    #[arg(long, env = "ASSETLINK_HOME", global = true)]
    token_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the API token (login, logout, status)
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Extract the asset tag from a scanned value
    Resolve {
        /// URL, artifact filename or tag
        raw: String,
    },
    /// Resolve a scanned value and show the asset
    Lookup {
        raw: String,

        /// Print the raw asset JSON
        #[arg(long)]
        json: bool,
    },
    /// List assets
    Assets,
    /// Generate QR, barcode or NFC artifacts
    Generate {
        #[command(subcommand)]
        kind: GenerateKind,
    },
    /// Load an image artifact (with blob fallback)
    Load {
        url: String,

        /// Write the loaded bytes to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Load an NFC document and verify its checksum
    Nfc { url: String },
    /// Scan interactively: one reference per line, `history` to list, `quit` to exit
    Scan {
        /// Also load the artifacts stored on each scanned asset
        #[arg(long)]
        artifacts: bool,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Store an API token
    Login {
        /// Token value (prompted for when omitted)
        #[arg(long)]
        token: Option<String>,
    },
    /// Remove the stored token
    Logout,
    /// Show whether a token is available
    Status,
}

/// Which asset a generation targets.
#[derive(clap::Args)]
struct Target {
    /// Backend asset id, or a tag when --tag is given
    asset: String,

    /// Treat ASSET as a display tag and map it to the backend id first
    #[arg(long)]
    tag: bool,

    /// Skip loading previews of the generated images
    #[arg(long)]
    no_preview: bool,

    /// Save generated images into this directory
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum GenerateKind {
    /// QR code
    Qr {
        #[command(flatten)]
        target: Target,

        /// Edge length in pixels
        #[arg(long, default_value_t = 300)]
        size: u32,

        /// Encode the bare tag instead of a link
        #[arg(long)]
        no_url: bool,
    },
    /// Barcode
    Barcode {
        #[command(flatten)]
        target: Target,

        /// code128, code39, ean13, ean8, upca or upce
        #[arg(long, default_value = "code128")]
        format: BarcodeFormat,

        /// Bar height in millimetres
        #[arg(long, default_value_t = 10)]
        height: u32,

        #[arg(long, default_value_t = 3)]
        scale: u32,
    },
    /// NFC payload
    Nfc {
        #[command(flatten)]
        target: Target,
    },
    /// Several artifact kinds in one request
    All {
        #[command(flatten)]
        target: Target,

        /// Comma-separated kinds to request
        #[arg(long, value_delimiter = ',', default_value = "qr,barcode,nfc")]
        types: Vec<ArtifactKind>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(ClientError::Unauthorized) = e.downcast_ref::<ClientError>() {
            eprintln!("{}", "Your stored token has been cleared.".yellow());
        }
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ClientConfig::new(&cli.api_url)?;
    let store = match cli.token_dir {
        Some(dir) => TokenStore::new(dir),
        None => TokenStore::default_location()?,
    };

    match cli.command {
        Commands::Auth { action } => handle_auth(action, &store),
        Commands::Resolve { raw } => handle_resolve(&raw),
        Commands::Lookup { raw, json } => {
            let client = Client::new(config, TokenSource::from_env_or(store));
            handle_lookup(&client, &raw, json)
        }
        Commands::Assets => {
            let client = Client::new(config, TokenSource::from_env_or(store));
            handle_assets(&client)
        }
        Commands::Generate { kind } => {
            let client = Client::new(config, TokenSource::from_env_or(store));
            handle_generate(&client, kind)
        }
        Commands::Load { url, out } => {
            let transport = HttpTransport::new(&config, TokenSource::from_env_or(store));
            handle_load(&config, &transport, &url, out.as_deref())
        }
        Commands::Nfc { url } => {
            let transport = HttpTransport::new(&config, TokenSource::from_env_or(store));
            handle_nfc(&config, &transport, &url)
        }
        Commands::Scan { artifacts } => {
            let tokens = TokenSource::from_env_or(store);
            let transport = HttpTransport::new(&config, tokens.clone());
            let client = Client::new(config, tokens);
            handle_scan(client, &transport, artifacts)
        }
    }
}

fn handle_auth(action: AuthAction, store: &TokenStore) -> anyhow::Result<()> {
    match action {
        AuthAction::Login { token } => {
            let token = match token {
                Some(t) => t,
                None => credentials::prompt_token()?,
            };
            store.save(&token)?;
            println!("{} Token stored in {}", "✓".green().bold(), store.dir().display());
            Ok(())
        }
        AuthAction::Logout => {
            store.clear()?;
            println!("Signed out.");
            Ok(())
        }
        AuthAction::Status => {
            match TokenSource::from_env_or(store.clone()) {
                TokenSource::Fixed(_) => println!("Using token from ${}", credentials::TOKEN_ENV),
                TokenSource::Stored(store) => match store.load()? {
                    Some(token) => println!("Signed in (token {})", abbreviate(&token, 4, 4)),
                    None => println!("{}", "Not signed in".yellow()),
                },
            }
            Ok(())
        }
    }
}

fn handle_resolve(raw: &str) -> anyhow::Result<()> {
    let raw = raw.trim();
    if raw.is_empty() {
        anyhow::bail!("Nothing to resolve: the value is empty");
    }
    println!("{}", resolve_reference(raw));
    tracing::debug!(form = ?classify_reference(raw), "reference classified");
    Ok(())
}

fn handle_lookup(client: &Client, raw: &str, json: bool) -> anyhow::Result<()> {
    let raw = raw.trim();
    if raw.is_empty() {
        anyhow::bail!("Nothing to look up: the value is empty");
    }
    let tag = resolve_reference(raw);
    let asset = client.get_asset(&tag)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&asset)?);
    } else {
        print_asset(&asset);
    }
    Ok(())
}

fn handle_assets(client: &Client) -> anyhow::Result<()> {
    let assets = client.list_assets()?;
    if assets.is_empty() {
        println!("No assets.");
        return Ok(());
    }
    for asset in &assets {
        println!(
            "  {:<16} {:<24} {:<12} {}",
            asset.display_tag().bold(),
            asset.id.as_deref().unwrap_or("-"),
            asset.status.as_deref().unwrap_or("-"),
            asset.asset_type.as_deref().unwrap_or("-"),
        );
    }
    println!();
    println!("  {} assets", assets.len());
    Ok(())
}

fn resolve_target(client: &Client, target: &Target) -> anyhow::Result<String> {
    if target.tag {
        let id = client.resolve_internal_id(&target.asset)?;
        tracing::debug!(tag = %target.asset, id = %id, "mapped tag to internal id");
        Ok(id)
    } else {
        Ok(target.asset.trim().to_string())
    }
}

fn handle_generate(client: &Client, kind: GenerateKind) -> anyhow::Result<()> {
    let transport = HttpTransport::new(client.config(), client.tokens().clone());

    let (target, generated) = match kind {
        GenerateKind::Qr {
            target,
            size,
            no_url,
        } => {
            let id = resolve_target(client, &target)?;
            let options = QrOptions {
                size,
                include_url: !no_url,
            };
            let artifact = client.generate_qr(&id, &options)?;
            (target, vec![(ArtifactKind::Qr, artifact)])
        }
        GenerateKind::Barcode {
            target,
            format,
            height,
            scale,
        } => {
            let id = resolve_target(client, &target)?;
            let options = BarcodeOptions {
                format,
                height,
                scale,
            };
            let artifact = client.generate_barcode(&id, &options)?;
            (target, vec![(ArtifactKind::Barcode, artifact)])
        }
        GenerateKind::Nfc { target } => {
            let id = resolve_target(client, &target)?;
            let artifact = client.generate_nfc(&id)?;
            (target, vec![(ArtifactKind::Nfc, artifact)])
        }
        GenerateKind::All { target, types } => {
            let id = resolve_target(client, &target)?;
            let request = BulkRequest {
                options: BulkOptions {
                    qr: types.contains(&ArtifactKind::Qr).then(QrOptions::default),
                    barcode: types
                        .contains(&ArtifactKind::Barcode)
                        .then(BarcodeOptions::default),
                },
                types,
            };
            let outcome = client.generate_all(&id, &request)?;

            let mut generated = Vec::new();
            for (kind, status) in outcome.iter() {
                match status {
                    ArtifactStatus::Succeeded(artifact) => generated.push((kind, artifact.clone())),
                    ArtifactStatus::Failed(reason) => {
                        println!("{} {:<8} {}", "✗".red().bold(), kind, reason.red())
                    }
                    ArtifactStatus::NotReturned => println!(
                        "{} {:<8} {}",
                        "?".yellow().bold(),
                        kind,
                        "requested but not returned".yellow()
                    ),
                    ArtifactStatus::NotRequested => {}
                }
            }
            (target, generated)
        }
    };

    for (kind, artifact) in &generated {
        print_artifact(*kind, artifact);
    }

    if target.no_preview {
        return Ok(());
    }

    let previews: Vec<(ArtifactKind, String)> = generated
        .iter()
        .filter(|(kind, _)| kind.is_image())
        .filter_map(|(kind, artifact)| artifact.url.clone().map(|url| (*kind, url)))
        .collect();
    if previews.is_empty() {
        return Ok(());
    }

    let mut panel = ArtifactPanel::new(client.config().artifact_timeout);
    panel.load_previews(&previews, &transport);
    println!();
    for (kind, _) in &previews {
        if let Some(loader) = panel.image(*kind) {
            print_load_state(*kind, loader.state());
            if let Some(dir) = target.out.as_deref() {
                save_loaded(loader.state(), dir)?;
            }
        }
    }
    panel.unmount();
    Ok(())
}

fn handle_load(
    config: &ClientConfig,
    transport: &HttpTransport,
    url: &str,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let url = config.artifact_url(url.trim());
    let kind = guess_kind(&url);
    let mut panel = ArtifactPanel::new(config.artifact_timeout);
    panel.show_image(kind, &url, transport);

    let Some(loader) = panel.image(kind) else {
        anyhow::bail!("Artifact view was closed before loading finished");
    };
    print_load_state(kind, loader.state());
    if let Some(path) = out {
        match loaded_bytes(loader.state()) {
            Some(bytes) => {
                std::fs::write(path, &bytes)
                    .with_context(|| format!("Failed to write '{}'", path.display()))?;
                println!("  Saved:     {}", path.display());
            }
            None => anyhow::bail!("Nothing to save: the artifact did not load"),
        }
    }
    let failed = matches!(loader.state(), LoadState::Failed { .. });
    panel.unmount();
    if failed {
        anyhow::bail!("Failed to load artifact");
    }
    Ok(())
}

fn handle_nfc(config: &ClientConfig, transport: &HttpTransport, url: &str) -> anyhow::Result<()> {
    let url = config.artifact_url(url.trim());
    let mut panel = ArtifactPanel::new(config.artifact_timeout);
    panel.load_nfc(&url, transport);

    let result = match panel.nfc() {
        NfcLoadState::Loaded(payload) => {
            println!("{} {}", "✓".green().bold(), "NFC data loaded".green());
            println!();
            for (field, value) in payload.display_fields() {
                println!("  {:<12} {}", format!("{}:", field), value);
            }
            println!();
            match payload.verify_checksum()? {
                ChecksumStatus::Match => println!("  {}", "Checksum verified".green()),
                ChecksumStatus::Mismatch { expected, computed } => {
                    println!("  {}", "Checksum mismatch".red().bold());
                    println!("    Expected: {}", expected);
                    println!("    Computed: {}", computed);
                }
                ChecksumStatus::Unverifiable => println!("  {}", "No checksum present".dimmed()),
            }
            Ok(())
        }
        NfcLoadState::Failed {
            url,
            message,
            detail,
        } => {
            eprintln!("{} {}", "✗".red().bold(), message.red());
            eprintln!("  URL:    {}", url);
            eprintln!("  Reason: {}", detail);
            Err(anyhow::anyhow!("{}", message))
        }
        NfcLoadState::Idle | NfcLoadState::Loading { .. } => {
            Err(anyhow::anyhow!("NFC view was closed before loading finished"))
        }
    };
    panel.unmount();
    result
}

fn handle_scan(
    client: Client,
    transport: &HttpTransport,
    with_artifacts: bool,
) -> anyhow::Result<()> {
    let config = client.config().clone();
    let mut session = ScanSession::new(client);
    let mut decoder = TextFrameDecoder;

    println!("Enter a scanned value per line. `history` lists recent scans, `quit` exits.");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match line.trim() {
            "quit" | "exit" => break,
            "history" => {
                print_history(&session);
                continue;
            }
            _ => {}
        }
        let Some(raw) = decoder.detect(line.as_bytes()) else {
            continue;
        };

        match session.scan(&raw) {
            Ok(scanned) => {
                println!(
                    "{} Scanned {}",
                    "✓".green().bold(),
                    scanned.asset.display_tag().bold()
                );
                print_asset(&scanned.asset);
                if with_artifacts {
                    show_stored_artifacts(&scanned.asset, &config, transport);
                }
            }
            // The session is unchanged on error; report and keep scanning.
            Err(ClientError::Unauthorized) => return Err(ClientError::Unauthorized.into()),
            Err(e) => eprintln!("{} {}", "✗".red().bold(), e),
        }
    }
    Ok(())
}

fn show_stored_artifacts(asset: &Asset, config: &ClientConfig, transport: &HttpTransport) {
    let urls = stored_artifact_urls(asset, config);
    if urls.is_empty() {
        println!("  {}", "No stored artifacts".dimmed());
        return;
    }
    let mut panel = ArtifactPanel::new(config.artifact_timeout);
    let images: Vec<(ArtifactKind, String)> = urls
        .iter()
        .filter(|(kind, _)| kind.is_image())
        .cloned()
        .collect();
    panel.load_previews(&images, transport);
    for (kind, _) in &images {
        if let Some(loader) = panel.image(*kind) {
            print_load_state(*kind, loader.state());
        }
    }
    if let Some((_, url)) = urls.iter().find(|(kind, _)| *kind == ArtifactKind::Nfc) {
        panel.load_nfc(url, transport);
        match panel.nfc() {
            NfcLoadState::Loaded(payload) => println!(
                "{} {:<8} {} fields",
                "✓".green().bold(),
                "nfc",
                payload.display_fields().len()
            ),
            NfcLoadState::Failed { message, .. } => {
                println!("{} {:<8} {}", "✗".red().bold(), "nfc", message.red())
            }
            _ => {}
        }
    }
    panel.unmount();
}

fn print_history<D: assetlink_cli::AssetDirectory>(session: &ScanSession<D>) {
    if session.history().is_empty() {
        println!("  {}", "No scans yet".dimmed());
        return;
    }
    for entry in session.history().iter() {
        println!(
            "  {}  {:<16} {}",
            entry.scanned_at.format("%H:%M:%S"),
            entry.asset.display_tag(),
            entry.artifact_url.dimmed()
        );
    }
}

fn print_asset(asset: &Asset) {
    let rows = [
        ("Tag", Some(asset.display_tag().to_string())),
        ("ID", asset.id.clone()),
        ("Type", asset.asset_type.clone()),
        ("Brand", asset.brand.clone()),
        ("Model", asset.model.clone()),
        ("Status", asset.status.clone()),
        ("Priority", asset.priority.clone()),
        ("Location", asset.location_label()),
        ("Project", asset.project_label()),
    ];
    for (label, value) in rows {
        if let Some(value) = value {
            println!("  {:<10} {}", format!("{}:", label), value);
        }
    }
}

fn print_artifact(kind: ArtifactKind, artifact: &DigitalArtifact) {
    println!("{} {:<8} generated", "✓".green().bold(), kind);
    if let Some(url) = &artifact.url {
        println!("    URL:       {}", url);
    }
    if let Some(short) = &artifact.short_url {
        println!("    Short URL: {}", short);
    }
    let data = match &artifact.data {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => return,
        other => other.to_string(),
    };
    println!("    Data:      {}", abbreviate(&data, 48, 16));
}

fn print_load_state(kind: ArtifactKind, state: &LoadState) {
    match state {
        LoadState::Loaded { bytes, .. } => {
            println!("{} {:<8} loaded ({} bytes)", "✓".green().bold(), kind, bytes.len())
        }
        LoadState::LoadedBlob { object_url, .. } => {
            let size = object_url.blob().map(|b| b.bytes.len()).unwrap_or(0);
            println!(
                "{} {:<8} loaded via fallback ({} bytes, {})",
                "✓".green().bold(),
                kind,
                size,
                object_url.as_str().dimmed()
            )
        }
        LoadState::Failed { url, reason } => {
            println!("{} {:<8} {}", "✗".red().bold(), kind, "failed to load".red());
            println!("    URL:    {}", url);
            println!("    Reason: {}", reason);
        }
        pending => println!("{} {:<8} {}", "…".yellow(), kind, pending.name()),
    }
}

fn loaded_bytes(state: &LoadState) -> Option<Vec<u8>> {
    match state {
        LoadState::Loaded { bytes, .. } => Some(bytes.clone()),
        LoadState::LoadedBlob { object_url, .. } => object_url.blob().map(|b| b.bytes.clone()),
        _ => None,
    }
}

fn save_loaded(state: &LoadState, dir: &Path) -> anyhow::Result<()> {
    let (Some(url), Some(bytes)) = (state.url(), loaded_bytes(state)) else {
        return Ok(());
    };
    let name = file_name_of(url);
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create '{}'", dir.display()))?;
    let path = dir.join(name);
    std::fs::write(&path, bytes)
        .with_context(|| format!("Failed to write '{}'", path.display()))?;
    println!("    Saved:  {}", path.display());
    Ok(())
}

/// Last path segment of a URL without its query string.
fn file_name_of(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "artifact".to_string(),
    }
}

fn guess_kind(url: &str) -> ArtifactKind {
    if file_name_of(url).starts_with("barcode") {
        ArtifactKind::Barcode
    } else {
        ArtifactKind::Qr
    }
}
