//! swapmesh daemon: headless peer for the atomic-swap order book.
//!
//! Usage:
//!
//!   swapmesh-daemon [OPTIONS]
//!
//! Options:
//!
//!   --config <PATH>           Load settings from a JSON file
//!   --listen <MULTIADDR>      P2P listen address (repeatable)
//!   --bootstrap <MULTIADDR>   Bootstrap peer (repeatable)
//!   --network <NET>           mainnet or testnet (default: testnet)
//!   --identity-file <PATH>    libp2p identity file
//!   --mnemonic-env <VAR>      Variable holding the wallet mnemonic
//!
//! Environment:
//!
//!   SWAPMESH_MNEMONIC   Wallet mnemonic (default variable)
//!   RUST_LOG            Log level filter (default: info)
//!
//! The daemon runs until interrupted with Ctrl+C.

use std::sync::Arc;

use clap::Parser;
use swapmesh_app::{AuthService, OrdersService, RoomService, Service, SharedApp, SwapAppOptions};
use swapmesh_crypto::mnemonic::generate_mnemonic;
use swapmesh_network::PeerOverlay;
use swapmesh_types::Coin;
use zeroize::Zeroizing;

mod config;
mod identity_io;

/// Word count of a generated mnemonic.
const GENERATED_MNEMONIC_WORDS: usize = 12;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = config::CliArgs::parse();

    let daemon_config = match &cli.config {
        Some(path) => match config::DaemonConfig::load(path) {
            Ok(cfg) => cfg.merge_cli(&cli),
            Err(e) => {
                tracing::error!("failed to load config file: {e}");
                std::process::exit(1);
            }
        },
        None => config::DaemonConfig::default().merge_cli(&cli),
    };

    if let Err(e) = run_daemon(daemon_config, &cli.mnemonic_env).await {
        tracing::error!("daemon error: {e}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Daemon main logic
// ---------------------------------------------------------------------------

async fn run_daemon(cfg: config::DaemonConfig, mnemonic_env: &str) -> Result<(), String> {
    cfg.validate()?;

    // -----------------------------------------------------------------------
    // 1. Mnemonic
    // -----------------------------------------------------------------------

    let mnemonic = Zeroizing::new(match std::env::var(mnemonic_env) {
        Ok(words) => {
            tracing::info!(var = mnemonic_env, "mnemonic read from environment");
            words
        }
        Err(_) => {
            let generated = generate_mnemonic(GENERATED_MNEMONIC_WORDS)
                .map_err(|e| format!("mnemonic generation failed: {e}"))?;
            let words = generated.as_str().to_string();

            println!();
            println!("============================================================");
            println!("  NEW MNEMONIC GENERATED -- SAVE IT!");
            println!("============================================================");
            println!();
            println!("  {words}");
            println!();
            println!("  Set {mnemonic_env} to reuse these accounts next time.");
            println!("============================================================");
            println!();
            words
        }
    });

    // -----------------------------------------------------------------------
    // 2. Overlay
    // -----------------------------------------------------------------------

    let identity_path = cfg.identity_path();
    let persisted = identity_io::load_identity(&identity_path)?;

    let overlay = PeerOverlay::start(cfg.overlay.clone(), persisted.clone())
        .await
        .map_err(|e| format!("overlay start failed: {e}"))?;

    if persisted.as_ref() != Some(overlay.persisted_identity()) {
        identity_io::save_identity(&identity_path, overlay.persisted_identity())?;
    }

    tracing::info!(
        peer_id = %overlay.local_peer_id(),
        network = %cfg.network,
        bootstrap_count = cfg.overlay.bootstrap_peers.len(),
        "overlay started"
    );

    // -----------------------------------------------------------------------
    // 3. Services and shared app
    // -----------------------------------------------------------------------

    let auth = Arc::new(AuthService::new(&mnemonic, Coin::ALL).map_err(|e| e.to_string())?);
    let orders = Arc::new(OrdersService::new(cfg.orders.clone()));
    let services: Vec<Arc<dyn Service>> = vec![
        auth.clone(),
        Arc::new(RoomService::new(overlay.clone())),
        orders.clone(),
    ];

    let options = SwapAppOptions {
        config: cfg.app_config(),
        services,
        ..SwapAppOptions::default()
    };
    let app = SharedApp::global()
        .setup(options, false)
        .map_err(|e| format!("swap app setup failed: {e}"))?;

    // -----------------------------------------------------------------------
    // 4. Print status summary
    // -----------------------------------------------------------------------

    println!();
    println!("============================================================");
    println!("  swapmesh daemon running");
    println!("============================================================");
    println!("  Peer ID:      {}", overlay.local_peer_id());
    println!("  Network:      {}", app.network());
    println!("  Identity:     {}", identity_path.display());
    for &coin in auth.coins() {
        if let Ok(Some(address)) = auth.address(coin) {
            println!("  {:<13} {address}", format!("{coin}:"));
        }
    }
    println!("============================================================");
    println!("  Press Ctrl+C to stop");
    println!("============================================================");
    println!();

    // -----------------------------------------------------------------------
    // 5. Wait for shutdown signal
    // -----------------------------------------------------------------------

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(%e, "failed to listen for Ctrl+C");
    }
    tracing::info!("received Ctrl+C, shutting down...");

    orders
        .stop()
        .await
        .map_err(|e| format!("order book stop failed: {e}"))?;
    overlay
        .stop()
        .await
        .map_err(|e| format!("overlay stop failed: {e}"))?;

    tracing::info!("daemon stopped");
    Ok(())
}
