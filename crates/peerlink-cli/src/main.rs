//! PeerLink CLI
//!
//! Runs the peer handshake over TCP: accept authenticated peers, dial one,
//! and manage the node identity and configuration.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use peerlink_core::{Identity, PeerInfo, PeerManager, ReadyPeer};
use peerlink_transport::FrameTransport;
use std::path::{Path, PathBuf};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

use config::Config;

/// PeerLink - authenticated, encrypted peer connections
#[derive(Parser)]
#[command(name = "peerlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path [default: ~/.config/peerlink/config.toml]
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept and authenticate incoming peers
    Listen {
        /// Listen address (overrides the config file)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Connect to a peer and run the handshake
    Dial {
        /// Peer address (host:port)
        #[arg(required = true)]
        address: String,

        /// Channel to join (overrides the config file)
        #[arg(long)]
        channel: Option<String>,
    },

    /// Generate a new identity key
    Keygen {
        /// Output file for the key
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the effective configuration
    Config {
        /// Write the default configuration to the config path
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = if cli.config.is_some() {
        Config::load(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        Config::load_or_default(&config_path)?
    };

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Listen { bind } => {
            if let Some(bind) = bind {
                config.network.listen_addr = bind;
            }
            config.validate()?;
            listen(&config).await?;
        }
        Commands::Dial { address, channel } => {
            if let Some(channel) = channel {
                config.network.channel = channel;
            }
            config.validate()?;
            dial(&address, &config).await?;
        }
        Commands::Keygen { output } => {
            generate_identity(output.as_deref())?;
        }
        Commands::Config { init } => {
            show_config(&config, &config_path, init)?;
        }
    }

    Ok(())
}

/// Load the configured identity, or fall back to a throwaway one.
fn node_identity(config: &Config) -> anyhow::Result<Identity> {
    let path = &config.node.key_file;
    if path.exists() {
        config::load_identity(path).with_context(|| format!("loading key {}", path.display()))
    } else {
        tracing::warn!(
            "No identity at {}; using an ephemeral one (run `peerlink keygen -o {}`)",
            path.display(),
            path.display()
        );
        Ok(Identity::generate())
    }
}

/// Accept peers until Ctrl+C
async fn listen(config: &Config) -> anyhow::Result<()> {
    let identity = node_identity(config)?;
    let (manager, mut ready_rx) = PeerManager::new(&config.effective_handshake(), identity)?;
    let listener = TcpListener::bind(&config.network.listen_addr).await?;

    println!("PeerLink node");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Peer ID: {}", manager.identity().peer_id());
    println!("Listen: {}", listener.local_addr()?);
    println!("Press Ctrl+C to stop");

    let reactor = {
        let manager = manager.clone();
        tokio::spawn(async move {
            while let Some(ready) = ready_rx.recv().await {
                print_peer(&ready.info);
                tokio::spawn(hold(ready, manager.clone()));
            }
        })
    };

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!("Accept failed: {}", e);
                        continue;
                    }
                };
                tracing::debug!("Accepted connection from {}", remote);
                let handle = manager.accept(stream, remote.to_string());
                tokio::spawn(async move {
                    match handle.await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => tracing::info!("Handshake with {} failed: {}", remote, e),
                        Err(e) => tracing::error!("Handshake task for {} panicked: {}", remote, e),
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down ({} peers connected)...", manager.len());
                break;
            }
        }
    }

    reactor.abort();
    Ok(())
}

/// Keep a ready peer's connection open until the remote leaves.
async fn hold(ready: ReadyPeer, manager: PeerManager) {
    let ReadyPeer { info, mut conn } = ready;
    loop {
        match conn.recv_frame().await {
            Ok(frame) => tracing::debug!("{} bytes from {}", frame.len(), info.id.short()),
            Err(e) => {
                if !e.is_closed() {
                    tracing::warn!("Connection to {} failed: {}", info.id.short(), e);
                }
                break;
            }
        }
    }
    manager.remove(&info.id);
    tracing::info!("Peer {} disconnected", info.id.short());
}

/// Dial one peer, report the outcome, and hang up
async fn dial(address: &str, config: &Config) -> anyhow::Result<()> {
    let identity = node_identity(config)?;
    let (manager, mut ready_rx) = PeerManager::new(&config.effective_handshake(), identity)?;

    let stream = TcpStream::connect(address)
        .await
        .with_context(|| format!("connecting to {address}"))?;
    let info = manager
        .dial(stream, config.network.channel.clone(), address)
        .await??;
    print_peer(&info);

    if let Some(mut ready) = ready_rx.recv().await {
        ready.conn.close().await?;
    }
    Ok(())
}

fn print_peer(info: &PeerInfo) {
    let direction = if info.outbound { "outbound" } else { "inbound" };
    println!("Peer {}", info.id);
    println!("  Direction: {}", direction);
    println!("  Channel: {}", info.channel);
    println!("  Address: {} (socket {})", info.net_address, info.remote_addr);
    println!(
        "  Security: {} / {} ({})",
        info.secure_suite, info.aead_suite, info.kind
    );
    println!("  RTT: {:?}", info.rtt);
}

/// Generate a new identity key
fn generate_identity(output: Option<&Path>) -> anyhow::Result<()> {
    println!("Generating new Ed25519 identity...");

    let identity = Identity::generate();
    println!("Public key: {}", hex::encode(identity.public_key()));
    println!("Peer ID: {}", identity.peer_id());

    if let Some(path) = output {
        if path.exists() {
            anyhow::bail!("{} already exists; refusing to overwrite", path.display());
        }
        config::save_identity(&identity, path)?;
        println!("Key saved to: {}", path.display());
        println!("\nKeep this file secure! It contains your private key.");
    } else {
        println!("\nKey not saved (use --output to save)");
    }

    Ok(())
}

/// Print, or initialize, the configuration
fn show_config(config: &Config, path: &Path, init: bool) -> anyhow::Result<()> {
    if init {
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        Config::default().save(path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    config.validate()?;
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
