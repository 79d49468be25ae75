use cefbit::{
    Config, EngineEvent, PieceStore, StaticTracker, TcpConnector, TorrentEngine, TorrentMeta,
};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to $CEFBIT_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download a torrent from the given peers
    Download {
        /// Torrent metadata record (JSON)
        #[arg(short, long)]
        meta: PathBuf,

        /// Peer address, repeatable
        #[arg(short, long = "peer", required = true)]
        peers: Vec<SocketAddr>,

        /// Directory for the payload (overrides download_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a summary of a metadata record
    Info {
        #[arg(short, long)]
        meta: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { meta } => {
            let meta = TorrentMeta::load(&meta).await?;
            println!("info hash:    {}", meta.info_hash);
            if let Some(name) = &meta.name {
                println!("name:         {}", name);
            }
            println!("length:       {}", meta.length);
            println!("piece length: {}", meta.piece_length);
            println!("pieces:       {}", meta.piece_count());
        }
        Commands::Download {
            meta,
            peers,
            output,
        } => {
            let meta = TorrentMeta::load(&meta).await?;
            let dir = output.unwrap_or_else(|| config.download_dir.clone());
            let path = dir.join(meta.info_hash.to_hex());

            let store = PieceStore::new(&meta, path.clone())
                .with_pending_timeout(config.pending_timeout());
            let engine = TorrentEngine::new(
                meta,
                store,
                Arc::new(TcpConnector::new(config.connect_timeout())),
                Arc::new(StaticTracker::new(peers)),
            )
            .with_mode(config.mode)
            .with_settings(config.manager_settings());

            let mut handle = engine.spawn()?;
            let cancel = handle.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupted, stopping");
                    cancel.cancel();
                }
            });

            while let Some(event) = handle.next_event().await {
                match event {
                    EngineEvent::PieceCompleted { index } => {
                        tracing::info!("piece {} done, {:.1}%", index, handle.progress() * 100.0)
                    }
                    EngineEvent::PieceRejected { index } => {
                        tracing::warn!("piece {} failed verification", index)
                    }
                    EngineEvent::Finished => {
                        tracing::info!("saved to {}", path.display());
                        break;
                    }
                    EngineEvent::Stopped => break,
                }
            }
            handle.join().await?;
        }
    }

    Ok(())
}
