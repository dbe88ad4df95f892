use clap::Parser;
use log::{error, info};
use server::{Server, ServerConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Snapshot broadcast period in milliseconds
    #[arg(short, long, default_value = "10")]
    broadcast_interval_ms: u64,

    /// Maximum concurrent logged-in sessions
    #[arg(short, long, default_value = "32")]
    max_sessions: usize,

    /// Keep a disconnected session's tank in snapshots instead of despawning it
    #[arg(long)]
    keep_ghosts: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        broadcast_interval: Duration::from_millis(args.broadcast_interval_ms.max(1)),
        max_sessions: args.max_sessions,
        despawn_on_disconnect: !args.keep_ghosts,
    };

    info!("Starting server...");
    info!(
        "Broadcasting every {:?}, up to {} sessions",
        config.broadcast_interval, config.max_sessions
    );
    if args.keep_ghosts {
        info!("Disconnected tanks stay in snapshots (--keep-ghosts)");
    }

    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
