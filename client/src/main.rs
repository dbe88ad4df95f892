use clap::Parser;
use client::network::Client;
use log::{error, info};
use macroquad::window::Conf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: usize,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Tank Netcode Client".to_owned(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Controls: W/S to drive, A/D to turn, mouse to aim, left click to fire");

    let mut client = match Client::new(&args.server, args.width, args.height) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to {}: {}", args.server, e);
            return;
        }
    };

    if let Err(e) = client.run().await {
        error!("Client error: {}", e);
    }
}
