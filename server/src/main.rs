use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use server::game::GameOutcome;
use server::map::{choose_start_cells, load_map, parse_map, DEFAULT_MAP, DEFAULT_MAP_NAME};
use server::network::{Server, ServerConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Map file to play on (bundled map when omitted)
    #[arg(short, long)]
    map: Option<PathBuf>,

    /// Maximum number of players
    #[arg(short, long, default_value = "4")]
    capacity: usize,

    /// Seed for start room selection
    #[arg(short, long)]
    seed: Option<u64>,

    /// Seconds a player may take before losing their turn
    #[arg(short, long)]
    turn_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let (maze_name, mut grid) = match &args.map {
        Some(path) => load_map(path)?,
        None => (DEFAULT_MAP_NAME.to_string(), parse_map(DEFAULT_MAP)?),
    };

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let capacity = choose_start_cells(&mut grid, args.capacity, &mut rng);
    if capacity == 0 {
        return Err("the map has no room to start from".into());
    }

    info!("Starting server...");
    info!("Maze: {} ({} players max)", maze_name, capacity);
    if let Some(secs) = args.turn_timeout {
        info!("Turn timeout: {}s", secs);
    }

    let config = ServerConfig {
        capacity,
        turn_timeout: args.turn_timeout.map(Duration::from_secs),
        maze_name,
    };
    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, grid, config).await?;

    tokio::select! {
        result = server.run() => {
            match result?.outcome {
                GameOutcome::Won(id) => info!("Player {} won", id),
                GameOutcome::Aborted => info!("Game aborted"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
