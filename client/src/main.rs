use clap::Parser;
use client::input::InputManager;
use client::network::Client;
use client::rendering::Renderer;
use log::info;
use shared::command::controls_help;
use shared::DEFAULT_PORT;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = default_server())]
    server: String,

    /// Name shown to the other players
    #[arg(short = 'n', long, default_value = "player")]
    name: String,
}

fn default_server() -> String {
    format!("127.0.0.1:{}", DEFAULT_PORT)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let mut renderer = Renderer::stdout();
    renderer.line("type C to start the game once everyone is here")?;
    for line in controls_help() {
        renderer.line(&line)?;
    }

    let mut client = Client::connect(&args.server, &args.name).await?;
    client.run(InputManager::stdin(), renderer).await?;

    Ok(())
}
