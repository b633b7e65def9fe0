mod config;
mod net;
mod tui;

use clap::Parser;

use config::ClientConfig;

#[derive(Parser)]
#[command(name = "dual-client")]
#[command(about = "Dual game client")]
struct Args {
    #[arg(short, long)]
    server: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let mut config = ClientConfig::default();
    if let Some(server) = args.server {
        config.server_address = server;
    }

    tui::run(config).await
}
