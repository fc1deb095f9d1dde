//! Websocket server for the SWIR camera.

use anyhow::Result;
use camera_server::CommonServerArgs;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Websocket control and streaming server for the SWIR camera")]
struct Args {
    #[command(flatten)]
    server: CommonServerArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if !args.server.static_dir.join("index.html").exists() {
        warn!(
            "No index.html in {}, the UI port will only return 404s. Build the frontend first.",
            args.server.static_dir.display()
        );
    }

    info!("Starting camera server with {:?} sensor...", args.server.sensor);
    camera_server::server::run_server(args.server).await
}
