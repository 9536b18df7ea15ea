//! Shortlink Server: application entry point.

use clap::Parser;
use shortlink_server::Settings;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shortlink-server", version, about = "Shortlink RBAC API server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("shortlink_server=info,shortlink_db=info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;
    shortlink_server::serve(settings).await
}
