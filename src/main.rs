use clap::Parser;
use tracing_subscriber::EnvFilter;

use passfoo_api::cli::{self, Cli};
use passfoo_api::config::AppConfig;

#[tokio::main]
async fn main() {
    // Load .env if present so DB_DEFAULT, SECRET_KEY, etc. apply
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("passfoo_api=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    if let Err(e) = cli::run(cli, config).await {
        match std::env::var("CLI_VERBOSE").as_deref() {
            Ok("true") | Ok("1") => eprintln!("Error: {e:?}"),
            _ => eprintln!("Error: {e}"),
        }
        std::process::exit(1);
    }
}
