mod cmd;
mod config;
mod error;

use clap::Parser;
use config::{Cli, Effective};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let eff = match Effective::new(&cli.args) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = cmd::stream::run(eff).await {
        tracing::error!(error = %e, "users-stream terminated");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
