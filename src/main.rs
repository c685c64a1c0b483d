//! Parley CLI binary entry point.

use clap::Parser;
use parley::cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = parley::cli::run(cli).await {
        let notice = e.notice();
        eprintln!("Error: {}", notice.title);
        if let Some(message) = notice.message {
            eprintln!("  {message}");
        }
        std::process::exit(1);
    }
}
