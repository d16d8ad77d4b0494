use anyhow::Result;
use clap::Parser;
use tracing::warn;

use zonechat::{
    cli::{Cli, Command},
    client, directory, server,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    // Logs go to stderr; stdout carries only console output, so it can
    // be piped or scripted against.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Server(args) => server::run(args).await,
        Command::Client(args) => client::run(args).await,
        Command::Nameserver(args) => directory::server::run(args).await,
    };

    if let Err(err) = &result {
        warn!("exited with error: {err:?}");
    }
    result
}
