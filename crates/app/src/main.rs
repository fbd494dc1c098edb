use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod seed;

use cli::{Cli, normalize_sqlite_url, prepare_sqlite_dir};

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "app=info,services=info,storage=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine.
    dotenvy::dotenv().ok();
    init_logging();

    let mut cli = Cli::parse();
    cli.db_url = normalize_sqlite_url(&cli.db_url);
    prepare_sqlite_dir(&cli.db_url)
        .with_context(|| format!("cannot create directory for {}", cli.db_url))?;

    commands::run(cli).await
}
