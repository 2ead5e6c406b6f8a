//! Advisor CLI entry point.

use advisor::cli::{commands, Cli, Commands};
use advisor::config::Settings;
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.as_deref().map(Settings::expand_path);
    let settings = Settings::load_from(config_path.as_ref())?;

    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("advisor={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.temp_dir())?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&settings)?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings).await?;
        }

        Commands::Scrape { urls, output, upload } => {
            commands::run_scrape(&urls, output, upload, settings).await?;
        }

        Commands::Ingest { url, title, force } => {
            commands::run_ingest(&url, title.as_deref(), force, settings).await?;
        }

        Commands::Batch { file, force } => {
            commands::run_batch(&file, force, settings).await?;
        }

        Commands::Upload { input } => {
            commands::run_upload(input, settings).await?;
        }

        Commands::Ask {
            question,
            model,
            top_k,
            system,
        } => {
            commands::run_ask(&question, model, top_k, system, settings).await?;
        }

        Commands::Search {
            query,
            limit,
            min_score,
        } => {
            commands::run_search(&query, limit, min_score, settings).await?;
        }

        Commands::Chat { model } => {
            commands::run_chat(model, settings).await?;
        }

        Commands::Status => {
            commands::run_status(settings).await?;
        }

        Commands::Index { action } => {
            commands::run_index(&action, settings).await?;
        }

        Commands::Catalog { action } => {
            commands::run_catalog(&action, &settings)?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(&action, config_path, settings)?;
        }
    }

    Ok(())
}
