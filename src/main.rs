use anyhow::Result;
use clap::{Parser, Subcommand};
use housing_dashboard::config::{AppConfig, MapStyle};
use housing_dashboard::dashboard::{Dashboard, Selection};
use housing_dashboard::{data, render, server};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the data and serve the dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Write the joined suburb table and the initial dashboard view to disk
    Export {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            let (app_config, dashboard) = build_dashboard(config).await?;
            server::start_server(app_config, dashboard).await?;
        }
        Commands::Export { config } => {
            let (app_config, dashboard) = build_dashboard(config).await?;
            let view = dashboard.view(&Selection::Unfiltered);
            let written = render::export(&app_config, dashboard.suburbs(), &view)?;
            info!("Export complete: {:?}", written);
        }
    }

    Ok(())
}

async fn build_dashboard(config_path: &Path) -> Result<(AppConfig, Dashboard)> {
    info!("Using config {:?}", config_path);
    let app_config = AppConfig::load_from_file(config_path)?;
    let style = MapStyle::resolve(&app_config.map);

    let source = data::load_data(&app_config).await?;
    let dashboard = Dashboard::build(source, &app_config, &style)?;

    Ok((app_config, dashboard))
}
