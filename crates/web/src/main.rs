//! guacpool admin API server

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use guacpool_web::ServerConfig;

#[derive(Parser)]
#[command(name = "guacpool")]
#[command(about = "guacpool - IPv4 pool administration for Guacamole desktops")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "GUACPOOL_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(short, long, env = "GUACPOOL_LISTEN")]
    listen: Option<SocketAddr>,

    /// SQLite database path
    #[arg(long, env = "GUACPOOL_DB")]
    db: Option<PathBuf>,

    /// Token required on /api requests
    #[arg(long, env = "GUACPOOL_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Directory holding a prebuilt UI bundle
    #[arg(long, env = "GUACPOOL_UI_DIR")]
    ui_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(ServerConfig, bool)> {
        let path = self
            .config
            .unwrap_or_else(|| guacpool_common::default_store_path().join("config.toml"));
        let mut config = ServerConfig::load(&path)?;

        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(db) = self.db {
            config.db_path = db;
        }
        if let Some(token) = self.admin_token {
            config.admin_token = Some(token);
        }
        if let Some(dir) = self.ui_dir {
            config.ui_dir = Some(dir);
        }

        Ok((config, self.debug))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, debug) = Cli::parse().into_config()?;

    // Initialize logging
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("guacpool v{}", guacpool_common::VERSION);
    info!("Using database {:?}", config.db_path);

    guacpool_web::serve(config).await
}
