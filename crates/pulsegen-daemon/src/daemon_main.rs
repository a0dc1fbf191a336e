//! `pulsegend`: serve the PulseGen theme bridge.
//!
//! Run with a config file, or override its values from the command line:
//!   pulsegend --config pulsegen.toml
//!   pulsegend --listen 127.0.0.1:8765 --theme-name Midnight --theme-css midnight.css

use clap::Parser;
use pulsegen_daemon::{DaemonConfig, ThemeConfig, server};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pulsegend", version, about = "PulseGen theme bridge daemon")]
struct Args {
    /// Config file (TOML). Missing files fall back to defaults.
    #[arg(long, env = "PULSEGEN_CONFIG", default_value = "pulsegen.toml")]
    config: PathBuf,

    /// Address to listen on.
    #[arg(long, env = "PULSEGEN_LISTEN")]
    listen: Option<SocketAddr>,

    /// Name of the theme to deploy to every page that reports ready.
    #[arg(long)]
    theme_name: Option<String>,

    /// Stylesheet for the deployed theme.
    #[arg(long, requires = "theme_name")]
    theme_css: Option<PathBuf>,

    /// Script for the deployed theme.
    #[arg(long, requires = "theme_name")]
    theme_js: Option<PathBuf>,
}

impl Args {
    fn apply(self, config: &mut DaemonConfig) {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(name) = self.theme_name {
            config.theme = Some(ThemeConfig {
                name,
                css_path: self.theme_css,
                js_path: self.theme_js,
            });
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pulsegend=info".parse()?)
                .add_directive("pulsegen_daemon=info".parse()?)
                .add_directive("pulsegen_manager=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let mut config = DaemonConfig::load(&args.config).await?;
    args.apply(&mut config);
    config.validate()?;

    if let Some(theme) = &config.theme {
        tracing::info!("Auto-deploying theme '{}'", theme.name);
    }

    server::run(config).await
}
