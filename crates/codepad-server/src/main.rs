//! HTTP server hosting the Codepad execution core for the editor UI

use anyhow::Result;
use clap::Parser;
use codepad_core::config::ConfigLoader;
use codepad_core::CodePad;
use codepad_server::{shutdown_signal, CodepadServer, ServerConfig};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Codepad Server - run untrusted snippets for the editor")]
struct Cli {
    #[clap(long, short, help = "Configuration file (defaults to ./codepad.yaml or the user config dir)")]
    config: Option<PathBuf>,

    #[clap(long, help = "Override server.bind_addr from the configuration")]
    bind_addr: Option<String>,

    #[clap(long, short, help = "Log level; overrides logging.level from the configuration")]
    log_level: Option<String>,

    #[clap(long, help = "Disable CORS headers")]
    no_cors: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(ConfigLoader::default_path);
    let config = ConfigLoader::from_file_or_default(&config_path).await?;

    // Initialize logger
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_level_filter = level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    log::info!("Configuration loaded from {}", config_path.display());

    let mut server_config = ServerConfig::from_section(&config.server)?.with_logging(true);
    if let Some(bind_addr) = cli.bind_addr.as_deref() {
        server_config = server_config.with_bind_addr_str(bind_addr)?;
    }
    if cli.no_cors {
        server_config = server_config.with_cors(false);
    }

    let codepad = CodePad::from_config(&config);
    log::info!(
        "Languages available: {}",
        codepad.registry().ids().join(", ")
    );

    let server = CodepadServer::with_config(codepad, server_config);
    if let Err(e) = server.serve_with_shutdown(shutdown_signal()).await {
        log::error!("Server failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}
