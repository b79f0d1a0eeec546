use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod api;
mod config;

use config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "supercommerce")]
#[command(about = "MCP tool server for the Supercommerce admin API", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "SUPERCOMMERCE_CONFIG", default_value = "supercommerce.toml")]
    config: PathBuf,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Absolute URL of the unary endpoint, announced to stream clients
    #[arg(long, env = "SUPERCOMMERCE_PUBLIC_URL")]
    public_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "supercommerce_server=info,supercommerce_mcp=info,tower_http=debug".into()
            }),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let args = Args::parse();

    tracing::info!("Starting Supercommerce MCP server");

    // Load configuration
    let mut config = ServerConfig::load(&args.config)?;
    if let Some(public_url) = args.public_url {
        config.mcp.public_url = Some(public_url);
    }
    tracing::info!("Backend: {}", config.backend.base_url);

    // Start API server
    let addr = format!("{}:{}", args.host, args.port);
    tracing::info!("Starting API server on {}", addr);

    api::serve(&addr, config).await?;

    Ok(())
}
