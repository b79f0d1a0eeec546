// Offline check of the commerce tool manifest

use anyhow::Result;
use supercommerce_mcp::tools::commerce::all_tools;
use supercommerce_mcp::tools::{BackendClient, BackendConfig, ToolRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_target(false)
        .init();

    // No request is sent; the client only has to exist.
    let base_url =
        std::env::var("SUPERCOMMERCE_BASE_URL").unwrap_or_else(|_| "http://localhost".to_string());
    let client = BackendClient::new(BackendConfig::new(&base_url)?)?;

    let reports = ToolRegistry::inspect(&all_tools(&client));
    let mut failures = 0;

    for report in &reports {
        match &report.error {
            None => println!("ok       {}", report.name),
            Some(error) => {
                failures += 1;
                println!("invalid  {}: {}", report.name, error);
            }
        }
    }

    println!();
    println!("{} tool(s) checked, {} invalid", reports.len(), failures);

    if failures > 0 {
        std::process::exit(1);
    }

    Ok(())
}
