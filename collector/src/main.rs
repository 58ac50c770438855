use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("collector=info,reqwest=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    collector::cli::run().await
}
