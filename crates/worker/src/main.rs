use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prism_core::manifest::ResourceManifest;
use prism_worker::config::WorkerConfig;
use prism_worker::engine::ComfyEngine;
use prism_worker::handler;

/// Reads one JSON job event from stdin, runs it against the local
/// engine, and writes the JSON result to stdout.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prism_worker=info,prism_comfyui=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = WorkerConfig::from_env();
    tracing::info!(api_url = %config.api_url, workflow = %config.workflow_path.display(), "worker starting");

    let manifest = match &config.manifest_path {
        Some(path) => ResourceManifest::from_path(path).map_err(anyhow::Error::msg)?,
        None => ResourceManifest::default(),
    };

    let engine = ComfyEngine::new(&config);

    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    let event: serde_json::Value = serde_json::from_str(&input)?;

    let output = handler::handle(&engine, &manifest, &config, event).await;
    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}
