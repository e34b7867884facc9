//! Run driver: wires configuration, logo, source resolution and scheduling.

use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::models::batch::BatchResult;
use crate::models::logo::LogoAsset;
use crate::services::processing::{ClientSettings, ProcessingClient};
use crate::services::scheduler::BatchScheduler;
use crate::services::source::SourceResolver;

/// Execute one batch run.
///
/// Startup problems (missing logo, malformed folder reference, unreadable
/// input directory) are returned as errors. Once processing starts, per-image
/// failures only show up in the returned counts.
pub async fn run(config: &AppConfig) -> anyhow::Result<BatchResult> {
    let started = Instant::now();

    let logo = Arc::new(LogoAsset::discover(&config.assets_dir)?);

    let source = config.image_source()?;
    let resolver = SourceResolver::new(&config.shared_folder_origin, config.request_timeout())?;
    let locations = resolver.resolve(&source).await?;

    tokio::fs::create_dir_all(&config.output_dir).await?;

    let client = ProcessingClient::new(ClientSettings::from(config), logo)?;
    let scheduler = BatchScheduler::new(config.concurrency_mode, config.max_concurrency);
    let result = scheduler.run(&client, &locations).await;

    tracing::info!(
        succeeded = result.succeeded,
        failed = result.failed,
        total = result.total(),
        elapsed_secs = started.elapsed().as_secs(),
        output_dir = %config.output_dir.display(),
        "Batch complete"
    );

    Ok(result)
}
