use log::{error, info};
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use crate::coingecko_service::CoinGeckoFetcher;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::loader::Loader;
use crate::models::IngestionBatch;
use crate::transformer::{transform, TransformOutcome};
use crate::warehouse::Warehouse;

/// What one successful run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub rows_loaded: usize,
    pub transform: TransformOutcome,
}

/// Fetch → load → transform, once.
///
/// Each stage logs its own failure; this function only adds the final
/// critical line and stops. Nothing is rolled back: if the transform fails
/// after a load, the raw table keeps the new rows and the clean table stays
/// stale.
pub async fn run_price_snapshot(
    config: &PipelineConfig,
    fetcher: &CoinGeckoFetcher,
    warehouse: &dyn Warehouse,
) -> Result<RunReport, PipelineError> {
    let result = run_stages(config, fetcher, warehouse).await;

    match &result {
        Ok(report) => info!(
            "Pipeline executed successfully (run {}, {} rows).",
            report.run_id, report.rows_loaded
        ),
        Err(PipelineError::Fetch(_)) => {
            error!("CRITICAL - Pipeline failed. No data to process.")
        }
        Err(e) => error!("CRITICAL - Pipeline execution failed: {}", e),
    }

    result
}

async fn run_stages(
    config: &PipelineConfig,
    fetcher: &CoinGeckoFetcher,
    warehouse: &dyn Warehouse,
) -> Result<RunReport, PipelineError> {
    // Step 1: fetch
    let assets = config.requested_assets();
    let quotes = fetcher.fetch_quotes(&assets).await?;
    if quotes.is_empty() {
        error!("API returned no data for any of the {} requested assets", assets.len());
        return Err(PipelineError::Fetch("empty response".to_string()));
    }

    // Step 2: load
    let batch = IngestionBatch::new(quotes);
    let rows_loaded = Loader::new(warehouse, config).load(&batch).await?;

    // Streamed rows can take a moment to become visible to queries.
    if config.settle_delay_secs > 0 {
        info!(
            "Waiting {}s for loaded rows to become queryable...",
            config.settle_delay_secs
        );
        sleep(Duration::from_secs(config.settle_delay_secs)).await;
    }

    // Step 3: transform
    let transform = transform(config, warehouse).await?;

    Ok(RunReport {
        run_id: batch.run_id,
        rows_loaded,
        transform,
    })
}
