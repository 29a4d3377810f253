#![allow(dead_code)]

use price_etl::{PipelineConfig, RetryConfig};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Config pointed at a mock API, with no retries and no settle delay.
pub fn test_config(api_base_url: &str, transform_sql_path: &Path) -> PipelineConfig {
    PipelineConfig {
        api_base_url: api_base_url.to_string(),
        asset_ids: vec!["bitcoin".to_string(), "ethereum".to_string(), "tether".to_string()],
        transform_sql_path: transform_sql_path.to_path_buf(),
        settle_delay_secs: 0,
        retry: RetryConfig::no_retry(),
        ..PipelineConfig::default()
    }
}

pub fn sql_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp sql file");
    file.write_all(contents.as_bytes()).expect("write sql");
    file
}

pub const TRANSFORM_SQL: &str = "CREATE OR REPLACE TABLE \
    `crypto-price-pipeline.crypto_data_pipeline.clean_crypto_data` AS \
    SELECT * FROM `crypto-price-pipeline.crypto_data_pipeline.raw_crypto_prices`";
