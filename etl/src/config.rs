use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::PipelineError;
use crate::http_utils::RetryConfig;

/// Identifiers baked into SQL templates. The transformer rewrites each of
/// these literally to the configured value.
pub const DEFAULT_PROJECT_ID: &str = "crypto-price-pipeline";
pub const DEFAULT_DATASET_ID: &str = "crypto_data_pipeline";
pub const DEFAULT_RAW_TABLE_ID: &str = "raw_crypto_prices";
pub const DEFAULT_CLEAN_TABLE_ID: &str = "clean_crypto_data";

pub const DEFAULT_API_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko ids fetched when `asset_ids` is not configured.
pub const DEFAULT_ASSET_IDS: [&str; 25] = [
    "bitcoin",
    "ethereum",
    "tether",
    "binancecoin",
    "solana",
    "xrp",
    "cardano",
    "dogecoin",
    "shiba-inu",
    "avalanche-2",
    "polkadot",
    "litecoin",
    "chainlink",
    "tron",
    "polygon",
    "bitcoin-cash",
    "uniswap",
    "wrapped-bitcoin",
    "stellar",
    "monero",
    "ethereum-classic",
    "cosmos",
    "filecoin",
    "internet-computer",
    "optimism",
];

/// What the transformer does when the SQL template file is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingTemplatePolicy {
    /// Abort with a transform failure.
    Fail,
    /// Log and return without running anything.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackend {
    Postgres,
    Memory,
}

/// Runtime configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub raw_table_id: String,
    pub clean_table_id: String,
    pub key_file_path: PathBuf,
    pub transform_sql_path: PathBuf,
    pub missing_template: MissingTemplatePolicy,
    pub literal_substitution: bool,
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub asset_ids: Vec<String>,
    pub log_file: PathBuf,
    pub warehouse_backend: WarehouseBackend,
    pub settle_delay_secs: u64,
    pub query_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project_id: DEFAULT_PROJECT_ID.to_string(),
            dataset_id: DEFAULT_DATASET_ID.to_string(),
            raw_table_id: DEFAULT_RAW_TABLE_ID.to_string(),
            clean_table_id: DEFAULT_CLEAN_TABLE_ID.to_string(),
            key_file_path: PathBuf::from("service-account.json"),
            transform_sql_path: PathBuf::from("sql/transform_data.sql"),
            missing_template: MissingTemplatePolicy::Fail,
            literal_substitution: true,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            asset_ids: DEFAULT_ASSET_IDS.iter().map(|id| id.to_string()).collect(),
            log_file: PathBuf::from("pipeline.log"),
            warehouse_backend: WarehouseBackend::Postgres,
            settle_delay_secs: 10,
            query_timeout_secs: 300,
            retry: RetryConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from an optional config file and `PIPELINE_*`
    /// environment variables, on top of the defaults.
    ///
    /// The file name comes from `PIPELINE_CONFIG` (default `pipeline`, any
    /// extension the `config` crate understands). Nested keys use `__`, e.g.
    /// `PIPELINE_RETRY__MAX_ATTEMPTS=3`; `PIPELINE_ASSET_IDS` is a comma list.
    pub fn load() -> Result<Self, PipelineError> {
        let file_name = env::var("PIPELINE_CONFIG").unwrap_or_else(|_| "pipeline".to_string());

        let settings = Config::builder()
            .add_source(File::with_name(&file_name).required(false))
            .add_source(
                Environment::with_prefix("PIPELINE")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("asset_ids")
                    .try_parsing(true),
            )
            .build()?;

        let config: PipelineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would only fail later, mid-run.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (key, value) in [
            ("project_id", &self.project_id),
            ("dataset_id", &self.dataset_id),
            ("raw_table_id", &self.raw_table_id),
            ("clean_table_id", &self.clean_table_id),
        ] {
            if !is_valid_identifier(value) {
                return Err(PipelineError::Config(format!(
                    "{} must be non-empty and contain only letters, digits, '_' or '-': {:?}",
                    key, value
                )));
            }
        }

        if self.raw_table_id == self.clean_table_id {
            return Err(PipelineError::Config(
                "raw_table_id and clean_table_id must differ".to_string(),
            ));
        }

        if self.asset_ids.iter().all(|id| id.trim().is_empty()) {
            return Err(PipelineError::Config(
                "asset_ids must name at least one asset".to_string(),
            ));
        }

        if self.retry.timeout_seconds == 0 {
            return Err(PipelineError::Config(
                "retry.timeout_seconds must be at least 1".to_string(),
            ));
        }

        if self.query_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "query_timeout_secs must be at least 1".to_string(),
            ));
        }

        url::Url::parse(&self.api_base_url).map_err(|e| {
            PipelineError::Config(format!("Invalid api_base_url {}: {}", self.api_base_url, e))
        })?;

        Ok(())
    }

    /// Requested asset ids, trimmed, without blanks or repeats.
    pub fn requested_assets(&self) -> Vec<String> {
        let mut assets: Vec<String> = Vec::with_capacity(self.asset_ids.len());
        for id in &self.asset_ids {
            let id = id.trim();
            if !id.is_empty() && !assets.iter().any(|existing| existing == id) {
                assets.push(id.to_string());
            }
        }
        assets
    }
}

fn is_valid_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
