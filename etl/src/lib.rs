pub mod coingecko_service;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http_utils;
pub mod jobs;
pub mod loader;
pub mod logging;
pub mod memory_warehouse;
pub mod models;
pub mod postgres_service;
pub mod transformer;
pub mod warehouse;

pub use coingecko_service::CoinGeckoFetcher;
pub use config::{MissingTemplatePolicy, PipelineConfig, WarehouseBackend};
pub use credentials::ServiceAccountKey;
pub use error::PipelineError;
pub use http_utils::{HttpClient, RetryConfig};
pub use jobs::{run_price_snapshot, RunReport};
pub use loader::Loader;
pub use memory_warehouse::InMemoryWarehouse;
pub use models::{IngestionBatch, PriceQuote, RawPriceRow};
pub use postgres_service::{PostgresConfig, PostgresWarehouse};
pub use transformer::{transform, SqlTemplate, TemplateNames, TransformOutcome};
pub use warehouse::{TableRef, Warehouse, WarehouseError};
