use async_trait::async_trait;
use log::warn;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use crate::http_utils::{calculate_backoff, RetryConfig};
use crate::models::RawPriceRow;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Connection, pool or transport trouble. The only retryable kind.
    #[error("Warehouse unavailable: {0}")]
    Unavailable(String),

    #[error("Query error: {0}")]
    Query(String),
}

impl WarehouseError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, WarehouseError::Unavailable(_))
    }
}

/// Fully qualified table location inside the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Float,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub nullable: bool,
}

impl ColumnSpec {
    pub const fn nullable(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            nullable: true,
        }
    }
}

pub type TableSchema = Vec<ColumnSpec>;

/// Schema of the append-only raw price table.
pub fn raw_price_schema() -> TableSchema {
    vec![
        ColumnSpec::nullable("currency_id", FieldType::String),
        ColumnSpec::nullable("price_usd", FieldType::Float),
        ColumnSpec::nullable("market_cap_usd", FieldType::Float),
        ColumnSpec::nullable("vol_24hr_usd", FieldType::Float),
        ColumnSpec::nullable("change_24hr_usd", FieldType::Float),
        ColumnSpec::nullable("ingestion_time", FieldType::Timestamp),
    ]
}

/// A row the warehouse refused during a bulk insert.
#[derive(Debug, Clone, PartialEq)]
pub struct RowInsertError {
    pub index: usize,
    pub message: String,
}

impl fmt::Display for RowInsertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.index, self.message)
    }
}

/// Operations the pipeline needs from a data warehouse.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Short backend name for log lines.
    fn name(&self) -> &'static str;

    async fn dataset_exists(&self, dataset: &str) -> Result<bool, WarehouseError>;

    /// Fails with [`WarehouseError::AlreadyExists`] when someone else got there first.
    async fn create_dataset(&self, dataset: &str) -> Result<(), WarehouseError>;

    async fn table_exists(&self, table: &TableRef) -> Result<bool, WarehouseError>;

    /// Fails with [`WarehouseError::AlreadyExists`] when the table is already there.
    async fn create_table(
        &self,
        table: &TableRef,
        schema: &[ColumnSpec],
    ) -> Result<(), WarehouseError>;

    /// Append rows in one request. Rows the warehouse rejects come back in the
    /// returned list; the others may still have landed.
    async fn insert_rows(
        &self,
        table: &TableRef,
        rows: &[RawPriceRow],
    ) -> Result<Vec<RowInsertError>, WarehouseError>;

    /// Submit a statement and wait for it to finish.
    async fn run_query(&self, sql: &str) -> Result<(), WarehouseError>;
}

/// Run a warehouse call, retrying [`WarehouseError::Unavailable`] with
/// exponential backoff.
pub async fn retry_async<T, F, Fut>(
    operation_name: &str,
    retry_config: &RetryConfig,
    operation: F,
) -> Result<T, WarehouseError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, WarehouseError>>,
{
    let max_attempts = retry_config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let backoff_ms = calculate_backoff(
                    attempt,
                    retry_config.initial_backoff_ms,
                    retry_config.backoff_multiplier,
                );
                warn!(
                    "{} failed (attempt {}/{}), retrying in {}ms: {}",
                    operation_name, attempt, max_attempts, backoff_ms, e
                );
                sleep(Duration::from_millis(backoff_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
