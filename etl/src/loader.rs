use log::{error, info, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::models::IngestionBatch;
use crate::warehouse::{raw_price_schema, retry_async, TableRef, Warehouse, WarehouseError};

/// Appends ingestion batches to the raw price table, bootstrapping the
/// dataset and table on first use.
pub struct Loader<'a> {
    warehouse: &'a dyn Warehouse,
    config: &'a PipelineConfig,
}

impl<'a> Loader<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, config: &'a PipelineConfig) -> Self {
        Self { warehouse, config }
    }

    pub fn raw_table(&self) -> TableRef {
        TableRef::new(&self.config.dataset_id, &self.config.raw_table_id)
    }

    /// Create the dataset unless it already exists.
    pub async fn ensure_dataset(&self) -> Result<(), PipelineError> {
        let dataset = self.config.dataset_id.as_str();
        let label = format!("{}.{}", self.config.project_id, dataset);

        let exists = retry_async("check dataset", &self.config.retry, || {
            self.warehouse.dataset_exists(dataset)
        })
        .await
        .map_err(|e| bootstrap_failure("dataset", &label, e))?;

        if exists {
            info!("Dataset {} already exists.", label);
            return Ok(());
        }

        match retry_async("create dataset", &self.config.retry, || {
            self.warehouse.create_dataset(dataset)
        })
        .await
        {
            Ok(()) => {
                info!("Dataset {} created.", label);
                Ok(())
            }
            Err(WarehouseError::AlreadyExists(_)) => {
                warn!(
                    "Dataset {} already existed but wasn't found on the first check.",
                    label
                );
                Ok(())
            }
            Err(e) => Err(bootstrap_failure("dataset", &label, e)),
        }
    }

    /// Create the raw table with the fixed schema unless it already exists.
    /// An existing table is left untouched.
    pub async fn ensure_table(&self) -> Result<(), PipelineError> {
        let table = self.raw_table();
        let label = format!("{}.{}", self.config.project_id, table);

        let exists = retry_async("check table", &self.config.retry, || {
            self.warehouse.table_exists(&table)
        })
        .await
        .map_err(|e| bootstrap_failure("table", &label, e))?;

        if exists {
            info!("Table {} already exists.", label);
            return Ok(());
        }

        let schema = raw_price_schema();
        match retry_async("create table", &self.config.retry, || {
            self.warehouse.create_table(&table, &schema)
        })
        .await
        {
            Ok(()) => {
                info!("Table {} created.", label);
                Ok(())
            }
            Err(WarehouseError::AlreadyExists(_)) => {
                warn!(
                    "Table {} already existed but wasn't found on the first check.",
                    label
                );
                Ok(())
            }
            Err(e) => Err(bootstrap_failure("table", &label, e)),
        }
    }

    /// Bootstrap, then append the whole batch in one insert.
    ///
    /// Any per-row error fails the load even though other rows may have
    /// landed. The insert itself is never retried. Returns the row count.
    pub async fn load(&self, batch: &IngestionBatch) -> Result<usize, PipelineError> {
        info!(
            "Starting data load to {} warehouse (run {})...",
            self.warehouse.name(),
            batch.run_id
        );

        self.ensure_dataset().await?;
        self.ensure_table().await?;

        let rows = batch.rows();
        if rows.is_empty() {
            warn!("No rows to insert.");
            return Ok(0);
        }

        let table = self.raw_table();
        let row_errors = self
            .warehouse
            .insert_rows(&table, &rows)
            .await
            .map_err(|e| {
                error!("An error occurred during warehouse load: {}", e);
                PipelineError::Load(format!("Insert into {} failed: {}", table, e))
            })?;

        if !row_errors.is_empty() {
            let details: Vec<String> = row_errors.iter().map(|e| e.to_string()).collect();
            error!(
                "Encountered errors while inserting rows: {}",
                details.join("; ")
            );
            return Err(PipelineError::Load(format!(
                "{} of {} rows rejected by {}",
                row_errors.len(),
                rows.len(),
                table
            )));
        }

        info!(
            "{} rows successfully loaded to table '{}'.",
            rows.len(),
            self.config.raw_table_id
        );
        Ok(rows.len())
    }
}

fn bootstrap_failure(kind: &str, label: &str, error: WarehouseError) -> PipelineError {
    error!(
        "An error occurred while creating or checking for {} {}: {}",
        kind, label, error
    );
    PipelineError::Load(format!("Warehouse {} operation failed: {}", kind, error))
}
