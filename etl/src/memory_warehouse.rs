use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use crate::models::RawPriceRow;
use crate::warehouse::{ColumnSpec, RowInsertError, TableRef, Warehouse, WarehouseError};

#[derive(Debug, Default)]
struct StoredTable {
    schema: Vec<ColumnSpec>,
    rows: Vec<RawPriceRow>,
}

#[derive(Debug, Default)]
struct State {
    datasets: HashSet<String>,
    tables: HashMap<TableRef, StoredTable>,
    queries: Vec<String>,
    insert_calls: usize,
    create_dataset_calls: usize,
    create_table_calls: usize,
    rejected_currencies: HashSet<String>,
    query_failure: Option<String>,
    hide_existing: bool,
}

/// Warehouse kept in process memory.
///
/// Used for dry runs (`warehouse_backend = "memory"`) and tests. Queries are
/// recorded, not executed. A few knobs inject the failure modes a real
/// warehouse produces: per-row insert errors, failing queries, and a create
/// racing a concurrent creator.
#[derive(Debug, Default)]
pub struct InMemoryWarehouse {
    state: Mutex<State>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows with these `currency_id`s come back as per-row insert errors.
    pub fn rejecting_currencies<I, S>(mut self, currencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .get_mut()
            .rejected_currencies
            .extend(currencies.into_iter().map(Into::into));
        self
    }

    /// Every `run_query` fails with this message.
    pub fn failing_queries(mut self, message: impl Into<String>) -> Self {
        self.state.get_mut().query_failure = Some(message.into());
        self
    }

    /// Existence checks answer "absent" even for existing objects, so the
    /// following create hits "already exists", as when another process
    /// creates the object between the check and the create.
    pub fn racing_creator(mut self) -> Self {
        self.state.get_mut().hide_existing = true;
        self
    }

    pub async fn seed_dataset(&self, dataset: &str) {
        self.state.lock().await.datasets.insert(dataset.to_string());
    }

    pub async fn seed_table(&self, table: &TableRef, schema: Vec<ColumnSpec>) {
        let mut state = self.state.lock().await;
        state.datasets.insert(table.dataset.clone());
        state.tables.insert(
            table.clone(),
            StoredTable {
                schema,
                rows: Vec::new(),
            },
        );
    }

    pub async fn rows(&self, table: &TableRef) -> Vec<RawPriceRow> {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub async fn schema(&self, table: &TableRef) -> Option<Vec<ColumnSpec>> {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .map(|t| t.schema.clone())
    }

    pub async fn queries(&self) -> Vec<String> {
        self.state.lock().await.queries.clone()
    }

    pub async fn insert_calls(&self) -> usize {
        self.state.lock().await.insert_calls
    }

    pub async fn create_dataset_calls(&self) -> usize {
        self.state.lock().await.create_dataset_calls
    }

    pub async fn create_table_calls(&self) -> usize {
        self.state.lock().await.create_table_calls
    }
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn dataset_exists(&self, dataset: &str) -> Result<bool, WarehouseError> {
        let state = self.state.lock().await;
        Ok(!state.hide_existing && state.datasets.contains(dataset))
    }

    async fn create_dataset(&self, dataset: &str) -> Result<(), WarehouseError> {
        let mut state = self.state.lock().await;
        state.create_dataset_calls += 1;
        if !state.datasets.insert(dataset.to_string()) {
            return Err(WarehouseError::AlreadyExists(format!("dataset {}", dataset)));
        }
        Ok(())
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool, WarehouseError> {
        let state = self.state.lock().await;
        Ok(!state.hide_existing && state.tables.contains_key(table))
    }

    async fn create_table(
        &self,
        table: &TableRef,
        schema: &[ColumnSpec],
    ) -> Result<(), WarehouseError> {
        let mut state = self.state.lock().await;
        state.create_table_calls += 1;
        if !state.datasets.contains(&table.dataset) {
            return Err(WarehouseError::NotFound(format!("dataset {}", table.dataset)));
        }
        if state.tables.contains_key(table) {
            return Err(WarehouseError::AlreadyExists(format!("table {}", table)));
        }
        state.tables.insert(
            table.clone(),
            StoredTable {
                schema: schema.to_vec(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn insert_rows(
        &self,
        table: &TableRef,
        rows: &[RawPriceRow],
    ) -> Result<Vec<RowInsertError>, WarehouseError> {
        let mut state = self.state.lock().await;
        state.insert_calls += 1;

        let rejected = state.rejected_currencies.clone();
        let stored = state
            .tables
            .get_mut(table)
            .ok_or_else(|| WarehouseError::NotFound(format!("table {}", table)))?;

        let mut errors = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            if rejected.contains(&row.currency_id) {
                errors.push(RowInsertError {
                    index,
                    message: format!("row for {} rejected", row.currency_id),
                });
            } else {
                stored.rows.push(row.clone());
            }
        }
        Ok(errors)
    }

    async fn run_query(&self, sql: &str) -> Result<(), WarehouseError> {
        let mut state = self.state.lock().await;
        state.queries.push(sql.to_string());
        match &state.query_failure {
            Some(message) => Err(WarehouseError::Query(message.clone())),
            None => Ok(()),
        }
    }
}
