use log::{error, info, warn};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::config::{
    MissingTemplatePolicy, PipelineConfig, DEFAULT_CLEAN_TABLE_ID, DEFAULT_DATASET_ID,
    DEFAULT_PROJECT_ID, DEFAULT_RAW_TABLE_ID,
};
use crate::error::PipelineError;
use crate::warehouse::{retry_async, Warehouse};

/// Result of the transform stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    Executed,
    /// Template file missing under [`MissingTemplatePolicy::Skip`].
    Skipped,
}

/// The names substituted into a SQL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateNames {
    pub project_id: String,
    pub dataset_id: String,
    pub raw_table_id: String,
    pub clean_table_id: String,
}

impl TemplateNames {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            project_id: config.project_id.clone(),
            dataset_id: config.dataset_id.clone(),
            raw_table_id: config.raw_table_id.clone(),
            clean_table_id: config.clean_table_id.clone(),
        }
    }

    fn pairs(&self) -> [(&'static str, &'static str, &str); 4] {
        [
            ("{{project_id}}", DEFAULT_PROJECT_ID, self.project_id.as_str()),
            ("{{dataset_id}}", DEFAULT_DATASET_ID, self.dataset_id.as_str()),
            ("{{raw_table_id}}", DEFAULT_RAW_TABLE_ID, self.raw_table_id.as_str()),
            ("{{clean_table_id}}", DEFAULT_CLEAN_TABLE_ID, self.clean_table_id.as_str()),
        ]
    }
}

/// SQL text with `{{name}}` placeholders and/or the default identifiers
/// written out literally.
#[derive(Debug, Clone)]
pub struct SqlTemplate {
    text: String,
}

impl SqlTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        fs::read_to_string(path).map(Self::new)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Substitute the configured names in a single pass over the template.
    ///
    /// `{{name}}` placeholders are always replaced. With `literal` set, every
    /// occurrence of each default identifier is replaced as plain text too.
    /// Substituted values are copied through as-is and never rescanned, so a
    /// configured name that contains a default identifier stays intact.
    pub fn render(&self, names: &TemplateNames, literal: bool) -> String {
        let mut patterns: Vec<(&str, &str)> = Vec::with_capacity(8);
        for (placeholder, default, value) in names.pairs() {
            patterns.push((placeholder, value));
            if literal {
                patterns.push((default, value));
            }
        }

        let mut sql = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();
        while let Some((at, pattern, value)) = patterns
            .iter()
            .filter_map(|&(pattern, value)| rest.find(pattern).map(|at| (at, pattern, value)))
            .min_by_key(|&(at, _, _)| at)
        {
            sql.push_str(&rest[..at]);
            sql.push_str(value);
            rest = &rest[at + pattern.len()..];
        }
        sql.push_str(rest);
        sql
    }
}

/// Load the transformation template, render it and run it to completion.
pub async fn transform(
    config: &PipelineConfig,
    warehouse: &dyn Warehouse,
) -> Result<TransformOutcome, PipelineError> {
    info!("Starting data transformation...");
    let path = config.transform_sql_path.as_path();

    let template = match SqlTemplate::from_file(path) {
        Ok(template) => template,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            error!("Error: SQL file not found at {}", path.display());
            return match config.missing_template {
                MissingTemplatePolicy::Skip => {
                    warn!(
                        "Skipping transformation; clean table '{}' was not refreshed.",
                        config.clean_table_id
                    );
                    Ok(TransformOutcome::Skipped)
                }
                MissingTemplatePolicy::Fail => Err(PipelineError::Transform(format!(
                    "SQL file not found at {}",
                    path.display()
                ))),
            };
        }
        Err(e) => {
            error!("Error reading SQL file {}: {}", path.display(), e);
            return Err(PipelineError::Transform(format!(
                "Unreadable SQL file {}: {}",
                path.display(),
                e
            )));
        }
    };

    let sql = template.render(
        &TemplateNames::from_config(config),
        config.literal_substitution,
    );

    let timeout = Duration::from_secs(config.query_timeout_secs);
    let execution = retry_async("transformation query", &config.retry, || {
        warehouse.run_query(&sql)
    });

    match tokio::time::timeout(timeout, execution).await {
        Ok(Ok(())) => {
            info!(
                "Data transformation complete. Clean table '{}' created.",
                config.clean_table_id
            );
            Ok(TransformOutcome::Executed)
        }
        Ok(Err(e)) => {
            error!("An error occurred during transformation: {}", e);
            Err(PipelineError::Transform(e.to_string()))
        }
        Err(_) => {
            error!(
                "Transformation did not finish within {}s",
                config.query_timeout_secs
            );
            Err(PipelineError::Transform(format!(
                "Timed out after {}s",
                config.query_timeout_secs
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> TemplateNames {
        TemplateNames {
            project_id: "analytics-prod".to_string(),
            dataset_id: "market".to_string(),
            raw_table_id: "prices_raw".to_string(),
            clean_table_id: "prices_clean".to_string(),
        }
    }

    #[test]
    fn test_literal_substitution_is_global() {
        let template = SqlTemplate::new(
            "CREATE OR REPLACE TABLE `crypto-price-pipeline.crypto_data_pipeline.clean_crypto_data` AS \
             SELECT * FROM `crypto-price-pipeline.crypto_data_pipeline.raw_crypto_prices` r \
             JOIN `crypto-price-pipeline.crypto_data_pipeline.raw_crypto_prices` s USING (currency_id)",
        );

        let sql = template.render(&names(), true);

        for default in [
            DEFAULT_PROJECT_ID,
            DEFAULT_DATASET_ID,
            DEFAULT_RAW_TABLE_ID,
            DEFAULT_CLEAN_TABLE_ID,
        ] {
            assert_eq!(sql.matches(default).count(), 0, "{} left behind", default);
        }
        assert_eq!(sql.matches("analytics-prod").count(), 3);
        assert_eq!(sql.matches("market").count(), 3);
        assert_eq!(sql.matches("prices_raw").count(), 2);
        assert_eq!(sql.matches("prices_clean").count(), 1);
    }

    #[test]
    fn test_named_placeholders() {
        let template = SqlTemplate::new(
            "DROP TABLE IF EXISTS \"{{dataset_id}}\".\"{{clean_table_id}}\"; \
             CREATE TABLE \"{{dataset_id}}\".\"{{clean_table_id}}\" AS \
             SELECT * FROM \"{{dataset_id}}\".\"{{raw_table_id}}\"",
        );

        let sql = template.render(&names(), false);

        assert!(!sql.contains("{{"));
        assert_eq!(sql.matches("\"market\"").count(), 3);
        assert_eq!(sql.matches("\"prices_clean\"").count(), 2);
    }

    #[test]
    fn test_literal_mode_off_leaves_defaults() {
        let template = SqlTemplate::new("SELECT 'raw_crypto_prices' AS label");
        assert_eq!(
            template.render(&names(), false),
            "SELECT 'raw_crypto_prices' AS label"
        );
        // The hazard of literal mode: text that merely looks like a default
        // identifier is rewritten too.
        assert_eq!(
            template.render(&names(), true),
            "SELECT 'prices_raw' AS label"
        );
    }

    #[test]
    fn test_configured_names_are_not_substituted_twice() {
        let names = TemplateNames {
            project_id: "crypto-price-pipeline-staging".to_string(),
            dataset_id: "crypto_data_pipeline_v2".to_string(),
            raw_table_id: DEFAULT_RAW_TABLE_ID.to_string(),
            clean_table_id: "clean_crypto_data_daily".to_string(),
        };

        let placeholders = SqlTemplate::new(
            "CREATE TABLE \"{{dataset_id}}\".\"{{clean_table_id}}\" AS \
             SELECT * FROM \"{{dataset_id}}\".\"{{raw_table_id}}\"",
        );
        assert_eq!(
            placeholders.render(&names, true),
            "CREATE TABLE \"crypto_data_pipeline_v2\".\"clean_crypto_data_daily\" AS \
             SELECT * FROM \"crypto_data_pipeline_v2\".\"raw_crypto_prices\""
        );

        let literals = SqlTemplate::new(
            "SELECT * FROM `crypto-price-pipeline.crypto_data_pipeline.raw_crypto_prices`",
        );
        let sql = literals.render(&names, true);
        assert_eq!(
            sql,
            "SELECT * FROM `crypto-price-pipeline-staging.crypto_data_pipeline_v2.raw_crypto_prices`"
        );
        assert_eq!(sql.matches("crypto_data_pipeline_v2").count(), 1);
    }
}
