use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One fetched price record for a single asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub asset_id: String,
    pub price_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub change_24h_usd: Option<f64>,
}

impl PriceQuote {
    pub fn new(asset_id: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            price_usd: None,
            market_cap_usd: None,
            volume_24h_usd: None,
            change_24h_usd: None,
        }
    }
}

/// The quotes fetched in one run, all sharing a single capture timestamp.
#[derive(Debug, Clone)]
pub struct IngestionBatch {
    pub run_id: Uuid,
    pub ingestion_time: DateTime<Utc>,
    quotes: Vec<PriceQuote>,
}

impl IngestionBatch {
    /// Stamp quotes with the current time.
    pub fn new(quotes: Vec<PriceQuote>) -> Self {
        Self::stamped(quotes, Utc::now())
    }

    pub fn stamped(quotes: Vec<PriceQuote>, ingestion_time: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            ingestion_time,
            quotes,
        }
    }

    pub fn quotes(&self) -> &[PriceQuote] {
        &self.quotes
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Warehouse rows for this batch. Every row carries the batch timestamp.
    pub fn rows(&self) -> Vec<RawPriceRow> {
        self.quotes
            .iter()
            .map(|quote| RawPriceRow {
                currency_id: quote.asset_id.clone(),
                price_usd: quote.price_usd,
                market_cap_usd: quote.market_cap_usd,
                vol_24hr_usd: quote.volume_24h_usd,
                change_24hr_usd: quote.change_24h_usd,
                ingestion_time: self.ingestion_time,
            })
            .collect()
    }
}

/// Row shape of the raw price table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPriceRow {
    pub currency_id: String,
    pub price_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub vol_24hr_usd: Option<f64>,
    pub change_24hr_usd: Option<f64>,
    pub ingestion_time: DateTime<Utc>,
}
