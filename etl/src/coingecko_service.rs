use log::{error, info, warn};
use serde::Deserialize;
use std::collections::HashMap;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::http_utils::{HttpClient, RetryConfig};
use crate::models::PriceQuote;

const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// Metrics for one asset in a `simple/price` response. Any of them may be
/// missing or null.
#[derive(Debug, Default, Deserialize)]
struct SimplePriceEntry {
    usd: Option<f64>,
    usd_market_cap: Option<f64>,
    usd_24h_vol: Option<f64>,
    usd_24h_change: Option<f64>,
}

type SimplePriceResponse = HashMap<String, SimplePriceEntry>;

/// Fetches spot quotes from CoinGecko's `simple/price` endpoint.
pub struct CoinGeckoFetcher {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoFetcher {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        retry_config: RetryConfig,
    ) -> Result<Self, PipelineError> {
        let http = HttpClient::with_config(retry_config)
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        Self::new(
            config.api_base_url.clone(),
            config.api_key.clone(),
            config.retry.clone(),
        )
    }

    pub fn endpoint(&self) -> String {
        format!("{}/simple/price", self.base_url)
    }

    /// Query parameters selecting the assets and the four USD metrics.
    pub fn query_params(asset_ids: &[String]) -> [(&'static str, String); 5] {
        [
            ("ids", asset_ids.join(",")),
            ("vs_currencies", "usd".to_string()),
            ("include_market_cap", "true".to_string()),
            ("include_24hr_vol", "true".to_string()),
            ("include_24hr_change", "true".to_string()),
        ]
    }

    /// Fetch one quote per requested asset the API knows about.
    ///
    /// Network errors, timeouts, non-2xx statuses and unexpected bodies are
    /// logged here and come back as [`PipelineError::Fetch`].
    pub async fn fetch_quotes(&self, asset_ids: &[String]) -> Result<Vec<PriceQuote>, PipelineError> {
        let url = self.endpoint();
        let params = Self::query_params(asset_ids);
        info!("Fetching data from API: {} ({} assets)", url, asset_ids.len());

        let response = self
            .http
            .execute_with_retry("CoinGecko simple/price", || {
                let request = self.http.client().get(&url).query(&params);
                match &self.api_key {
                    Some(key) => request.header(API_KEY_HEADER, key).send(),
                    None => request.send(),
                }
            })
            .await
            .map_err(|e| {
                error!("Error fetching data from API: {}", e);
                PipelineError::Fetch(e.to_string())
            })?;

        let body: SimplePriceResponse = response.json().await.map_err(|e| {
            error!("Error decoding API response: {}", e);
            PipelineError::Fetch(format!("Invalid response body: {}", e))
        })?;

        let quotes = quotes_from_response(asset_ids, body);
        info!(
            "Data fetched successfully: {} of {} assets returned",
            quotes.len(),
            asset_ids.len()
        );
        Ok(quotes)
    }
}

/// Turn a decoded response into quotes, in request order.
///
/// Requested ids absent from the response are dropped; ids nobody asked for
/// are ignored.
fn quotes_from_response(asset_ids: &[String], mut body: SimplePriceResponse) -> Vec<PriceQuote> {
    let mut quotes = Vec::with_capacity(body.len());

    for asset_id in asset_ids {
        if let Some(entry) = body.remove(asset_id) {
            quotes.push(PriceQuote {
                asset_id: asset_id.clone(),
                price_usd: entry.usd,
                market_cap_usd: entry.usd_market_cap,
                volume_24h_usd: entry.usd_24h_vol,
                change_24h_usd: entry.usd_24h_change,
            });
        }
    }

    if !body.is_empty() {
        let mut extra: Vec<_> = body.into_keys().collect();
        extra.sort();
        warn!("Ignoring unrequested assets in API response: {}", extra.join(", "));
    }

    quotes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_missing_metrics_are_none() {
        let body: SimplePriceResponse = serde_json::from_str(
            r#"{
                "bitcoin": {"usd": 50000, "usd_market_cap": 9.8e11, "usd_24h_vol": null},
                "ethereum": {"usd": 3000, "usd_24h_change": -1.25}
            }"#,
        )
        .unwrap();

        let quotes = quotes_from_response(&ids(&["bitcoin", "ethereum"]), body);

        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].asset_id, "bitcoin");
        assert_eq!(quotes[0].price_usd, Some(50000.0));
        assert_eq!(quotes[0].market_cap_usd, Some(9.8e11));
        assert_eq!(quotes[0].volume_24h_usd, None);
        assert_eq!(quotes[0].change_24h_usd, None);
        assert_eq!(quotes[1].change_24h_usd, Some(-1.25));
        assert_eq!(quotes[1].market_cap_usd, None);
    }

    #[test]
    fn test_drops_missing_and_unrequested_assets() {
        let body: SimplePriceResponse = serde_json::from_str(
            r#"{"solana": {"usd": 150}, "dogecoin": {"usd": 0.1}}"#,
        )
        .unwrap();

        let quotes = quotes_from_response(&ids(&["bitcoin", "solana"]), body);

        assert_eq!(quotes, vec![PriceQuote {
            price_usd: Some(150.0),
            ..PriceQuote::new("solana")
        }]);
    }

    #[test]
    fn test_empty_entry_yields_all_none_quote() {
        let body: SimplePriceResponse = serde_json::from_str(r#"{"tether": {}}"#).unwrap();
        let quotes = quotes_from_response(&ids(&["tether"]), body);
        assert_eq!(quotes, vec![PriceQuote::new("tether")]);
    }

    #[test]
    fn test_query_params() {
        let params = CoinGeckoFetcher::query_params(&ids(&["bitcoin", "shiba-inu"]));
        assert_eq!(params[0], ("ids", "bitcoin,shiba-inu".to_string()));
        assert_eq!(params[1], ("vs_currencies", "usd".to_string()));
        assert!(params.iter().any(|(k, _)| *k == "include_24hr_change"));
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let fetcher =
            CoinGeckoFetcher::new("http://localhost:9000/api/v3/", None, RetryConfig::no_retry())
                .unwrap();
        assert_eq!(fetcher.endpoint(), "http://localhost:9000/api/v3/simple/price");
    }
}
