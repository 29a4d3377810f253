use price_etl::{CoinGeckoFetcher, PipelineError, RetryConfig};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn quick_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_backoff_ms: 1,
        backoff_multiplier: 1,
        timeout_seconds: 5,
    }
}

#[tokio::test]
async fn test_fetch_maps_response_to_quotes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .and(query_param("ids", "bitcoin,ethereum,tether"))
        .and(query_param("vs_currencies", "usd"))
        .and(query_param("include_market_cap", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bitcoin": {"usd": 50000},
            "ethereum": {"usd": 3000}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = CoinGeckoFetcher::new(server.uri(), None, RetryConfig::no_retry()).unwrap();
    let quotes = fetcher
        .fetch_quotes(&ids(&["bitcoin", "ethereum", "tether"]))
        .await
        .unwrap();

    assert_eq!(quotes.len(), 2);
    assert_eq!(quotes[0].asset_id, "bitcoin");
    assert_eq!(quotes[0].price_usd, Some(50000.0));
    assert_eq!(quotes[1].asset_id, "ethereum");
    assert_eq!(quotes[1].price_usd, Some(3000.0));
    for quote in &quotes {
        assert_eq!(quote.market_cap_usd, None);
        assert_eq!(quote.volume_24h_usd, None);
        assert_eq!(quote.change_24h_usd, None);
    }
}

#[tokio::test]
async fn test_fetch_sends_api_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .and(header("x-cg-demo-api-key", "demo-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bitcoin": {"usd": 1, "usd_market_cap": 2, "usd_24h_vol": 3, "usd_24h_change": 4}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = CoinGeckoFetcher::new(
        server.uri(),
        Some("demo-key".to_string()),
        RetryConfig::no_retry(),
    )
    .unwrap();
    let quotes = fetcher.fetch_quotes(&ids(&["bitcoin"])).await.unwrap();

    assert_eq!(quotes[0].market_cap_usd, Some(2.0));
    assert_eq!(quotes[0].volume_24h_usd, Some(3.0));
    assert_eq!(quotes[0].change_24h_usd, Some(4.0));
}

#[tokio::test]
async fn test_server_error_is_fetch_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(2)
        .mount(&server)
        .await;

    let fetcher = CoinGeckoFetcher::new(server.uri(), None, quick_retry(2)).unwrap();
    let err = fetcher.fetch_quotes(&ids(&["bitcoin"])).await.unwrap_err();

    assert!(matches!(err, PipelineError::Fetch(_)));
    assert!(err.to_string().contains("HTTP 500"));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = CoinGeckoFetcher::new(server.uri(), None, quick_retry(4)).unwrap();
    let err = fetcher.fetch_quotes(&ids(&["bitcoin"])).await.unwrap_err();

    assert!(matches!(err, PipelineError::Fetch(_)));
}

#[tokio::test]
async fn test_rate_limit_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"solana": {"usd": 150.5}})))
        .mount(&server)
        .await;

    let fetcher = CoinGeckoFetcher::new(server.uri(), None, quick_retry(3)).unwrap();
    let quotes = fetcher.fetch_quotes(&ids(&["solana"])).await.unwrap();

    assert_eq!(quotes.len(), 1);
    assert_eq!(quotes[0].price_usd, Some(150.5));
}

#[tokio::test]
async fn test_non_json_body_is_fetch_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let fetcher = CoinGeckoFetcher::new(server.uri(), None, RetryConfig::no_retry()).unwrap();
    let err = fetcher.fetch_quotes(&ids(&["bitcoin"])).await.unwrap_err();

    assert!(matches!(err, PipelineError::Fetch(_)));
}

#[tokio::test]
async fn test_timeout_is_fetch_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"bitcoin": {"usd": 1}}))
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let retry = RetryConfig {
        timeout_seconds: 1,
        ..RetryConfig::no_retry()
    };
    let fetcher = CoinGeckoFetcher::new(server.uri(), None, retry).unwrap();
    let err = fetcher.fetch_quotes(&ids(&["bitcoin"])).await.unwrap_err();

    assert!(matches!(err, PipelineError::Fetch(_)));
}
