use log::{error, info};
use price_etl::{
    logging, run_price_snapshot, CoinGeckoFetcher, InMemoryWarehouse, PipelineConfig,
    PostgresWarehouse, ServiceAccountKey, Warehouse, WarehouseBackend,
};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let config = match PipelineConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.log_file) {
        eprintln!("Failed to open log file {}: {}", config.log_file.display(), e);
        return ExitCode::FAILURE;
    }

    let key = match ServiceAccountKey::from_file(&config.key_file_path) {
        Ok(key) => key,
        Err(e) => {
            error!("{}. Exiting.", e);
            return ExitCode::FAILURE;
        }
    };

    let warehouse: Box<dyn Warehouse> = match config.warehouse_backend {
        WarehouseBackend::Postgres => match PostgresWarehouse::connect(&key).await {
            Ok(warehouse) => Box::new(warehouse),
            Err(e) => {
                error!("{}. Exiting.", e);
                return ExitCode::FAILURE;
            }
        },
        WarehouseBackend::Memory => Box::new(InMemoryWarehouse::new()),
    };
    info!(
        "Authentication successful using service account key file ({} warehouse).",
        warehouse.name()
    );

    let fetcher = match CoinGeckoFetcher::from_config(&config) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run_price_snapshot(&config, &fetcher, warehouse.as_ref()).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
