use clap::Parser;
use miette::{IntoDiagnostic, Result};
use paygate::application::engine::{CreateOrderRequest, GatewayEngine, GatewayPorts};
use paygate::config::GatewayConfig;
use paygate::domain::ports::{OrderStoreRef, SharedCacheRef};
use paygate::infrastructure::in_memory::{InMemoryCache, InMemoryCatalogStore, InMemoryOrderStore};
use paygate::infrastructure::simulated_upstream::SimulatedUpstream;
use paygate::infrastructure::telemetry::{TracingNotifier, TracingStatsPublisher};
use paygate::interfaces::csv::outcome_writer::{OutcomeRow, OutcomeWriter};
use paygate::interfaces::csv::request_reader::{Action, RequestReader};
use paygate::logging::init_logging;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input order requests CSV file
    input: PathBuf,

    /// Channel catalog JSON (merchants, channels, products, rates, suppliers)
    #[arg(long)]
    catalog: PathBuf,

    /// Gateway configuration JSON; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Redis URL for routing state shared between gateway instances
    #[arg(long)]
    redis_url: Option<String>,
}

fn order_store(db_path: Option<PathBuf>) -> Result<OrderStoreRef> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = paygate::infrastructure::rocksdb::RocksDBOrderStore::open(path)
                .into_diagnostic()?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryOrderStore::new()))
        }
        None => Ok(Arc::new(InMemoryOrderStore::new())),
    }
}

async fn shared_cache(redis_url: Option<String>) -> Result<SharedCacheRef> {
    match redis_url {
        #[cfg(feature = "cache-redis")]
        Some(url) => {
            let cache = paygate::infrastructure::redis::RedisCache::connect(&url, "paygate")
                .await
                .into_diagnostic()?;
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "cache-redis"))]
        Some(_) => {
            warn!(
                "Shared cache requested via --redis-url, but 'cache-redis' feature is not enabled. Falling back to In-Memory cache."
            );
            Ok(Arc::new(InMemoryCache::new()))
        }
        None => Ok(Arc::new(InMemoryCache::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GatewayConfig::from_path(path).into_diagnostic()?,
        None => GatewayConfig::default(),
    };
    let catalog_raw = std::fs::read_to_string(&cli.catalog).into_diagnostic()?;
    let ports = GatewayPorts {
        catalog: Arc::new(InMemoryCatalogStore::from_json(&catalog_raw).into_diagnostic()?),
        orders: order_store(cli.db_path)?,
        cache: shared_cache(cli.redis_url).await?,
        upstream: Arc::new(SimulatedUpstream::from_catalog_json(&catalog_raw).into_diagnostic()?),
        notifier: Arc::new(TracingNotifier),
        stats: Arc::new(TracingStatsPublisher),
    };
    let engine = GatewayEngine::new(ports, config);

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = RequestReader::new(file);
    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());

    let mut processed = 0usize;
    for row in reader.requests() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, "Error reading request");
                continue;
            }
        };
        processed += 1;
        let merchant_no = row.merchant_no.clone();
        let merchant_tx_ref = row.merchant_tx_ref.clone();
        let outcome = match row.action {
            Action::Create => match engine.create_order(CreateOrderRequest::from(row)).await {
                Ok(response) => OutcomeRow::created(&merchant_no, &merchant_tx_ref, &response),
                Err(e) => {
                    error!(%merchant_no, %merchant_tx_ref, error = %e, "Order creation failed");
                    OutcomeRow::failed("create", &merchant_no, &merchant_tx_ref, &e)
                }
            },
            Action::Query => match engine.query_order(&merchant_tx_ref, &merchant_no).await {
                Ok(view) => OutcomeRow::queried(&merchant_no, &merchant_tx_ref, &view),
                Err(e) => OutcomeRow::failed("query", &merchant_no, &merchant_tx_ref, &e),
            },
        };
        writer.write(&outcome).into_diagnostic()?;
    }
    writer.finish().into_diagnostic()?;

    engine.flush_background().await;
    info!(processed, "Batch complete");
    Ok(())
}
