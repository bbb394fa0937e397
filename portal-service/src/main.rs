mod api;
mod grn;
mod handlers;
mod ledger;
mod outbox;
mod storage;
mod store;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::storage::{JsonFileStorage, PersistencePolicy};

#[derive(Parser)]
#[command(name = "portal-service")]
struct Args {
    #[arg(long, env = "PORTAL_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    #[arg(long, env = "PORT", default_value = "3001")]
    port: u16,

    #[arg(long, env = "LOW_STOCK_THRESHOLD", default_value = "10")]
    low_stock_threshold: i64,

    /// Keep distributor carts across restarts.
    #[arg(long, env = "PERSIST_CART")]
    persist_cart: bool,

    /// Keep orders and purchase orders across restarts.
    #[arg(long, env = "PERSIST_ORDERS")]
    persist_orders: bool,

    #[arg(long, default_value = "5")]
    outbox_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let storage = JsonFileStorage::new(&args.data_dir)?;
    let journal = storage.dir().join("stock_entries.jsonl");
    let policy = PersistencePolicy {
        persist_cart: args.persist_cart,
        persist_orders: args.persist_orders,
    };
    info!(
        "Loading portal state from {} (persist cart: {}, persist orders: {})",
        args.data_dir.display(),
        policy.persist_cart,
        policy.persist_orders
    );
    let store = store::PortalStore::load(Arc::new(storage), policy)?;
    let handle = handlers::StoreHandle::spawn(store);

    let mut events = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!("Store event: {:?}", event),
                Err(RecvError::Lagged(skipped)) => warn!("Event log skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outbox_processor = outbox::OutboxProcessor::new(
        handle.clone(),
        journal,
        Duration::from_secs(args.outbox_interval_secs.max(1)),
    );
    tokio::spawn(async move {
        outbox_processor.run().await;
    });

    let app_state = api::AppState {
        store: handle,
        low_stock_threshold: args.low_stock_threshold,
    };

    let app = api::create_router(app_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;

    info!("Portal service started on port {}", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}
