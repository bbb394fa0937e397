use anyhow::Result;
use shared::*;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::time;
use tracing::{error, info};
use uuid::Uuid;

use crate::handlers::StoreHandle;

const BATCH_SIZE: usize = 100;

/// Drains carton-wise stock entries from the store into an append-only
/// `stock_entries.jsonl` journal.
pub struct OutboxProcessor {
    store: StoreHandle,
    journal: PathBuf,
    interval: Duration,
}

impl OutboxProcessor {
    pub fn new(store: StoreHandle, journal: PathBuf, interval: Duration) -> Self {
        Self {
            store,
            journal,
            interval,
        }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.process_outbox_entries().await {
                error!("Error processing stock entry outbox: {}", e);
            }
        }
    }

    pub async fn process_outbox_entries(&self) -> Result<usize> {
        let pending = self
            .store
            .read(|store| store.pending_stock_entries(BATCH_SIZE))
            .await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut published: Vec<Uuid> = Vec::with_capacity(pending.len());
        for entry in pending {
            if let Err(e) = self.publish_entry(&entry).await {
                error!("Failed to publish stock entry {}: {}", entry.id, e);
                break;
            }
            published.push(entry.id);
        }

        let count = self
            .store
            .call(move |store| store.mark_stock_entries_processed(&published))
            .await?;
        info!("Published {} stock entries", count);
        Ok(count)
    }

    async fn publish_entry(&self, entry: &StockEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
