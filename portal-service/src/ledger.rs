use shared::*;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Carton bookkeeping per article: physical stock, cartons held against open
/// orders, and the derived available figure.
#[derive(Debug, Default, Clone)]
pub struct InventoryLedger {
    records: HashMap<Uuid, InventoryRecord>,
}

impl InventoryLedger {
    pub fn from_records(records: Vec<InventoryRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.article_id, record))
                .collect(),
        }
    }

    pub fn get(&self, article_id: Uuid) -> Option<&InventoryRecord> {
        self.records.get(&article_id)
    }

    /// Sorted by article id so the persisted form is stable.
    pub fn to_vec(&self) -> Vec<InventoryRecord> {
        let mut records: Vec<InventoryRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|record| record.article_id);
        records
    }

    pub fn ensure(&mut self, article_id: Uuid) -> &InventoryRecord {
        self.records
            .entry(article_id)
            .or_insert_with(|| InventoryRecord::new(article_id))
    }

    pub fn retain_articles(&mut self, mut known: impl FnMut(Uuid) -> bool) {
        self.records.retain(|article_id, _| known(*article_id));
    }

    pub fn inward(&mut self, article_id: Uuid, cartons: i64) -> PortalResult<&InventoryRecord> {
        if cartons <= 0 {
            return Err(PortalError::InvalidQuantity(cartons));
        }
        let record = self
            .records
            .get_mut(&article_id)
            .ok_or(PortalError::ArticleNotFound(article_id))?;
        record.actual_stock = record
            .actual_stock
            .checked_add(cartons)
            .ok_or(PortalError::InvalidQuantity(cartons))?;
        debug!("Inward {} cartons for {}", cartons, article_id);
        Ok(record)
    }

    /// Withdraws physical stock, flooring at zero instead of failing.
    pub fn outward(&mut self, article_id: Uuid, cartons: i64) -> PortalResult<&InventoryRecord> {
        if cartons <= 0 {
            return Err(PortalError::InvalidQuantity(cartons));
        }
        let record = self
            .records
            .get_mut(&article_id)
            .ok_or(PortalError::ArticleNotFound(article_id))?;
        record.actual_stock = (record.actual_stock - cartons).max(0);
        debug!("Outward {} cartons for {}", cartons, article_id);
        Ok(record)
    }

    /// Holds cartons against a booked order. Shortfall shows up as negative
    /// available stock; it is never rejected.
    pub fn reserve(&mut self, items: &[OrderItem]) -> PortalResult<()> {
        self.check_known(items)?;
        for item in items {
            if let Some(record) = self.records.get_mut(&item.article_id) {
                record.reserved_stock += i64::from(item.carton_count);
                if record.available_stock() < 0 {
                    info!(
                        "Reservation leaves {} short by {} cartons",
                        item.sku,
                        -record.available_stock()
                    );
                }
            }
        }
        Ok(())
    }

    /// Takes dispatched cartons out of both physical and reserved stock.
    pub fn dispatch(&mut self, items: &[OrderItem]) -> PortalResult<()> {
        self.check_known(items)?;
        for item in items {
            if let Some(record) = self.records.get_mut(&item.article_id) {
                let cartons = i64::from(item.carton_count);
                record.actual_stock -= cartons;
                record.reserved_stock -= cartons;
            }
        }
        Ok(())
    }

    pub fn low_stock(&self, threshold: i64) -> Vec<&InventoryRecord> {
        let mut low: Vec<&InventoryRecord> = self
            .records
            .values()
            .filter(|record| record.available_stock() <= threshold)
            .collect();
        low.sort_by_key(|record| (record.available_stock(), record.article_id));
        low
    }

    fn check_known(&self, items: &[OrderItem]) -> PortalResult<()> {
        match items
            .iter()
            .find(|item| !self.records.contains_key(&item.article_id))
        {
            Some(missing) => Err(PortalError::ArticleNotFound(missing.article_id)),
            None => Ok(()),
        }
    }
}
