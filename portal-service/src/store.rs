use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use serde::Serialize;
use shared::sizes::{rebuild_breakup, validate_breakup};
use shared::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::grn::{GrnSession, GrnSessionView, ScanOutcome};
use crate::ledger::InventoryLedger;
use crate::storage::{keys, load_json, save_json, KeyValueStorage, PersistencePolicy};

const EVENT_CAPACITY: usize = 256;
const MAX_OPEN_SESSIONS: usize = 64;

/// Published after every successful mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreEvent {
    UserChanged { user_id: String },
    ArticleAdded { article_id: Uuid },
    AvailabilityChanged { article_id: Uuid },
    StockChanged { article_id: Uuid, available_stock: i64 },
    CartChanged { distributor_id: String },
    OrderPlaced { order_id: Uuid, distributor_id: String },
    OrderStatusChanged { order_id: Uuid, status: OrderStatus },
    PurchaseOrderCreated { po_number: String },
    CartonLocked { session_id: Uuid, barcode: String },
    GoodsReceived { session_id: Uuid, article_id: Uuid, cartons: usize },
    GoodsReceiptDiscarded { session_id: Uuid },
    StockEntriesPublished { count: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct GrnReceipt {
    pub session_id: Uuid,
    pub entries: Vec<StockEntry>,
    pub stock: InventorySnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderCounts {
    pub booked: usize,
    pub ready_for_dispatch: usize,
    pub dispatched: usize,
    pub delivered: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub article_count: usize,
    pub wishlisted_count: usize,
    pub actual_cartons: i64,
    pub reserved_cartons: i64,
    pub available_cartons: i64,
    pub orders: OrderCounts,
    pub open_order_value: BigDecimal,
    pub low_stock: Vec<InventorySnapshot>,
}

/// The persisted collections as they stood before a mutation.
struct Checkpoint {
    current_user: Option<User>,
    articles: Vec<Article>,
    ledger: InventoryLedger,
    carts: BTreeMap<String, Cart>,
    orders: Vec<Order>,
    purchase_orders: Vec<PurchaseOrder>,
    outbox: Vec<StockEntry>,
}

/// The one owner of portal state. Every mutation validates, applies and
/// saves inside [`transaction`](Self::transaction); a failure at any step
/// restores the previous state and publishes nothing.
pub struct PortalStore {
    storage: Arc<dyn KeyValueStorage>,
    policy: PersistencePolicy,
    current_user: Option<User>,
    articles: Vec<Article>,
    ledger: InventoryLedger,
    carts: BTreeMap<String, Cart>,
    orders: Vec<Order>,
    purchase_orders: Vec<PurchaseOrder>,
    sessions: HashMap<Uuid, GrnSession>,
    outbox: Vec<StockEntry>,
    pending: Vec<StoreEvent>,
    events: broadcast::Sender<StoreEvent>,
}

impl PortalStore {
    pub fn load(storage: Arc<dyn KeyValueStorage>, policy: PersistencePolicy) -> PortalResult<Self> {
        let current_user: Option<User> = load_json(storage.as_ref(), keys::CURRENT_USER)?;
        let articles: Vec<Article> = load_json(storage.as_ref(), keys::ARTICLES)?.unwrap_or_default();
        let records: Vec<InventoryRecord> =
            load_json(storage.as_ref(), keys::INVENTORY)?.unwrap_or_default();
        let outbox: Vec<StockEntry> =
            load_json(storage.as_ref(), keys::STOCK_OUTBOX)?.unwrap_or_default();

        let carts: BTreeMap<String, Cart> = if policy.persist_cart {
            load_json(storage.as_ref(), keys::CARTS)?.unwrap_or_default()
        } else {
            BTreeMap::new()
        };
        let (orders, purchase_orders): (Vec<Order>, Vec<PurchaseOrder>) = if policy.persist_orders {
            (
                load_json(storage.as_ref(), keys::ORDERS)?.unwrap_or_default(),
                load_json(storage.as_ref(), keys::PURCHASE_ORDERS)?.unwrap_or_default(),
            )
        } else {
            (Vec::new(), Vec::new())
        };

        let mut ledger = InventoryLedger::from_records(records);
        ledger.retain_articles(|id| articles.iter().any(|article| article.id == id));
        for article in &articles {
            ledger.ensure(article.id);
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        info!(
            "Loaded {} articles, {} orders, {} pending stock entries",
            articles.len(),
            orders.len(),
            outbox.len()
        );

        Ok(Self {
            storage,
            policy,
            current_user,
            articles,
            ledger,
            carts,
            orders,
            purchase_orders,
            sessions: HashMap::new(),
            outbox,
            pending: Vec::new(),
            events,
        })
    }

    pub fn event_sender(&self) -> broadcast::Sender<StoreEvent> {
        self.events.clone()
    }

    pub fn current_user(&self) -> PortalResult<User> {
        self.current_user.clone().ok_or(PortalError::NoCurrentUser)
    }

    pub fn set_current_user(&mut self, user: User) -> PortalResult<User> {
        self.transaction(|store| {
            if user.id.trim().is_empty() {
                return Err(PortalError::MissingField("id"));
            }
            store.current_user = Some(user.clone());
            store.save(keys::CURRENT_USER, &user)?;
            store.emit(StoreEvent::UserChanged {
                user_id: user.id.clone(),
            });
            Ok(user)
        })
    }

    pub fn articles(&self) -> Vec<Article> {
        self.articles.clone()
    }

    pub fn article(&self, article_id: Uuid) -> PortalResult<&Article> {
        self.articles
            .iter()
            .find(|article| article.id == article_id)
            .ok_or(PortalError::ArticleNotFound(article_id))
    }

    pub fn add_article(&mut self, draft: ArticleDraft) -> PortalResult<Article> {
        self.transaction(|store| {
            let sku = draft.sku.trim().to_string();
            let name = draft.name.trim().to_string();
            if sku.is_empty() {
                return Err(PortalError::MissingField("sku"));
            }
            if name.is_empty() {
                return Err(PortalError::MissingField("name"));
            }
            if draft.price_per_pair <= BigDecimal::zero() {
                return Err(PortalError::InvalidPrice);
            }
            if store
                .articles
                .iter()
                .any(|article| article.sku.eq_ignore_ascii_case(&sku))
            {
                return Err(PortalError::DuplicateSku(sku));
            }

            let size_range = draft
                .size_range
                .map(|range| range.trim().to_string())
                .filter(|range| !range.is_empty());
            let size_breakup = match &size_range {
                Some(range) => rebuild_breakup(range, &draft.size_breakup),
                None => draft.size_breakup,
            };
            validate_breakup(&size_breakup)?;

            let article = Article {
                id: Uuid::new_v4(),
                sku,
                name,
                category: draft.category,
                price_per_pair: draft.price_per_pair,
                mrp: draft.mrp,
                images: draft.images,
                size_range,
                size_breakup,
                availability: draft.availability,
                created_at: Utc::now(),
            };

            store.articles.push(article.clone());
            store.ledger.ensure(article.id);
            store.save(keys::ARTICLES, &store.articles)?;
            store.save_inventory()?;

            info!("Added article {} ({})", article.sku, article.id);
            store.emit(StoreEvent::ArticleAdded {
                article_id: article.id,
            });
            Ok(article)
        })
    }

    pub fn update_availability(
        &mut self,
        article_id: Uuid,
        availability: Availability,
    ) -> PortalResult<Article> {
        self.transaction(|store| {
            let article = store
                .articles
                .iter_mut()
                .find(|article| article.id == article_id)
                .ok_or(PortalError::ArticleNotFound(article_id))?;
            article.availability = availability;
            let updated = article.clone();

            store.save(keys::ARTICLES, &store.articles)?;
            store.emit(StoreEvent::AvailabilityChanged { article_id });
            Ok(updated)
        })
    }

    pub fn inventory(&self) -> Vec<InventorySnapshot> {
        self.articles
            .iter()
            .filter_map(|article| {
                self.ledger
                    .get(article.id)
                    .map(|record| record.snapshot(&article.sku))
            })
            .collect()
    }

    pub fn inventory_of(&self, article_id: Uuid) -> PortalResult<InventorySnapshot> {
        let article = self.article(article_id)?;
        self.ledger
            .get(article_id)
            .map(|record| record.snapshot(&article.sku))
            .ok_or(PortalError::ArticleNotFound(article_id))
    }

    pub fn inward(&mut self, article_id: Uuid, cartons: i64) -> PortalResult<InventorySnapshot> {
        self.transaction(|store| {
            store.article(article_id)?;
            store.ledger.inward(article_id, cartons)?;
            store.save_inventory()?;
            store.stock_changed(article_id)
        })
    }

    pub fn outward(&mut self, article_id: Uuid, cartons: i64) -> PortalResult<InventorySnapshot> {
        self.transaction(|store| {
            store.article(article_id)?;
            store.ledger.outward(article_id, cartons)?;
            store.save_inventory()?;
            store.stock_changed(article_id)
        })
    }

    pub fn low_stock(&self, threshold: i64) -> Vec<InventorySnapshot> {
        self.ledger
            .low_stock(threshold)
            .into_iter()
            .filter_map(|record| {
                self.article(record.article_id)
                    .ok()
                    .map(|article| record.snapshot(&article.sku))
            })
            .collect()
    }

    pub fn cart(&self, distributor_id: &str) -> Cart {
        self.carts
            .get(distributor_id)
            .cloned()
            .unwrap_or_else(|| Cart::new(distributor_id))
    }

    pub fn add_to_cart(
        &mut self,
        distributor_id: &str,
        article_id: Uuid,
        cartons: u32,
    ) -> PortalResult<Cart> {
        self.transaction(|store| {
            if cartons == 0 {
                return Err(PortalError::InvalidQuantity(0));
            }
            store.orderable(article_id)?;
            store.cart_mut(distributor_id).add(article_id, cartons)?;
            store.cart_changed(distributor_id)
        })
    }

    pub fn set_cart_quantity(
        &mut self,
        distributor_id: &str,
        article_id: Uuid,
        cartons: u32,
    ) -> PortalResult<Cart> {
        self.transaction(|store| {
            if cartons > 0 {
                store.orderable(article_id)?;
            }
            store.cart_mut(distributor_id).set(article_id, cartons);
            store.cart_changed(distributor_id)
        })
    }

    pub fn decrement_cart(&mut self, distributor_id: &str, article_id: Uuid) -> PortalResult<Cart> {
        self.transaction(|store| {
            store.cart_mut(distributor_id).decrement(article_id);
            store.cart_changed(distributor_id)
        })
    }

    pub fn remove_from_cart(&mut self, distributor_id: &str, article_id: Uuid) -> PortalResult<Cart> {
        self.transaction(|store| {
            store.cart_mut(distributor_id).remove(article_id);
            store.cart_changed(distributor_id)
        })
    }

    /// Turns the distributor's cart into a booked order and reserves its cartons.
    pub fn place_order(&mut self, distributor_id: &str) -> PortalResult<Order> {
        self.transaction(|store| {
            let cart = store.cart(distributor_id);
            if cart.is_empty() {
                return Err(PortalError::EmptyCart);
            }

            let items = cart
                .lines
                .iter()
                .map(|line| {
                    store
                        .orderable(line.article_id)
                        .map(|article| OrderItem::new(article, line.cartons))
                })
                .collect::<PortalResult<Vec<_>>>()?;

            store.ledger.reserve(&items)?;
            let order = Order::new(distributor_id, items);
            store.orders.push(order.clone());
            store.carts.remove(distributor_id);

            store.save_inventory()?;
            store.save_orders()?;
            store.save_carts()?;

            info!(
                "Order {} booked for {}: {} cartons",
                order.id, distributor_id, order.total_cartons
            );
            store.emit(StoreEvent::OrderPlaced {
                order_id: order.id,
                distributor_id: distributor_id.to_string(),
            });
            store.emit(StoreEvent::CartChanged {
                distributor_id: distributor_id.to_string(),
            });
            for item in &order.items {
                store.emit_stock(item.article_id);
            }
            Ok(order)
        })
    }

    /// The only place an order's status changes. Stock leaves the warehouse
    /// exactly once, the first time the order reaches DISPATCHED or later.
    pub fn update_order_status(&mut self, order_id: Uuid, status: OrderStatus) -> PortalResult<Order> {
        self.transaction(|store| {
            let order = store
                .orders
                .iter_mut()
                .find(|order| order.id == order_id)
                .ok_or(PortalError::OrderNotFound(order_id))?;

            if order.status == status {
                return Ok(order.clone());
            }
            if status.is_before(order.status) {
                return Err(PortalError::InvalidStatusTransition {
                    from: order.status,
                    to: status,
                });
            }

            let deduct = status.has_shipped() && !order.stock_deducted;
            if deduct {
                store.ledger.dispatch(&order.items)?;
                order.stock_deducted = true;
                info!("Order {} dispatched, stock deducted", order.id);
            }
            order.status = status;
            order.updated_at = Utc::now();
            let updated = order.clone();

            if deduct {
                store.save_inventory()?;
            }
            store.save_orders()?;

            store.emit(StoreEvent::OrderStatusChanged { order_id, status });
            if deduct {
                for item in &updated.items {
                    store.emit_stock(item.article_id);
                }
            }
            Ok(updated)
        })
    }

    pub fn orders(&self, distributor_id: Option<&str>) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|order| distributor_id.map_or(true, |id| order.distributor_id == id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    pub fn order(&self, order_id: Uuid) -> PortalResult<Order> {
        self.orders
            .iter()
            .find(|order| order.id == order_id)
            .cloned()
            .ok_or(PortalError::OrderNotFound(order_id))
    }

    pub fn create_purchase_order(&mut self, draft: PurchaseOrderDraft) -> PortalResult<PurchaseOrder> {
        self.transaction(|store| {
            if draft.po_number.trim().is_empty() {
                return Err(PortalError::MissingField("po_number"));
            }
            if draft.supplier.trim().is_empty() {
                return Err(PortalError::MissingField("supplier"));
            }
            if draft.lines.is_empty() {
                return Err(PortalError::MissingField("lines"));
            }
            for line in &draft.lines {
                if line.cartons == 0 {
                    return Err(PortalError::InvalidQuantity(0));
                }
                store.article(line.article_id)?;
            }
            let po_number = draft.po_number.trim();
            if store
                .purchase_orders
                .iter()
                .any(|po| po.po_number.eq_ignore_ascii_case(po_number))
            {
                return Err(PortalError::DuplicatePurchaseOrder(po_number.to_string()));
            }

            let purchase_order = PurchaseOrder::new(draft);
            store.purchase_orders.push(purchase_order.clone());
            store.save_purchase_orders()?;

            info!("Purchase order {} raised", purchase_order.po_number);
            store.emit(StoreEvent::PurchaseOrderCreated {
                po_number: purchase_order.po_number.clone(),
            });
            Ok(purchase_order)
        })
    }

    pub fn purchase_orders(&self) -> Vec<PurchaseOrder> {
        self.purchase_orders.clone()
    }

    /// Opens a scanning session. Past the open-session limit the session
    /// opened longest ago is dropped to make room.
    pub fn open_grn(&mut self) -> GrnSessionView {
        while self.sessions.len() >= MAX_OPEN_SESSIONS {
            let Some(oldest) = self
                .sessions
                .values()
                .min_by_key(|session| session.opened_at())
                .map(GrnSession::id)
            else {
                break;
            };
            self.sessions.remove(&oldest);
            warn!("Dropped goods receipt {} to stay under {} open sessions", oldest, MAX_OPEN_SESSIONS);
        }

        let session = GrnSession::new();
        let view = session.view();
        self.sessions.insert(session.id(), session);
        view
    }

    pub fn grn(&self, session_id: Uuid) -> PortalResult<GrnSessionView> {
        self.sessions
            .get(&session_id)
            .map(GrnSession::view)
            .ok_or(PortalError::SessionNotFound(session_id))
    }

    /// Abandons a session and everything scanned in it.
    pub fn discard_grn(&mut self, session_id: Uuid) -> PortalResult<()> {
        let session = self
            .sessions
            .remove(&session_id)
            .ok_or(PortalError::SessionNotFound(session_id))?;
        info!(
            "Goods receipt {} discarded with {} locked cartons",
            session_id,
            session.cartons().len()
        );
        self.publish(StoreEvent::GoodsReceiptDiscarded { session_id });
        Ok(())
    }

    pub fn select_grn_reference(
        &mut self,
        session_id: Uuid,
        reference: GrnReference,
    ) -> PortalResult<GrnSessionView> {
        let article = self.article(reference.article_id())?;
        match &reference {
            GrnReference::PurchaseOrder { po_number, article_id } => {
                let po = self
                    .purchase_orders
                    .iter()
                    .find(|po| &po.po_number == po_number && po.status == PurchaseOrderStatus::Open)
                    .ok_or_else(|| PortalError::PurchaseOrderNotFound(po_number.clone()))?;
                if !po.lines.iter().any(|line| line.article_id == *article_id) {
                    return Err(PortalError::ReferenceMismatch(po_number.clone()));
                }
            }
            GrnReference::Catalogue { sku, .. } => {
                if &article.sku != sku {
                    return Err(PortalError::ReferenceMismatch(sku.clone()));
                }
            }
        }

        let session = self.session_mut(session_id)?;
        session.select_reference(reference)?;
        Ok(session.view())
    }

    pub fn scan(&mut self, session_id: Uuid, code: &str) -> PortalResult<ScanOutcome> {
        let session = self.session_mut(session_id)?;
        let outcome = session.scan(code)?;
        if let ScanOutcome::CartonLocked { carton } = &outcome {
            self.publish(StoreEvent::CartonLocked {
                session_id,
                barcode: carton.barcode.clone(),
            });
        }
        Ok(outcome)
    }

    pub fn rescan_carton(&mut self, session_id: Uuid) -> PortalResult<GrnSessionView> {
        let session = self.session_mut(session_id)?;
        let released = session.rescan_carton();
        info!("Session {} discarded {} partial scans", session_id, released);
        Ok(session.view())
    }

    pub fn remove_carton(
        &mut self,
        session_id: Uuid,
        barcode: &str,
        confirmed: bool,
    ) -> PortalResult<GrnSessionView> {
        let session = self.session_mut(session_id)?;
        session.remove_carton(barcode, confirmed)?;
        Ok(session.view())
    }

    /// Books the locked cartons into stock and queues one stock entry per
    /// carton. The session stays open if anything fails.
    pub fn submit_grn(&mut self, session_id: Uuid) -> PortalResult<GrnReceipt> {
        self.transaction(|store| {
            let session = store
                .sessions
                .get(&session_id)
                .ok_or(PortalError::SessionNotFound(session_id))?;
            let entries = session.submit()?;
            let reference = session.reference().cloned().ok_or(ScanError::NoReference)?;
            let article_id = reference.article_id();
            store.article(article_id)?;

            store.ledger.inward(article_id, entries.len() as i64)?;
            if let GrnReference::PurchaseOrder { po_number, .. } = &reference {
                if let Some(po) = store
                    .purchase_orders
                    .iter_mut()
                    .find(|po| &po.po_number == po_number)
                {
                    po.status = PurchaseOrderStatus::Received;
                }
            }
            store.outbox.extend(entries.iter().cloned());

            store.save_inventory()?;
            store.save_purchase_orders()?;
            store.save(keys::STOCK_OUTBOX, &store.outbox)?;
            store.sessions.remove(&session_id);

            info!(
                "Goods receipt {} booked {} cartons against {}-{}",
                session_id,
                entries.len(),
                reference.kind_code(),
                reference.number()
            );
            store.emit(StoreEvent::GoodsReceived {
                session_id,
                article_id,
                cartons: entries.len(),
            });
            let stock = store.stock_changed(article_id)?;
            Ok(GrnReceipt {
                session_id,
                entries,
                stock,
            })
        })
    }

    pub fn pending_stock_entries(&self, limit: usize) -> Vec<StockEntry> {
        self.outbox.iter().take(limit).cloned().collect()
    }

    /// Drops journaled entries from the outbox.
    pub fn mark_stock_entries_processed(&mut self, ids: &[Uuid]) -> PortalResult<usize> {
        self.transaction(|store| {
            let before = store.outbox.len();
            store.outbox.retain(|entry| !ids.contains(&entry.id));
            let removed = before - store.outbox.len();
            if removed > 0 {
                store.save(keys::STOCK_OUTBOX, &store.outbox)?;
                store.emit(StoreEvent::StockEntriesPublished { count: removed });
            }
            Ok(removed)
        })
    }

    pub fn dashboard(&self, low_stock_threshold: i64) -> Dashboard {
        let inventory = self.inventory();
        let mut orders = OrderCounts::default();
        let mut open_order_value = BigDecimal::zero();
        for order in &self.orders {
            match order.status {
                OrderStatus::Booked => orders.booked += 1,
                OrderStatus::ReadyForDispatch => orders.ready_for_dispatch += 1,
                OrderStatus::Dispatched => orders.dispatched += 1,
                OrderStatus::Delivered => orders.delivered += 1,
            }
            if !order.status.has_shipped() {
                open_order_value = open_order_value + &order.total_amount;
            }
        }

        Dashboard {
            article_count: self.articles.len(),
            wishlisted_count: self
                .articles
                .iter()
                .filter(|article| article.availability.is_wishlisted())
                .count(),
            actual_cartons: inventory.iter().map(|s| s.actual_stock).sum(),
            reserved_cartons: inventory.iter().map(|s| s.reserved_stock).sum(),
            available_cartons: inventory.iter().map(|s| s.available_stock).sum(),
            orders,
            open_order_value,
            low_stock: self.low_stock(low_stock_threshold),
        }
    }

    /// Runs `mutation` against the store. On error the persisted collections
    /// go back to their prior values and queued events are dropped; on
    /// success the events are published.
    fn transaction<T>(
        &mut self,
        mutation: impl FnOnce(&mut Self) -> PortalResult<T>,
    ) -> PortalResult<T> {
        let checkpoint = self.checkpoint();
        match mutation(&mut *self) {
            Ok(value) => {
                for event in std::mem::take(&mut self.pending) {
                    self.publish(event);
                }
                Ok(value)
            }
            Err(e) => {
                self.restore(checkpoint);
                self.pending.clear();
                Err(e)
            }
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            current_user: self.current_user.clone(),
            articles: self.articles.clone(),
            ledger: self.ledger.clone(),
            carts: self.carts.clone(),
            orders: self.orders.clone(),
            purchase_orders: self.purchase_orders.clone(),
            outbox: self.outbox.clone(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.current_user = checkpoint.current_user;
        self.articles = checkpoint.articles;
        self.ledger = checkpoint.ledger;
        self.carts = checkpoint.carts;
        self.orders = checkpoint.orders;
        self.purchase_orders = checkpoint.purchase_orders;
        self.outbox = checkpoint.outbox;
    }

    fn orderable(&self, article_id: Uuid) -> PortalResult<&Article> {
        let article = self.article(article_id)?;
        if article.availability.is_wishlisted() {
            return Err(PortalError::ArticleWishlisted(article.sku.clone()));
        }
        Ok(article)
    }

    fn cart_mut(&mut self, distributor_id: &str) -> &mut Cart {
        self.carts
            .entry(distributor_id.to_string())
            .or_insert_with(|| Cart::new(distributor_id))
    }

    fn cart_changed(&mut self, distributor_id: &str) -> PortalResult<Cart> {
        if self
            .carts
            .get(distributor_id)
            .is_some_and(|cart| cart.is_empty())
        {
            self.carts.remove(distributor_id);
        }
        self.save_carts()?;
        self.emit(StoreEvent::CartChanged {
            distributor_id: distributor_id.to_string(),
        });
        Ok(self.cart(distributor_id))
    }

    fn session_mut(&mut self, session_id: Uuid) -> PortalResult<&mut GrnSession> {
        self.sessions
            .get_mut(&session_id)
            .ok_or(PortalError::SessionNotFound(session_id))
    }

    fn stock_changed(&mut self, article_id: Uuid) -> PortalResult<InventorySnapshot> {
        let snapshot = self.inventory_of(article_id)?;
        self.emit(StoreEvent::StockChanged {
            article_id,
            available_stock: snapshot.available_stock,
        });
        Ok(snapshot)
    }

    fn emit_stock(&mut self, article_id: Uuid) {
        if let Some(available_stock) = self.ledger.get(article_id).map(|r| r.available_stock()) {
            self.emit(StoreEvent::StockChanged {
                article_id,
                available_stock,
            });
        }
    }

    /// Queues an event until the surrounding transaction commits.
    fn emit(&mut self, event: StoreEvent) {
        self.pending.push(event);
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> PortalResult<()> {
        save_json(self.storage.as_ref(), key, value).map_err(|e| {
            error!("Failed to persist {}: {}", key, e);
            e
        })
    }

    fn save_inventory(&self) -> PortalResult<()> {
        self.save(keys::INVENTORY, &self.ledger.to_vec())
    }

    fn save_carts(&self) -> PortalResult<()> {
        if !self.policy.persist_cart {
            return Ok(());
        }
        self.save(keys::CARTS, &self.carts)
    }

    fn save_orders(&self) -> PortalResult<()> {
        if !self.policy.persist_orders {
            return Ok(());
        }
        self.save(keys::ORDERS, &self.orders)
    }

    fn save_purchase_orders(&self) -> PortalResult<()> {
        if !self.policy.persist_orders {
            return Ok(());
        }
        self.save(keys::PURCHASE_ORDERS, &self.purchase_orders)
    }
}
