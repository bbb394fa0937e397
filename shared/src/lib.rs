pub mod error;
pub mod sizes;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub use error::{PortalError, PortalResult, ScanError};

pub const PAIRS_PER_CARTON: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Distributor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Men,
    Women,
    Kids,
    Unisex,
}

/// Catalogue status of an article. A wish-listed article always carries the
/// date it is expected to become available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    Available,
    #[serde(rename = "WISH")]
    Wishlisted { expected_date: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeEntry {
    pub size: String,
    pub pairs: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub category: Gender,
    pub price_per_pair: BigDecimal,
    #[serde(default)]
    pub mrp: Option<BigDecimal>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub size_range: Option<String>,
    #[serde(default)]
    pub size_breakup: Vec<SizeEntry>,
    pub availability: Availability,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub sku: String,
    pub name: String,
    pub category: Gender,
    pub price_per_pair: BigDecimal,
    #[serde(default)]
    pub mrp: Option<BigDecimal>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub size_range: Option<String>,
    #[serde(default)]
    pub size_breakup: Vec<SizeEntry>,
    pub availability: Availability,
}

/// Carton stock for one article. Available stock is derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub article_id: Uuid,
    pub actual_stock: i64,
    pub reserved_stock: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub article_id: Uuid,
    pub sku: String,
    pub actual_stock: i64,
    pub reserved_stock: i64,
    pub available_stock: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub article_id: Uuid,
    pub cartons: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub distributor_id: String,
    pub lines: Vec<CartLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[serde(alias = "PENDING")]
    Booked,
    ReadyForDispatch,
    Dispatched,
    Delivered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub article_id: Uuid,
    pub sku: String,
    pub carton_count: u32,
    pub pair_count: u64,
    pub price_per_pair: BigDecimal,
    pub line_total: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub distributor_id: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_cartons: u64,
    pub total_pairs: u64,
    pub total_amount: BigDecimal,
    #[serde(default)]
    pub stock_deducted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseOrderStatus {
    Open,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub article_id: Uuid,
    pub cartons: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub po_number: String,
    pub supplier: String,
    pub lines: Vec<PurchaseOrderLine>,
    pub status: PurchaseOrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderDraft {
    pub po_number: String,
    pub supplier: String,
    pub lines: Vec<PurchaseOrderLine>,
}

/// What a goods receipt is booked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrnReference {
    PurchaseOrder { po_number: String, article_id: Uuid },
    Catalogue { sku: String, article_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carton {
    pub barcode: String,
    pub pair_codes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub id: Uuid,
    pub article_id: Uuid,
    pub carton_barcode: String,
    pub pair_codes: Vec<String>,
    pub reference: GrnReference,
    pub received_at: DateTime<Utc>,
}

impl Availability {
    pub fn is_wishlisted(&self) -> bool {
        matches!(self, Availability::Wishlisted { .. })
    }
}

impl InventoryRecord {
    pub fn new(article_id: Uuid) -> Self {
        Self {
            article_id,
            actual_stock: 0,
            reserved_stock: 0,
        }
    }

    pub fn available_stock(&self) -> i64 {
        self.actual_stock - self.reserved_stock
    }

    pub fn snapshot(&self, sku: &str) -> InventorySnapshot {
        InventorySnapshot {
            article_id: self.article_id,
            sku: sku.to_string(),
            actual_stock: self.actual_stock,
            reserved_stock: self.reserved_stock,
            available_stock: self.available_stock(),
        }
    }
}

impl Cart {
    pub fn new(distributor_id: impl Into<String>) -> Self {
        Self {
            distributor_id: distributor_id.into(),
            lines: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn add(&mut self, article_id: Uuid, cartons: u32) -> PortalResult<()> {
        match self.lines.iter_mut().find(|line| line.article_id == article_id) {
            Some(line) => {
                line.cartons = line
                    .cartons
                    .checked_add(cartons)
                    .ok_or(PortalError::InvalidQuantity(i64::from(cartons)))?;
            }
            None => self.lines.push(CartLine { article_id, cartons }),
        }
        Ok(())
    }

    /// Sets the carton count for a line; zero removes it.
    pub fn set(&mut self, article_id: Uuid, cartons: u32) {
        if cartons == 0 {
            self.remove(article_id);
            return;
        }
        match self.lines.iter_mut().find(|line| line.article_id == article_id) {
            Some(line) => line.cartons = cartons,
            None => self.lines.push(CartLine { article_id, cartons }),
        }
    }

    pub fn decrement(&mut self, article_id: Uuid) {
        if let Some(index) = self.lines.iter().position(|line| line.article_id == article_id) {
            if self.lines[index].cartons <= 1 {
                self.lines.remove(index);
            } else {
                self.lines[index].cartons -= 1;
            }
        }
    }

    pub fn remove(&mut self, article_id: Uuid) {
        self.lines.retain(|line| line.article_id != article_id);
    }
}

impl OrderStatus {
    fn rank(self) -> u8 {
        match self {
            OrderStatus::Booked => 0,
            OrderStatus::ReadyForDispatch => 1,
            OrderStatus::Dispatched => 2,
            OrderStatus::Delivered => 3,
        }
    }

    pub fn is_before(self, other: OrderStatus) -> bool {
        self.rank() < other.rank()
    }

    /// True once the goods have physically left the warehouse.
    pub fn has_shipped(self) -> bool {
        self.rank() >= OrderStatus::Dispatched.rank()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Booked => write!(f, "BOOKED"),
            OrderStatus::ReadyForDispatch => write!(f, "READY_FOR_DISPATCH"),
            OrderStatus::Dispatched => write!(f, "DISPATCHED"),
            OrderStatus::Delivered => write!(f, "DELIVERED"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BOOKED" | "PENDING" => Ok(OrderStatus::Booked),
            "READY_FOR_DISPATCH" => Ok(OrderStatus::ReadyForDispatch),
            "DISPATCHED" => Ok(OrderStatus::Dispatched),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

impl OrderItem {
    pub fn new(article: &Article, carton_count: u32) -> Self {
        let pair_count = u64::from(carton_count) * u64::from(PAIRS_PER_CARTON);
        let line_total = BigDecimal::from(pair_count) * &article.price_per_pair;
        Self {
            article_id: article.id,
            sku: article.sku.clone(),
            carton_count,
            pair_count,
            price_per_pair: article.price_per_pair.clone(),
            line_total,
        }
    }
}

impl Order {
    pub fn new(distributor_id: impl Into<String>, items: Vec<OrderItem>) -> Self {
        let total_cartons = items.iter().map(|item| u64::from(item.carton_count)).sum();
        let total_pairs = items.iter().map(|item| item.pair_count).sum();
        let total_amount = items
            .iter()
            .fold(BigDecimal::zero(), |acc, item| acc + &item.line_total);
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            distributor_id: distributor_id.into(),
            status: OrderStatus::Booked,
            items,
            total_cartons,
            total_pairs,
            total_amount,
            stock_deducted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl PurchaseOrder {
    pub fn new(draft: PurchaseOrderDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            po_number: draft.po_number.trim().to_string(),
            supplier: draft.supplier.trim().to_string(),
            lines: draft.lines,
            status: PurchaseOrderStatus::Open,
            created_at: Utc::now(),
        }
    }
}

impl GrnReference {
    pub fn kind_code(&self) -> &'static str {
        match self {
            GrnReference::PurchaseOrder { .. } => "PO",
            GrnReference::Catalogue { .. } => "CAT",
        }
    }

    pub fn number(&self) -> &str {
        match self {
            GrnReference::PurchaseOrder { po_number, .. } => po_number,
            GrnReference::Catalogue { sku, .. } => sku,
        }
    }

    pub fn article_id(&self) -> Uuid {
        match self {
            GrnReference::PurchaseOrder { article_id, .. } => *article_id,
            GrnReference::Catalogue { article_id, .. } => *article_id,
        }
    }
}

impl StockEntry {
    pub fn from_carton(carton: &Carton, reference: &GrnReference) -> Self {
        Self {
            id: Uuid::new_v4(),
            article_id: reference.article_id(),
            carton_barcode: carton.barcode.clone(),
            pair_codes: carton.pair_codes.clone(),
            reference: reference.clone(),
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(price: &str) -> Article {
        Article {
            id: Uuid::new_v4(),
            sku: "KK-101".to_string(),
            name: "Runner".to_string(),
            category: Gender::Men,
            price_per_pair: price.parse().unwrap(),
            mrp: None,
            images: Vec::new(),
            size_range: None,
            size_breakup: Vec::new(),
            availability: Availability::Available,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn available_stock_is_derived() {
        let record = InventoryRecord {
            article_id: Uuid::new_v4(),
            actual_stock: 5,
            reserved_stock: 8,
        };
        assert_eq!(record.available_stock(), -3);
        assert_eq!(record.snapshot("KK-1").available_stock, -3);
    }

    #[test]
    fn cart_decrement_removes_line_at_one() {
        let id = Uuid::new_v4();
        let mut cart = Cart::new("dist-1");
        cart.add(id, 1).unwrap();
        cart.add(id, 1).unwrap();
        assert_eq!(cart.lines[0].cartons, 2);

        cart.decrement(id);
        assert_eq!(cart.lines[0].cartons, 1);
        cart.decrement(id);
        assert!(cart.is_empty());
    }

    #[test]
    fn cart_set_zero_removes_line() {
        let id = Uuid::new_v4();
        let mut cart = Cart::new("dist-1");
        cart.set(id, 4);
        assert_eq!(cart.lines, vec![CartLine { article_id: id, cartons: 4 }]);
        cart.set(id, 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn order_totals_follow_items() {
        let a = article("150.50");
        let b = article("200");
        let order = Order::new("dist-1", vec![OrderItem::new(&a, 2), OrderItem::new(&b, 1)]);

        assert_eq!(order.status, OrderStatus::Booked);
        assert_eq!(order.total_cartons, 3);
        assert_eq!(order.total_pairs, 72);
        assert_eq!(order.items[0].pair_count, 48);
        assert_eq!(order.total_amount, "12024".parse::<BigDecimal>().unwrap());
    }

    #[test]
    fn cart_add_rejects_carton_overflow() {
        let id = Uuid::new_v4();
        let mut cart = Cart::new("dist-1");
        cart.add(id, u32::MAX - 1).unwrap();
        assert_eq!(cart.add(id, 2), Err(PortalError::InvalidQuantity(2)));
        assert_eq!(cart.lines[0].cartons, u32::MAX - 1);
    }

    #[test]
    fn huge_lines_total_without_overflow() {
        let a = article("1");
        let order = Order::new(
            "dist-1",
            vec![OrderItem::new(&a, 200_000_000), OrderItem::new(&a, u32::MAX)],
        );
        assert_eq!(order.items[0].pair_count, 4_800_000_000);
        assert_eq!(order.total_cartons, 200_000_000 + u64::from(u32::MAX));
        assert_eq!(order.total_pairs, 24 * (200_000_000 + u64::from(u32::MAX)));
    }

    #[test]
    fn pending_is_read_as_booked() {
        let status: OrderStatus = serde_json::from_str("\"PENDING\"").unwrap();
        assert_eq!(status, OrderStatus::Booked);
        assert_eq!("pending".parse::<OrderStatus>(), Ok(OrderStatus::Booked));
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"BOOKED\"");
    }

    #[test]
    fn status_ordering() {
        assert!(OrderStatus::Booked.is_before(OrderStatus::Dispatched));
        assert!(!OrderStatus::Delivered.is_before(OrderStatus::Dispatched));
        assert!(OrderStatus::Delivered.has_shipped());
        assert!(!OrderStatus::ReadyForDispatch.has_shipped());
    }

    #[test]
    fn wishlisted_availability_requires_date() {
        let wish: Availability =
            serde_json::from_str(r#"{"status":"WISH","expected_date":"2026-12-01"}"#).unwrap();
        assert!(wish.is_wishlisted());

        let missing_date = serde_json::from_str::<Availability>(r#"{"status":"WISH"}"#);
        assert!(missing_date.is_err());

        let available: Availability = serde_json::from_str(r#"{"status":"AVAILABLE"}"#).unwrap();
        assert_eq!(available, Availability::Available);
    }

    #[test]
    fn grn_reference_parts() {
        let article_id = Uuid::new_v4();
        let po = GrnReference::PurchaseOrder {
            po_number: "PO-77".to_string(),
            article_id,
        };
        assert_eq!(po.kind_code(), "PO");
        assert_eq!(po.number(), "PO-77");
        assert_eq!(po.article_id(), article_id);

        let json = serde_json::to_value(&po).unwrap();
        assert_eq!(json["type"], "PURCHASE_ORDER");
    }
}
