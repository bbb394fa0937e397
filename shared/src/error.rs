use thiserror::Error;
use uuid::Uuid;

use crate::OrderStatus;

pub type PortalResult<T> = Result<T, PortalError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("select a purchase order or catalogue article before scanning")]
    NoReference,
    #[error("scanned code is empty")]
    EmptyCode,
    #[error("pair {0} is already in the current carton")]
    DuplicateInCarton(String),
    #[error("pair {0} was already scanned in this receipt")]
    DuplicateInSession(String),
    #[error("carton {0} not found")]
    CartonNotFound(String),
    #[error("removing carton {0} must be confirmed")]
    RemovalNotConfirmed(String),
    #[error("submit needs at least one locked carton and no partially scanned carton")]
    NotReadyToSubmit,
    #[error("reference cannot change once scanning has started")]
    ReferenceLocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortalError {
    #[error("article {0} not found")]
    ArticleNotFound(Uuid),
    #[error("order {0} not found")]
    OrderNotFound(Uuid),
    #[error("purchase order {0} not found")]
    PurchaseOrderNotFound(String),
    #[error("reference {0} does not match the selected article")]
    ReferenceMismatch(String),
    #[error("goods receipt session {0} not found")]
    SessionNotFound(Uuid),
    #[error("no user is signed in")]
    NoCurrentUser,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("quantity must be at least one carton, got {0}")]
    InvalidQuantity(i64),
    #[error("price per pair must be greater than zero")]
    InvalidPrice,
    #[error("sku {0} already exists")]
    DuplicateSku(String),
    #[error("purchase order {0} already exists")]
    DuplicatePurchaseOrder(String),
    #[error("size breakup totals {total} pairs, which is not a whole number of 24-pair cartons")]
    SizeBreakupNotCartonMultiple { total: u64 },
    #[error("cart is empty")]
    EmptyCart,
    #[error("article {0} is on the wish list and cannot be ordered yet")]
    ArticleWishlisted(String),
    #[error("order cannot move from {from} back to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("store is no longer running")]
    StoreClosed,
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        PortalError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for PortalError {
    fn from(err: std::io::Error) -> Self {
        PortalError::Storage(err.to_string())
    }
}
