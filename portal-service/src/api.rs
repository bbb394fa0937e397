use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use shared::sizes::{rebuild_breakup, total_pairs, validate_breakup};
use shared::*;
use uuid::Uuid;

use crate::grn::{GrnSessionView, ScanOutcome};
use crate::handlers::StoreHandle;
use crate::store::{Dashboard, GrnReceipt};

#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
    pub low_stock_threshold: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[derive(Debug, Deserialize)]
pub struct MovementRequest {
    pub cartons: i64,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdQuery {
    pub threshold: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub article_id: Uuid,
    pub cartons: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CartQuantityRequest {
    pub cartons: u32,
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub distributor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct BreakupRequest {
    pub size_range: String,
    #[serde(default)]
    pub previous: Vec<SizeEntry>,
}

#[derive(Debug, Serialize)]
pub struct BreakupResponse {
    pub sizes: Vec<SizeEntry>,
    pub total_pairs: u64,
    pub cartons: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub outcome: ScanOutcome,
    pub session: GrnSessionView,
}

#[derive(Debug, Deserialize)]
pub struct RemoveCartonQuery {
    #[serde(default)]
    pub confirm: bool,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/session", get(current_user).put(set_current_user))
        .route("/articles", get(list_articles).post(add_article))
        .route("/articles/:id/availability", put(update_availability))
        .route("/inventory", get(list_inventory))
        .route("/inventory/low-stock", get(low_stock))
        .route("/inventory/:article_id", get(inventory_of))
        .route("/inventory/:article_id/inward", post(inward))
        .route("/inventory/:article_id/outward", post(outward))
        .route("/carts/:distributor_id", get(cart))
        .route("/carts/:distributor_id/items", post(add_to_cart))
        .route(
            "/carts/:distributor_id/items/:article_id",
            put(set_cart_quantity).delete(remove_from_cart),
        )
        .route(
            "/carts/:distributor_id/items/:article_id/decrement",
            post(decrement_cart),
        )
        .route("/carts/:distributor_id/checkout", post(place_order))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(order))
        .route("/orders/:id/status", put(update_order_status))
        .route(
            "/purchase-orders",
            get(list_purchase_orders).post(create_purchase_order),
        )
        .route("/sizes/breakup", post(size_breakup))
        .route("/grn", post(open_grn))
        .route("/grn/:id", get(grn).delete(discard_grn))
        .route("/grn/:id/reference", put(select_grn_reference))
        .route("/grn/:id/scan", post(scan))
        .route("/grn/:id/rescan", post(rescan_carton))
        .route(
            "/grn/:id/cartons/:barcode",
            axum::routing::delete(remove_carton),
        )
        .route("/grn/:id/submit", post(submit_grn))
        .route("/dashboard", get(dashboard))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

fn reject(err: PortalError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        PortalError::ArticleNotFound(_)
        | PortalError::OrderNotFound(_)
        | PortalError::PurchaseOrderNotFound(_)
        | PortalError::SessionNotFound(_)
        | PortalError::NoCurrentUser
        | PortalError::Scan(ScanError::CartonNotFound(_)) => StatusCode::NOT_FOUND,
        PortalError::DuplicateSku(_)
        | PortalError::DuplicatePurchaseOrder(_)
        | PortalError::InvalidStatusTransition { .. }
        | PortalError::Scan(ScanError::ReferenceLocked) => StatusCode::CONFLICT,
        PortalError::Storage(_) | PortalError::StoreClosed => {
            tracing::error!("Request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn respond<T>(result: PortalResult<T>) -> ApiResult<T> {
    result.map(Json).map_err(reject)
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn current_user(State(state): State<AppState>) -> ApiResult<User> {
    respond(state.store.call(|store| store.current_user()).await)
}

pub async fn set_current_user(
    State(state): State<AppState>,
    Json(user): Json<User>,
) -> ApiResult<User> {
    respond(state.store.call(move |store| store.set_current_user(user)).await)
}

pub async fn list_articles(State(state): State<AppState>) -> ApiResult<Vec<Article>> {
    respond(state.store.read(|store| store.articles()).await)
}

pub async fn add_article(
    State(state): State<AppState>,
    Json(draft): Json<ArticleDraft>,
) -> ApiResult<Article> {
    respond(state.store.call(move |store| store.add_article(draft)).await)
}

pub async fn update_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(availability): Json<Availability>,
) -> ApiResult<Article> {
    respond(
        state
            .store
            .call(move |store| store.update_availability(id, availability))
            .await,
    )
}

pub async fn list_inventory(State(state): State<AppState>) -> ApiResult<Vec<InventorySnapshot>> {
    respond(state.store.read(|store| store.inventory()).await)
}

pub async fn low_stock(
    State(state): State<AppState>,
    Query(query): Query<ThresholdQuery>,
) -> ApiResult<Vec<InventorySnapshot>> {
    let threshold = query.threshold.unwrap_or(state.low_stock_threshold);
    respond(state.store.read(move |store| store.low_stock(threshold)).await)
}

pub async fn inventory_of(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> ApiResult<InventorySnapshot> {
    respond(state.store.call(move |store| store.inventory_of(article_id)).await)
}

pub async fn inward(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
    Json(request): Json<MovementRequest>,
) -> ApiResult<InventorySnapshot> {
    respond(
        state
            .store
            .call(move |store| store.inward(article_id, request.cartons))
            .await,
    )
}

pub async fn outward(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
    Json(request): Json<MovementRequest>,
) -> ApiResult<InventorySnapshot> {
    respond(
        state
            .store
            .call(move |store| store.outward(article_id, request.cartons))
            .await,
    )
}

pub async fn cart(
    State(state): State<AppState>,
    Path(distributor_id): Path<String>,
) -> ApiResult<Cart> {
    respond(state.store.read(move |store| store.cart(&distributor_id)).await)
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    Path(distributor_id): Path<String>,
    Json(request): Json<AddToCartRequest>,
) -> ApiResult<Cart> {
    let cartons = request.cartons.unwrap_or(1);
    respond(
        state
            .store
            .call(move |store| store.add_to_cart(&distributor_id, request.article_id, cartons))
            .await,
    )
}

pub async fn set_cart_quantity(
    State(state): State<AppState>,
    Path((distributor_id, article_id)): Path<(String, Uuid)>,
    Json(request): Json<CartQuantityRequest>,
) -> ApiResult<Cart> {
    respond(
        state
            .store
            .call(move |store| store.set_cart_quantity(&distributor_id, article_id, request.cartons))
            .await,
    )
}

pub async fn decrement_cart(
    State(state): State<AppState>,
    Path((distributor_id, article_id)): Path<(String, Uuid)>,
) -> ApiResult<Cart> {
    respond(
        state
            .store
            .call(move |store| store.decrement_cart(&distributor_id, article_id))
            .await,
    )
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    Path((distributor_id, article_id)): Path<(String, Uuid)>,
) -> ApiResult<Cart> {
    respond(
        state
            .store
            .call(move |store| store.remove_from_cart(&distributor_id, article_id))
            .await,
    )
}

pub async fn place_order(
    State(state): State<AppState>,
    Path(distributor_id): Path<String>,
) -> ApiResult<Order> {
    let result = state
        .store
        .call(move |store| store.place_order(&distributor_id))
        .await;
    if let Ok(order) = &result {
        tracing::info!("Checkout created order {}", order.id);
    }
    respond(result)
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> ApiResult<Vec<Order>> {
    respond(
        state
            .store
            .read(move |store| store.orders(query.distributor_id.as_deref()))
            .await,
    )
}

pub async fn order(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Order> {
    respond(state.store.call(move |store| store.order(id)).await)
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Order> {
    respond(
        state
            .store
            .call(move |store| store.update_order_status(id, request.status))
            .await,
    )
}

pub async fn list_purchase_orders(State(state): State<AppState>) -> ApiResult<Vec<PurchaseOrder>> {
    respond(state.store.read(|store| store.purchase_orders()).await)
}

pub async fn create_purchase_order(
    State(state): State<AppState>,
    Json(draft): Json<PurchaseOrderDraft>,
) -> ApiResult<PurchaseOrder> {
    respond(
        state
            .store
            .call(move |store| store.create_purchase_order(draft))
            .await,
    )
}

/// Stateless helper for the catalogue form: expand the range, carry over
/// counts, and report whether the total fills whole cartons.
pub async fn size_breakup(Json(request): Json<BreakupRequest>) -> Json<BreakupResponse> {
    let sizes = rebuild_breakup(&request.size_range, &request.previous);
    let pairs = total_pairs(&sizes);
    let (cartons, error) = match validate_breakup(&sizes) {
        Ok(cartons) => (Some(cartons), None),
        Err(e) => (None, Some(e.to_string())),
    };
    Json(BreakupResponse {
        sizes,
        total_pairs: pairs,
        cartons,
        error,
    })
}

pub async fn open_grn(State(state): State<AppState>) -> ApiResult<GrnSessionView> {
    respond(state.store.call(|store| Ok(store.open_grn())).await)
}

pub async fn grn(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<GrnSessionView> {
    respond(state.store.call(move |store| store.grn(id)).await)
}

pub async fn discard_grn(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state
        .store
        .call(move |store| store.discard_grn(id))
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(reject)
}

pub async fn select_grn_reference(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(reference): Json<GrnReference>,
) -> ApiResult<GrnSessionView> {
    respond(
        state
            .store
            .call(move |store| store.select_grn_reference(id, reference))
            .await,
    )
}

pub async fn scan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ScanRequest>,
) -> ApiResult<ScanResponse> {
    respond(
        state
            .store
            .call(move |store| {
                let outcome = store.scan(id, &request.code)?;
                let session = store.grn(id)?;
                Ok(ScanResponse { outcome, session })
            })
            .await,
    )
}

pub async fn rescan_carton(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<GrnSessionView> {
    respond(state.store.call(move |store| store.rescan_carton(id)).await)
}

pub async fn remove_carton(
    State(state): State<AppState>,
    Path((id, barcode)): Path<(Uuid, String)>,
    Query(query): Query<RemoveCartonQuery>,
) -> ApiResult<GrnSessionView> {
    respond(
        state
            .store
            .call(move |store| store.remove_carton(id, &barcode, query.confirm))
            .await,
    )
}

pub async fn submit_grn(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<GrnReceipt> {
    respond(state.store.call(move |store| store.submit_grn(id)).await)
}

pub async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<ThresholdQuery>,
) -> ApiResult<Dashboard> {
    let threshold = query.threshold.unwrap_or(state.low_stock_threshold);
    respond(state.store.read(move |store| store.dashboard(threshold)).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, PersistencePolicy};
    use crate::store::PortalStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let store = PortalStore::load(Arc::new(MemoryStorage::new()), PersistencePolicy::default())
            .unwrap();
        create_router(AppState {
            store: StoreHandle::spawn(store),
            low_stock_threshold: 10,
        })
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create_article(app: &Router, sku: &str) -> String {
        let (status, article) = send(
            app,
            Method::POST,
            "/articles",
            Some(json!({
                "sku": sku,
                "name": "Street Runner",
                "category": "MEN",
                "price_per_pair": "180.00",
                "size_range": "6-9",
                "size_breakup": [
                    {"size": "6", "pairs": 6},
                    {"size": "7", "pairs": 6},
                    {"size": "8", "pairs": 6},
                    {"size": "9", "pairs": 6}
                ],
                "availability": {"status": "AVAILABLE"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", article);
        article["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health() {
        let app = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn order_reserves_and_dispatch_deducts_once() {
        let app = app();
        let id = create_article(&app, "KK-SR-1").await;

        let (_, stock) = send(
            &app,
            Method::POST,
            &format!("/inventory/{}/inward", id),
            Some(json!({"cartons": 100})),
        )
        .await;
        assert_eq!(stock["available_stock"], 100);

        let (status, _) = send(
            &app,
            Method::POST,
            "/carts/dist-7/items",
            Some(json!({"article_id": id, "cartons": 10})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, order) = send(&app, Method::POST, "/carts/dist-7/checkout", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "BOOKED");
        assert_eq!(order["total_pairs"], 240);
        let order_id = order["id"].as_str().unwrap().to_string();

        let (_, stock) = send(&app, Method::GET, &format!("/inventory/{}", id), None).await;
        assert_eq!(stock["reserved_stock"], 10);
        assert_eq!(stock["available_stock"], 90);

        for _ in 0..2 {
            let (status, order) = send(
                &app,
                Method::PUT,
                &format!("/orders/{}/status", order_id),
                Some(json!({"status": "DISPATCHED"})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(order["status"], "DISPATCHED");
        }

        let (_, stock) = send(&app, Method::GET, &format!("/inventory/{}", id), None).await;
        assert_eq!(stock["actual_stock"], 90);
        assert_eq!(stock["reserved_stock"], 0);
        assert_eq!(stock["available_stock"], 90);

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/orders/{}/status", order_id),
            Some(json!({"status": "PENDING"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT, "{}", body);

        let (_, orders) = send(&app, Method::GET, "/orders?distributor_id=dist-7", None).await;
        assert_eq!(orders.as_array().unwrap().len(), 1);
        let (_, orders) = send(&app, Method::GET, "/orders?distributor_id=dist-8", None).await;
        assert!(orders.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn validation_and_lookup_errors() {
        let app = app();
        let (status, body) = send(&app, Method::POST, "/carts/dist-1/checkout", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "cart is empty");

        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/inventory/{}", Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        create_article(&app, "KK-DUP").await;
        let (status, _) = send(
            &app,
            Method::POST,
            "/articles",
            Some(json!({
                "sku": "kk-dup",
                "name": "Copy",
                "category": "KIDS",
                "price_per_pair": "99",
                "availability": {"status": "AVAILABLE"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn size_breakup_helper() {
        let app = app();
        let (_, body) = send(
            &app,
            Method::POST,
            "/sizes/breakup",
            Some(json!({
                "size_range": "4-7",
                "previous": [
                    {"size": "4", "pairs": 6},
                    {"size": "5", "pairs": 6},
                    {"size": "6", "pairs": 6},
                    {"size": "7", "pairs": 5}
                ]
            })),
        )
        .await;
        assert_eq!(body["total_pairs"], 23);
        assert_eq!(body["cartons"], Value::Null);
        assert!(body["error"].is_string());

        let (_, body) = send(
            &app,
            Method::POST,
            "/sizes/breakup",
            Some(json!({"size_range": "8-4"})),
        )
        .await;
        assert_eq!(body["sizes"], json!([]));
        assert_eq!(body["cartons"], 0);
    }

    #[tokio::test]
    async fn goods_receipt_over_http() {
        let app = app();
        let id = create_article(&app, "KK-GR-1").await;

        let (_, session) = send(&app, Method::POST, "/grn", None).await;
        let session_id = session["id"].as_str().unwrap().to_string();
        assert_eq!(session["state"], "NO_REFERENCE");

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/grn/{}/scan", session_id),
            Some(json!({"code": "P000"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, session) = send(
            &app,
            Method::PUT,
            &format!("/grn/{}/reference", session_id),
            Some(json!({"type": "CATALOGUE", "sku": "KK-GR-1", "article_id": id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["state"], "REFERENCE_SELECTED");

        let mut last = Value::Null;
        for i in 0..24 {
            let (status, body) = send(
                &app,
                Method::POST,
                &format!("/grn/{}/scan", session_id),
                Some(json!({"code": format!("P{:03}", i)})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            last = body;
        }
        assert_eq!(last["outcome"]["result"], "CARTON_LOCKED");
        assert_eq!(last["session"]["can_submit"], true);
        let barcode = last["outcome"]["carton"]["barcode"].as_str().unwrap().to_string();
        assert!(barcode.starts_with("CAT-KK-GR-1-"));

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/grn/{}/cartons/{}", session_id, barcode),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, receipt) = send(&app, Method::POST, &format!("/grn/{}/submit", session_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(receipt["entries"].as_array().unwrap().len(), 1);
        assert_eq!(receipt["stock"]["actual_stock"], 1);

        let (status, _) = send(&app, Method::GET, &format!("/grn/{}", session_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn abandoned_goods_receipt_can_be_discarded() {
        let app = app();
        let (_, session) = send(&app, Method::POST, "/grn", None).await;
        let uri = format!("/grn/{}", session["id"].as_str().unwrap());

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_cart_checkout_keeps_the_store_alive() {
        let app = app();
        let id = create_article(&app, "KK-BIG-1").await;

        let (status, _) = send(
            &app,
            Method::POST,
            "/carts/dist-9/items",
            Some(json!({"article_id": id, "cartons": 200_000_000u32})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, order) = send(&app, Method::POST, "/carts/dist-9/checkout", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["total_pairs"], 4_800_000_000u64);

        let (status, _) = send(&app, Method::GET, "/articles", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
