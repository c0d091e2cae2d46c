//! HTTP surface over the cart reconciler and the checkout gate.
//!
//! The session comes from the `x-auth-token` and `x-device-id` headers; each distinct
//! session gets its own reconciler, kept for the life of the process.

use std::collections::HashMap;
use std::sync::Arc;
use axum::{extract::{Path, State}, http::{HeaderMap, StatusCode}, routing::{delete, get, post, put}, Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use validator::Validate;
use crate::domain::aggregates::ItemSelection;
use crate::domain::policy::MAX_DROPDOWN_QUANTITY;
use crate::domain::pricing::{PricingBreakdown, PricingEngine};
use crate::domain::value_objects::QuantityOption;
use crate::services::{AuthorityError, CartReconciler, CartView, CheckoutGate, InMemoryBackend, OrderService, PlacedOrder, QuantityOutcome, SessionContext};
use crate::{CartError, Item, ItemId, LineId, OrderRef};

const AUTH_HEADER: &str = "x-auth-token";
const DEVICE_HEADER: &str = "x-device-id";

type ApiResult<T> = std::result::Result<T, (StatusCode, String)>;

#[derive(Clone)]
pub struct AppState {
    pub backend: InMemoryBackend,
    pub pricing: PricingEngine,
    carts: Arc<Mutex<HashMap<(Option<String>, String), Arc<CartReconciler>>>>,
}

impl AppState {
    pub fn new(backend: InMemoryBackend, pricing: PricingEngine) -> Self {
        Self { backend, pricing, carts: Arc::default() }
    }

    async fn reconciler(&self, session: SessionContext) -> Arc<CartReconciler> {
        let key = (session.token.clone(), session.device_id.clone());
        let mut carts = self.carts.lock().await;
        carts.entry(key)
            .or_insert_with(|| Arc::new(CartReconciler::new(Arc::new(self.backend.clone()), session)))
            .clone()
    }

    fn gate(&self) -> CheckoutGate { CheckoutGate::new(Arc::new(self.backend.clone()), self.pricing.clone()) }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-cart"})) }))
        .route("/api/v1/items", get(list_items))
        .route("/api/v1/cart", get(get_cart))
        .route("/api/v1/cart/refresh", post(refresh_cart))
        .route("/api/v1/cart/lines", post(add_line))
        .route("/api/v1/cart/lines/:id/quantity", put(select_quantity))
        .route("/api/v1/cart/lines/:id/custom", put(change_custom_quantity))
        .route("/api/v1/cart/lines/:id/removal", post(stage_removal))
        .route("/api/v1/cart/removal", delete(cancel_removal))
        .route("/api/v1/cart/removal/confirm", post(confirm_removal))
        .route("/api/v1/cart/notification", delete(dismiss_notification))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/orders", get(list_orders))
        .with_state(state)
}

fn session_from(headers: &HeaderMap) -> SessionContext {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    SessionContext {
        token: header(AUTH_HEADER).filter(|t| !t.is_empty()),
        device_id: header(DEVICE_HEADER).unwrap_or_else(|| "unknown".to_string()),
    }
}

fn status(e: CartError) -> (StatusCode, String) {
    let code = match &e {
        CartError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        CartError::LineNotFound(_) => StatusCode::NOT_FOUND,
        CartError::LineBusy(_) | CartError::SubmissionConflict(_) => StatusCode::CONFLICT,
        CartError::CheckoutBlocked(_) | CartError::InvalidSelection(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CartError::NoStagedRemoval => StatusCode::BAD_REQUEST,
        CartError::Load(_) => StatusCode::SERVICE_UNAVAILABLE,
        CartError::Persistence(_) | CartError::Authority(_) => StatusCode::BAD_GATEWAY,
    };
    (code, e.to_string())
}

fn invalid(e: validator::ValidationErrors) -> (StatusCode, String) { (StatusCode::BAD_REQUEST, e.to_string()) }

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart: CartView,
    pub pricing: PricingBreakdown,
    pub checkout_ready: bool,
    pub blocking_message: Option<String>,
}

async fn cart_response(state: &AppState, reconciler: &CartReconciler) -> CartResponse {
    let snapshot = reconciler.snapshot().await;
    let (pricing, checkout_ready, blocking_message) = match &snapshot.cart {
        Some(cart) => (
            state.pricing.breakdown(cart, &snapshot.states).rounded(),
            CheckoutGate::is_eligible(cart, &snapshot.states),
            CheckoutGate::blocking_message(cart, &snapshot.states),
        ),
        None => (state.pricing.breakdown_for_subtotal(Default::default()).rounded(), false, None),
    };
    CartResponse { cart: reconciler.view().await, pricing, checkout_ready, blocking_message }
}

async fn list_items(State(s): State<AppState>) -> Json<Vec<Item>> { Json(s.backend.catalog().await) }

/// Loads the cart on first access for a session; later reads reuse the reconciled state.
async fn get_cart(State(s): State<AppState>, headers: HeaderMap) -> ApiResult<Json<CartResponse>> {
    let r = s.reconciler(session_from(&headers)).await;
    let view = r.view().await;
    if r.snapshot().await.cart.is_none() && view.load_error.is_none() {
        r.fetch_cart().await.map_err(status)?;
    }
    Ok(Json(cart_response(&s, &r).await))
}

async fn refresh_cart(State(s): State<AppState>, headers: HeaderMap) -> ApiResult<Json<CartResponse>> {
    let r = s.reconciler(session_from(&headers)).await;
    r.fetch_cart().await.map_err(status)?;
    Ok(Json(cart_response(&s, &r).await))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddLineRequest {
    #[validate(length(min = 1, max = 64))]
    pub item_id: String,
    #[validate(range(min = 1, max = 100000))]
    pub quantity: u32,
}

async fn add_line(State(s): State<AppState>, headers: HeaderMap, Json(req): Json<AddLineRequest>) -> ApiResult<(StatusCode, Json<CartResponse>)> {
    req.validate().map_err(invalid)?;
    let r = s.reconciler(session_from(&headers)).await;
    let item = s.backend.item(&ItemId::new(req.item_id.as_str())).await
        .ok_or((StatusCode::NOT_FOUND, format!("Item not found: {}", req.item_id)))?;
    r.add_selection(&ItemSelection::with_quantity(item, req.quantity)).await.map_err(status)?;
    Ok((StatusCode::CREATED, Json(cart_response(&s, &r).await)))
}

#[derive(Debug, Serialize)]
pub struct QuantityResponse {
    pub outcome: QuantityOutcome,
    #[serde(flatten)]
    pub cart: CartResponse,
}

/// `{"quantity": 3}` picks a dropdown entry; `{"custom": true}` picks "10+ (Custom)".
/// Larger exact values belong on the custom route.
#[derive(Debug, Deserialize)]
pub struct SelectQuantityRequest {
    pub quantity: Option<u32>,
    #[serde(default)]
    pub custom: bool,
}

async fn select_quantity(State(s): State<AppState>, headers: HeaderMap, Path(id): Path<String>, Json(req): Json<SelectQuantityRequest>) -> ApiResult<Json<QuantityResponse>> {
    let option = match (req.custom, req.quantity) {
        (true, _) => QuantityOption::Custom,
        (false, Some(n)) if (1..=MAX_DROPDOWN_QUANTITY).contains(&n) => QuantityOption::Exact(n),
        (false, Some(n)) => {
            return Err((StatusCode::UNPROCESSABLE_ENTITY, format!("{n} is not a dropdown option; use the custom quantity for more than {MAX_DROPDOWN_QUANTITY}")))
        }
        (false, None) => return Err((StatusCode::BAD_REQUEST, "quantity or custom is required".to_string())),
    };
    let r = s.reconciler(session_from(&headers)).await;
    let outcome = r.select_quantity(&LineId::new(id.as_str()), option).await.map_err(status)?;
    debug!(line_id = %id, ?outcome, "dropdown quantity settled");
    Ok(Json(QuantityResponse { outcome, cart: cart_response(&s, &r).await }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CustomQuantityRequest {
    #[validate(length(max = 16))]
    pub text: String,
}

async fn change_custom_quantity(State(s): State<AppState>, headers: HeaderMap, Path(id): Path<String>, Json(req): Json<CustomQuantityRequest>) -> ApiResult<Json<QuantityResponse>> {
    req.validate().map_err(invalid)?;
    let r = s.reconciler(session_from(&headers)).await;
    let outcome = r.change_custom_quantity(&LineId::new(id.as_str()), &req.text).await.map_err(status)?;
    debug!(line_id = %id, ?outcome, "custom quantity settled");
    Ok(Json(QuantityResponse { outcome, cart: cart_response(&s, &r).await }))
}

async fn stage_removal(State(s): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> ApiResult<Json<CartResponse>> {
    let r = s.reconciler(session_from(&headers)).await;
    r.stage_removal(&LineId::new(id.as_str())).await.map_err(status)?;
    Ok(Json(cart_response(&s, &r).await))
}

async fn cancel_removal(State(s): State<AppState>, headers: HeaderMap) -> Json<CartResponse> {
    let r = s.reconciler(session_from(&headers)).await;
    r.cancel_removal().await;
    Json(cart_response(&s, &r).await)
}

async fn confirm_removal(State(s): State<AppState>, headers: HeaderMap) -> ApiResult<Json<CartResponse>> {
    let r = s.reconciler(session_from(&headers)).await;
    r.confirm_removal().await.map_err(status)?;
    Ok(Json(cart_response(&s, &r).await))
}

async fn dismiss_notification(State(s): State<AppState>, headers: HeaderMap) -> StatusCode {
    s.reconciler(session_from(&headers)).await.dismiss_notification().await;
    StatusCode::NO_CONTENT
}

async fn checkout(State(s): State<AppState>, headers: HeaderMap) -> ApiResult<(StatusCode, Json<PlacedOrder>)> {
    let r = s.reconciler(session_from(&headers)).await;
    let placed = s.gate().proceed(&r).await.map_err(status)?;
    Ok((StatusCode::CREATED, Json(PlacedOrder { pricing: placed.pricing.rounded(), ..placed })))
}

async fn list_orders(State(s): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Vec<OrderRef>>> {
    s.backend.list_orders(&session_from(&headers)).await
        .map(Json)
        .map_err(|e| match e {
            AuthorityError::Unauthorized => status(CartError::NotAuthenticated),
            other => status(CartError::Authority(other.to_string())),
        })
}
