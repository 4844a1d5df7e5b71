//! Order creation and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Money, NewOrder, Order};
use lifecycle::ReservationService;
use order_store::OrderRepository;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Repository handle shared by handlers and the sweeper.
pub type SharedRepository = Arc<dyn OrderRepository>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub service: ReservationService<SharedRepository>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub buyer_id: String,
    pub egg_type: String,
    pub quantity: u32,
    pub total_amount_cents: i64,
}

// -- Response types --

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub buyer_id: String,
    pub egg_type: String,
    pub quantity: u32,
    pub state: String,
    pub downpayment_cents: i64,
    pub total_amount_cents: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            buyer_id: order.buyer_id().to_string(),
            egg_type: order.egg_type().to_string(),
            quantity: order.quantity(),
            state: order.state().to_string(),
            downpayment_cents: order.downpayment().cents(),
            total_amount_cents: order.total_amount().cents(),
            expires_at: order.expires_at(),
            version: order.version().as_i64(),
        }
    }
}

/// Ids that are not UUIDs cannot name an order.
fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("Order not found: {raw}")))
}

// -- Handlers --

/// POST /orders: create a draft order.
#[tracing::instrument(skip(state, req), fields(buyer_id = %req.buyer_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let new_order = NewOrder::new(
        req.buyer_id,
        req.egg_type,
        req.quantity,
        Money::from_cents(req.total_amount_cents),
    );
    let order = state.service.create_order(new_order).await?;

    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders/{id}: read an order.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id = parse_order_id(&id)?;
    let order = state.service.get_order(id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/reserve: reserve the downpayment.
#[tracing::instrument(skip(state))]
pub async fn reserve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let id = parse_order_id(&id)?;
    let order = state.service.reserve(id).await?;
    Ok((StatusCode::ACCEPTED, Json(OrderResponse::from(&order))))
}

/// POST /orders/{id}/confirm: confirm payment of a live reservation.
#[tracing::instrument(skip(state))]
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id = parse_order_id(&id)?;
    let order = state.service.confirm_payment(id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/cancel: cancel at the buyer's request.
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id = parse_order_id(&id)?;
    let order = state.service.cancel(id).await?;
    Ok(Json(OrderResponse::from(&order)))
}
