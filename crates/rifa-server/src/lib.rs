// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rifa_model::{BoardSnapshot, Ticket, TicketNumber};
use rifa_registry::{SellError, TicketRegistry, ToggleError};
use rifa_store::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod config;

pub use config::{env_bool, env_duration_ms, env_u64, env_usize, ServerConfig};

pub const CRATE_NAME: &str = "rifa-server";

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TicketRegistry>,
    /// Flips true once the first board snapshot has arrived.
    pub ready: Arc<AtomicBool>,
}

impl AppState {
    #[must_use]
    pub fn new(registry: Arc<TicketRegistry>) -> Self {
        Self {
            registry,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    InvalidInput,
    AlreadySold,
    NotSold,
    StoreTimeout,
    StoreUnavailable,
    NotReady,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub details: Value,
}

impl ApiError {
    #[must_use]
    pub fn new(code: ApiErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.code {
            ApiErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
            ApiErrorCode::AlreadySold => StatusCode::CONFLICT,
            ApiErrorCode::NotSold => StatusCode::NOT_FOUND,
            ApiErrorCode::StoreTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiErrorCode::StoreUnavailable => StatusCode::BAD_GATEWAY,
            ApiErrorCode::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

fn store_error_api(e: &StoreError) -> ApiError {
    match e {
        StoreError::Timeout => ApiError::new(
            ApiErrorCode::StoreTimeout,
            "document store timed out",
            Value::Null,
        ),
        StoreError::Unavailable(msg) => ApiError::new(
            ApiErrorCode::StoreUnavailable,
            "document store unavailable",
            json!({ "cause": msg }),
        ),
        StoreError::Corrupt(msg) => ApiError::new(
            ApiErrorCode::StoreUnavailable,
            "document store returned a corrupt payload",
            json!({ "cause": msg }),
        ),
    }
}

fn sell_error_api(e: SellError) -> ApiError {
    match e {
        SellError::InvalidInput(v) => {
            ApiError::new(ApiErrorCode::InvalidInput, v.to_string(), Value::Null)
        }
        SellError::AlreadySold { existing_buyer } => ApiError::new(
            ApiErrorCode::AlreadySold,
            "ticket already sold",
            json!({ "existing_buyer": existing_buyer }),
        ),
        SellError::Store(store) => store_error_api(&store),
    }
}

fn toggle_error_api(e: ToggleError) -> ApiError {
    match e {
        ToggleError::InvalidNumber(v) => {
            ApiError::new(ApiErrorCode::InvalidInput, v.to_string(), Value::Null)
        }
        ToggleError::NotSold => ApiError::new(
            ApiErrorCode::NotSold,
            "ticket is not sold",
            Value::Null,
        ),
        ToggleError::Store(store) => store_error_api(&store),
    }
}

#[derive(Debug, Serialize)]
pub struct TicketBody {
    pub buyer: String,
    pub phone: String,
    pub paid: bool,
    pub sold_at: i64,
}

impl TicketBody {
    fn from_ticket(ticket: &Ticket) -> Self {
        Self {
            buyer: ticket.buyer.as_str().to_string(),
            phone: ticket.phone.as_str().to_string(),
            paid: ticket.paid,
            sold_at: ticket.sold_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BoardBody {
    pub tickets: BTreeMap<String, TicketBody>,
    pub sold: usize,
    pub remaining: usize,
}

impl BoardBody {
    fn from_snapshot(snapshot: &BoardSnapshot) -> Self {
        Self {
            tickets: snapshot
                .iter()
                .map(|(number, ticket)| (number.key(), TicketBody::from_ticket(ticket)))
                .collect(),
            sold: snapshot.sold_count(),
            remaining: snapshot.remaining(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SellRequest {
    pub buyer: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct PaidRequest {
    pub paid: bool,
}

async fn get_board(State(state): State<AppState>) -> Json<BoardBody> {
    Json(BoardBody::from_snapshot(&state.registry.snapshot()))
}

async fn get_ticket(
    State(state): State<AppState>,
    Path(number): Path<i64>,
) -> Result<Json<TicketBody>, ApiError> {
    let number = TicketNumber::parse(number)
        .map_err(|e| ApiError::new(ApiErrorCode::InvalidInput, e.to_string(), Value::Null))?;
    let snapshot = state.registry.snapshot();
    let ticket = snapshot.get(number).ok_or_else(|| {
        ApiError::new(ApiErrorCode::NotSold, "ticket is not sold", Value::Null)
    })?;
    Ok(Json(TicketBody::from_ticket(ticket)))
}

async fn sell_ticket(
    State(state): State<AppState>,
    Path(number): Path<i64>,
    Json(body): Json<SellRequest>,
) -> Result<(StatusCode, Json<TicketBody>), ApiError> {
    let ticket = state
        .registry
        .sell(number, &body.buyer, &body.phone)
        .await
        .map_err(sell_error_api)?;
    Ok((StatusCode::CREATED, Json(TicketBody::from_ticket(&ticket))))
}

async fn set_paid(
    State(state): State<AppState>,
    Path(number): Path<i64>,
    Json(body): Json<PaidRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .registry
        .set_paid(number, body.paid)
        .await
        .map_err(toggle_error_api)?;
    Ok(Json(json!({ "number": number, "paid": body.paid })))
}

async fn livez() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    if state.ready.load(Ordering::Relaxed) {
        Ok("ready")
    } else {
        Err(ApiError::new(
            ApiErrorCode::NotReady,
            "waiting for first board snapshot",
            Value::Null,
        ))
    }
}

#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/board", get(get_board))
        .route("/v1/tickets/:number", get(get_ticket).post(sell_ticket))
        .route("/v1/tickets/:number/paid", post(set_paid))
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_expected_statuses() {
        let cases = [
            (ApiErrorCode::InvalidInput, StatusCode::BAD_REQUEST),
            (ApiErrorCode::AlreadySold, StatusCode::CONFLICT),
            (ApiErrorCode::NotSold, StatusCode::NOT_FOUND),
            (ApiErrorCode::StoreTimeout, StatusCode::GATEWAY_TIMEOUT),
            (ApiErrorCode::StoreUnavailable, StatusCode::BAD_GATEWAY),
            (ApiErrorCode::NotReady, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (code, status) in cases {
            assert_eq!(ApiError::new(code, "x", Value::Null).status(), status);
        }
    }

    #[test]
    fn already_sold_details_carry_the_holder() {
        let api = sell_error_api(SellError::AlreadySold {
            existing_buyer: "Ana".to_string(),
        });
        assert_eq!(api.details["existing_buyer"], "Ana");
        assert_eq!(api.status(), StatusCode::CONFLICT);
    }
}
