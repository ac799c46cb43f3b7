//! Routes and shared state for the serial service.
//!
//! Allocation does blocking file I/O (lock, read, fsync, rename), so every
//! call is moved onto Tokio's blocking pool with
//! [`tokio::task::spawn_blocking`].
//!
//! | Method | Path                   | Result                                  |
//! |--------|------------------------|-----------------------------------------|
//! | POST   | `/serials`             | `201` with the next serial for today    |
//! | GET    | `/serials/{date_key}`  | `200` with the day's last issued counter|
//! | POST   | `/quotations`          | `201` quotation with its `quote_number` |
//! | GET    | `/health`              | `200`                                   |

use crate::server::{
    service::error::ServiceError,
    telemetry::{increment_allocation_errors, increment_serials_allocated, record_allocation_duration},
};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use dayseq::{DateKey, Serial, SerialAllocator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    allocator: Arc<dyn SerialAllocator>,
}

impl AppState {
    pub fn new(allocator: Arc<dyn SerialAllocator>) -> Self {
        Self { allocator }
    }

    /// Allocates one serial off the async runtime, recording metrics.
    async fn allocate(&self) -> Result<Serial, ServiceError> {
        let start = Instant::now();
        let allocator = Arc::clone(&self.allocator);
        let result = tokio::task::spawn_blocking(move || allocator.try_allocate())
            .await
            .map_err(ServiceError::from)
            .and_then(|r| r.map_err(ServiceError::from));
        record_allocation_duration(start.elapsed().as_secs_f64() * 1_000.0);

        match &result {
            Ok(serial) => {
                increment_serials_allocated();
                tracing::info!(%serial, "allocated serial");
            }
            Err(e) => increment_allocation_errors(e.kind()),
        }
        result
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/serials", post(create_serial))
        .route("/serials/{date_key}", get(get_serial_counter))
        .route("/quotations", post(create_quotation))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
pub struct SerialResponse {
    pub serial: Serial,
    pub date_key: DateKey,
    pub counter: u64,
}

impl From<Serial> for SerialResponse {
    fn from(serial: Serial) -> Self {
        Self {
            date_key: serial.date_key(),
            counter: serial.counter(),
            serial,
        }
    }
}

#[tracing::instrument(skip_all)]
async fn create_serial(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SerialResponse>), ServiceError> {
    let serial = state.allocate().await?;
    Ok((StatusCode::CREATED, Json(serial.into())))
}

#[derive(Debug, Serialize)]
pub struct CounterResponse {
    pub date_key: DateKey,
    pub last_issued: u64,
}

#[tracing::instrument(skip_all)]
async fn get_serial_counter(
    State(state): State<AppState>,
    Path(date_key): Path<String>,
) -> Result<Json<CounterResponse>, ServiceError> {
    let date_key: DateKey = date_key.parse()?;
    let allocator = Arc::clone(&state.allocator);
    let last_issued =
        tokio::task::spawn_blocking(move || allocator.last_issued(date_key)).await??;
    Ok(Json(CounterResponse {
        date_key,
        last_issued,
    }))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuotationItem {
    pub description: String,
    pub quantity: u32,
    /// Price of one unit in minor currency units (e.g. cents).
    pub unit_price_cents: u64,
}

#[derive(Debug, Deserialize)]
pub struct QuotationRequest {
    pub customer: String,
    pub items: Vec<QuotationItem>,
    /// Serials are assigned by the server; supplying one is rejected.
    #[serde(default)]
    pub quote_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuotationResponse {
    pub quote_number: Serial,
    pub customer: String,
    pub items: Vec<QuotationItem>,
    pub total_cents: u64,
}

impl QuotationRequest {
    /// Checks the request and returns its total in minor units.
    fn validate(&self) -> Result<u64, ServiceError> {
        if self.quote_number.is_some() {
            return Err(ServiceError::invalid(
                "quote_number is assigned by the server and must not be supplied",
            ));
        }
        if self.customer.trim().is_empty() {
            return Err(ServiceError::invalid("customer must not be empty"));
        }
        if self.items.is_empty() {
            return Err(ServiceError::invalid("a quotation needs at least one item"));
        }
        self.items.iter().try_fold(0u64, |total, item| {
            if item.quantity == 0 {
                return Err(ServiceError::invalid(format!(
                    "item {:?} has zero quantity",
                    item.description
                )));
            }
            u64::from(item.quantity)
                .checked_mul(item.unit_price_cents)
                .and_then(|line| total.checked_add(line))
                .ok_or_else(|| ServiceError::invalid("quotation total overflows"))
        })
    }
}

/// Creates a quotation and stamps it with a freshly allocated serial.
///
/// Validation happens before allocation so rejected requests never consume
/// a counter.
#[tracing::instrument(skip_all, fields(customer = tracing::field::Empty))]
async fn create_quotation(
    State(state): State<AppState>,
    payload: Result<Json<QuotationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<QuotationResponse>), ServiceError> {
    let Json(req) = payload?;
    tracing::Span::current().record("customer", req.customer.as_str());
    let total_cents = req.validate()?;
    let quote_number = state.allocate().await?;
    Ok((
        StatusCode::CREATED,
        Json(QuotationResponse {
            quote_number,
            customer: req.customer,
            items: req.items,
            total_cents,
        }),
    ))
}
