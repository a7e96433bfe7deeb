//! Axum HTTP server for the load tracker.
//!
//! Handlers validate payload fields before any store access, then call
//! into the tracking components. Store failures surface as 500s with the
//! error text; nothing is retried here.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::error::{DatabaseError, ServerError};
use crate::tracking::{
    ActivityRecorder, AssignmentReconciler, LoadMonitor, ShiftManager, ShiftOutcome, ShiftState,
};
use crate::web::types::*;

/// Shared state for all handlers.
pub struct AppState {
    pub recorder: ActivityRecorder,
    pub reconciler: AssignmentReconciler,
    pub shifts: ShiftManager,
    pub monitor: LoadMonitor,
}

/// Start the HTTP server. Runs until ctrl-c.
pub async fn start_server(addr: SocketAddr, state: Arc<AppState>) -> Result<(), ServerError> {
    let listener =
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::StartupFailed {
                reason: format!("failed to bind to {}: {}", addr, e),
            })?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| ServerError::StartupFailed {
            reason: format!("failed to get local addr: {}", e),
        })?;
    tracing::info!(%bound_addr, "loadstone listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .map_err(|e| ServerError::StartupFailed {
            reason: e.to_string(),
        })
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(overload_handler))
        .route("/chat", post(chat_handler))
        .route("/wizard/traveler", post(reassign_handler))
        .route("/wizard/shift", post(shift_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
}

// --- Health ---

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

// --- Chat activity (message exchanged) ---

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ConfirmationResponse>, (StatusCode, String)> {
    let wizard_id = require_field(req.wizardid, "wizardid")?;
    let traveler_id = require_field(req.chatid, "chatid")?;
    let time = require_field(req.time, "time")?;
    let occurred_at = parse_chat_time(&time).map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    state
        .recorder
        .record(&wizard_id, &traveler_id, occurred_at)
        .await
        .map_err(store_failure)?;

    // A message from a wizard who does not own this traveler is an
    // implicit takeover; the reconciler's contract covers both cases.
    state
        .reconciler
        .reassign(&traveler_id, &wizard_id)
        .await
        .map_err(store_failure)?;

    Ok(Json(ConfirmationResponse {
        message: format!(
            "traveler {traveler_id} exchanged a message with wizard {wizard_id} at {occurred_at}"
        ),
    }))
}

// --- Explicit reassignment (admin action) ---

async fn reassign_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReassignRequest>,
) -> Result<Json<ConfirmationResponse>, (StatusCode, String)> {
    let wizard_id = require_field(req.wizardid, "wizardid")?;
    let traveler_id = require_field(req.chatid, "chatid")?;

    state
        .reconciler
        .reassign(&traveler_id, &wizard_id)
        .await
        .map_err(store_failure)?;

    Ok(Json(ConfirmationResponse {
        message: format!("traveler {traveler_id} is assigned to wizard {wizard_id}"),
    }))
}

// --- Shift toggle ---

async fn shift_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ShiftRequest>,
) -> Result<Json<ShiftResponse>, (StatusCode, String)> {
    let wizard_id = require_field(req.wizardid, "wizardid")?;
    let shift = require_field(req.shift, "shift")?;
    let requested: ShiftState = shift.parse().map_err(|e: String| (StatusCode::BAD_REQUEST, e))?;

    let outcome = state
        .shifts
        .set_shift(&wizard_id, requested)
        .await
        .map_err(store_failure)?;

    let response = match outcome {
        ShiftOutcome::Activated => ShiftResponse {
            status: "ok",
            message: format!("wizard {wizard_id} is now on-shift"),
        },
        ShiftOutcome::AlreadyActive => ShiftResponse {
            status: "already_active",
            message: format!("wizard {wizard_id} is already in an active shift"),
        },
        ShiftOutcome::Deactivated => ShiftResponse {
            status: "ok",
            message: format!("wizard {wizard_id} is now off-shift"),
        },
    };
    Ok(Json(response))
}

// --- Overload report ---

async fn overload_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OverloadResponse>, (StatusCode, String)> {
    let travelers = state.monitor.compute_overload().await.map_err(store_failure)?;

    let message = if travelers.is_empty() {
        "all wizards are under the load threshold".to_string()
    } else {
        format!("load heavy for travelers: {}", travelers.join(", "))
    };
    Ok(Json(OverloadResponse {
        overloaded: !travelers.is_empty(),
        travelers,
        message,
    }))
}

// --- Helpers ---

fn require_field(value: Option<String>, name: &'static str) -> Result<String, (StatusCode, String)> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err((
            StatusCode::BAD_REQUEST,
            format!("missing required field: {name}"),
        )),
    }
}

fn store_failure(e: DatabaseError) -> (StatusCode, String) {
    tracing::error!(error = %e, "store operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("store operation failed: {e}"),
    )
}
