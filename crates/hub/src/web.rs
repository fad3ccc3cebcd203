use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::env;
use std::net::SocketAddr;
use time::{OffsetDateTime, UtcOffset};
use tokio::net::TcpListener;
use tracing::{error, info};

use automation_engine::clock::{parse_iso_date, to_iso_date};

use crate::db::Db;
use crate::state::SharedState;

#[derive(Clone)]
pub struct AppState {
    pub shared: SharedState,
    pub db: Db,
    /// Local offset used to pick "today" when no day is given.
    pub offset: UtcOffset,
}

#[derive(Debug, Deserialize)]
pub struct VerdictQuery {
    pub day: Option<String>,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/devices/{device_id}/verdicts", get(api_verdicts))
        .route("/api/devices/{device_id}/verdicts/last", get(api_last_verdict))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    let st = state.shared.read().await;
    Json(st.to_status())
}

async fn api_verdicts(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(q): Query<VerdictQuery>,
) -> Response {
    let day = match q.day {
        Some(day) => {
            if parse_iso_date(&day).is_err() {
                return (
                    StatusCode::BAD_REQUEST,
                    format!("invalid day '{day}' (expected YYYY-MM-DD)"),
                )
                    .into_response();
            }
            day
        }
        None => to_iso_date(OffsetDateTime::now_utc().to_offset(state.offset).date()),
    };

    {
        let st = state.shared.read().await;
        if !st.devices.contains_key(&device_id) {
            return (StatusCode::NOT_FOUND, format!("unknown device '{device_id}'"))
                .into_response();
        }
    }

    match state.db.verdicts_for_day(&day, &device_id).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            error!(device = %device_id, "web: verdicts_for_day failed: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "database error").into_response()
        }
    }
}

async fn api_last_verdict(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Response {
    match state.db.last_verdict(&device_id).await {
        Ok(Some(row)) => Json(row).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, format!("no verdict for '{device_id}'")).into_response(),
        Err(e) => {
            error!(device = %device_id, "web: last_verdict failed: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "database error").into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState) -> Result<()> {
    let port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {addr}"))?;

    info!("status api listening on http://{addr}");

    axum::serve(listener, router(state))
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
