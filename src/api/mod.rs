//! HTTP API: campaign creation and per-user reward queries.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::{chain::WatchedAddresses, db::RewardStore};

pub mod dto;
mod error;
pub mod handlers;

pub use error::{AppError, ErrMsg};

/// Shared handler state.
pub struct AppState {
    pub store: Arc<dyn RewardStore>,
    pub registry: Arc<WatchedAddresses>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/campaign", post(handlers::create_campaign))
        .route("/user/task/status", get(handlers::get_user_task_status))
        .route("/user/points", get(handlers::get_user_points))
        .with_state(state)
}

/// Serve the API until the token is cancelled.
pub async fn serve(
    bind_addr: &str,
    state: Arc<AppState>,
    cancellation_token: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP API to {}", bind_addr))?;
    info!("HTTP API listening on {}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(cancellation_token.cancelled_owned())
        .await
        .context("HTTP API server failed")?;

    info!("HTTP API stopped");
    Ok(())
}
