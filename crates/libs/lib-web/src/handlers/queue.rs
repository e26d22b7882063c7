//! # Queue Status Handler
//!
//! `GET /api/queue/status` — a snapshot of both named queues' job counts.

use axum::extract::State;
use axum::Json;
use lib_core::queue::{QUEUE_BATCH_PROCESSING, QUEUE_PRICE_PROCESSING};
use lib_core::AppError;

use crate::dto::QueueStatusResponse;
use crate::server::AppState;

pub async fn queue_status(
    State(state): State<AppState>,
) -> Result<Json<QueueStatusResponse>, AppError> {
    let price_queue = state.queue.counts(QUEUE_PRICE_PROCESSING).await?;
    let batch_queue = state.queue.counts(QUEUE_BATCH_PROCESSING).await?;

    Ok(Json(QueueStatusResponse {
        price_queue,
        batch_queue,
    }))
}
