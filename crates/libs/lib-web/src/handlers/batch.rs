//! # Batch Historical Handler
//!
//! `POST /api/batch/historical` — enqueues a backfill job over a date range
//! (§4.6/§4.7); the actual fetch happens on the `batch-processing` queue's
//! worker pool, not inline on this request.

use std::str::FromStr;

use axum::{extract::State, http::StatusCode, Json};
use lib_core::model::types::Network;
use lib_core::queue::BatchPayload;
use lib_core::AppError;
use lib_utils::validation::{normalize_token, validate_date_range, validate_token_address};
use uuid::Uuid;

use crate::dto::{BatchHistoricalRequest, BatchHistoricalResponse};
use crate::server::AppState;

pub async fn enqueue_historical(
    State(state): State<AppState>,
    Json(req): Json<BatchHistoricalRequest>,
) -> Result<(StatusCode, Json<BatchHistoricalResponse>), AppError> {
    validate_token_address(&req.token).map_err(AppError::Validation)?;
    validate_date_range(req.start_date, req.end_date).map_err(AppError::Validation)?;

    let token = normalize_token(&req.token);
    let network = Network::from_str(&req.network).map_err(AppError::Validation)?;

    let payload = BatchPayload {
        token,
        network,
        start_date: req.start_date,
        end_date: req.end_date,
        request_id: Uuid::new_v4(),
    };
    let max_attempts = state.config.queue.batch_processing.max_attempts;
    let job_id = state.queue.enqueue_batch(&payload, max_attempts).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchHistoricalResponse {
            success: true,
            job_id,
        }),
    ))
}
