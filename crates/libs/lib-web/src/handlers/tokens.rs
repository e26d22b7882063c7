//! # Token Price Handler
//!
//! `POST /api/tokens` — the single entry point into the resolution pipeline (§4.8).

use std::str::FromStr;

use axum::{extract::State, http::StatusCode, Json};
use lib_core::model::types::Network;
use lib_core::pipeline::Reply;
use lib_core::AppError;
use lib_utils::validation::{normalize_token, validate_token_address};

use crate::dto::{TokenRequest, TokenResponse};
use crate::server::AppState;

pub async fn resolve_price(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    validate_token_address(&req.token).map_err(AppError::Validation)?;
    let token = normalize_token(&req.token);

    let network = Network::from_str(&req.network).map_err(AppError::Validation)?;

    match state.pipeline.resolve(&token, network, req.timestamp).await {
        Ok(Reply::Record(record)) => Ok((
            StatusCode::OK,
            Json(TokenResponse {
                success: true,
                message: "ok".to_string(),
                data: Some(record),
                queued: None,
            }),
        )),
        Ok(Reply::Queued { job_id }) => Ok((
            StatusCode::ACCEPTED,
            Json(TokenResponse {
                success: true,
                message: format!("price not available yet, queued as {job_id}"),
                data: None,
                queued: Some(true),
            }),
        )),
        Err(err) => Err(err),
    }
}
