//! # Health Handler
//!
//! `GET /health` — probes redis, postgres, the oracle, and the job queue,
//! per §4.8. 200 when all four are reachable, 503 otherwise.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::dto::{HealthResponse, ServiceStatuses};
use crate::server::AppState;

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let services = ServiceStatuses {
        redis: state.cache.health_check().await,
        postgres: state.store.health_check().await,
        alchemy: state.oracle.health_check().await,
        queues: state.queue.health_check().await,
    };

    let all_ok = services.redis && services.postgres && services.alchemy && services.queues;
    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if all_ok { "ok" } else { "degraded" },
            services,
        }),
    )
}
