//! # Wire Data Transfer Objects
//!
//! Request/response shapes for the four endpoints of the service surface
//! (§4.8). Distinct from [`lib_core::model::types::PriceRecord`] and friends,
//! which are the storage/domain representation.

use chrono::{DateTime, Utc};
use lib_core::model::types::PriceRecord;
use lib_core::queue::JobCounts;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
    pub network: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PriceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct BatchHistoricalRequest {
    pub token: String,
    pub network: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BatchHistoricalResponse {
    pub success: bool,
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub price_queue: JobCounts,
    pub batch_queue: JobCounts,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatuses {
    pub redis: bool,
    pub postgres: bool,
    pub alchemy: bool,
    pub queues: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub services: ServiceStatuses,
}
