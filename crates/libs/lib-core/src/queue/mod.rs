//! # Job Queue
//!
//! Durable, Postgres-backed replacement for the spec's two named queues
//! (§4.6): `price-processing` and `batch-processing`. A single `jobs` table
//! is polled by bounded worker pools using `SELECT ... FOR UPDATE SKIP
//! LOCKED`, mirroring the claim-then-work pattern of the teacher's
//! interval-loop background refresh, generalized from a fixed ticker to a
//! durable priority queue.

pub mod batch_worker;
pub mod price_worker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;

use crate::error::Result;
use crate::model::store::DbPool;
use crate::model::types::Network;

pub use batch_worker::BatchWorker;
pub use price_worker::PriceWorker;

pub const QUEUE_PRICE_PROCESSING: &str = "price-processing";
pub const QUEUE_BATCH_PROCESSING: &str = "batch-processing";

/// Priority for a current-price job (no timestamp): higher than historical.
pub const PRIORITY_CURRENT: i32 = 10;
/// Priority for a historical-timestamp job.
pub const PRIORITY_HISTORICAL: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePayload {
    pub token: String,
    pub network: Network,
    pub timestamp: Option<DateTime<Utc>>,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPayload {
    pub token: String,
    pub network: Network,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub request_id: Uuid,
}

/// Aggregate counts for a queue, returned by `GET /api/queue/status` (§4.8).
#[derive(Debug, Clone, Serialize, Default)]
pub struct JobCounts {
    pub pending: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

/// A durably-queued unit of work.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub queue: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub max_attempts: i32,
}

/// Thin wrapper over the `jobs` table: enqueue, claim, complete, fail.
#[derive(Clone)]
pub struct JobQueue {
    pool: DbPool,
}

impl JobQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue_price(&self, payload: &PricePayload, max_attempts: i32) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let body = serde_json::to_value(payload).map_err(|e| crate::error::AppError::Internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO jobs (id, queue, payload, status, priority, max_attempts) \
             VALUES ($1, $2, $3, 'pending', $4, $5)",
        )
        .bind(id)
        .bind(QUEUE_PRICE_PROCESSING)
        .bind(body)
        .bind(payload.priority)
        .bind(max_attempts)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn enqueue_batch(&self, payload: &BatchPayload, max_attempts: i32) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let body = serde_json::to_value(payload).map_err(|e| crate::error::AppError::Internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO jobs (id, queue, payload, status, priority, max_attempts) \
             VALUES ($1, $2, $3, 'pending', $4, $5)",
        )
        .bind(id)
        .bind(QUEUE_BATCH_PROCESSING)
        .bind(body)
        .bind(PRIORITY_HISTORICAL)
        .bind(max_attempts)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Claim the next runnable job for `queue`, marking it `active`.
    async fn claim_next(&self, queue: &str) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT id, payload, attempts, max_attempts FROM jobs \
             WHERE queue = $1 AND status = 'pending' AND run_at <= now() \
             ORDER BY priority DESC, run_at ASC \
             FOR UPDATE SKIP LOCKED LIMIT 1",
        )
        .bind(queue)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let id: Uuid = row.try_get("id")?;
        sqlx::query("UPDATE jobs SET status = 'active', updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(Job {
            id,
            queue: queue.to_string(),
            payload: row.try_get("payload")?,
            attempts: row.try_get("attempts")?,
            max_attempts: row.try_get("max_attempts")?,
        }))
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = 'completed', updated_at = now() WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed attempt. Reschedules with exponential backoff
    /// (`2^attempt * base_backoff_ms`) unless attempts are exhausted, in
    /// which case the job is abandoned and the failure logged (§4.6, §5).
    async fn fail(&self, job: &Job, error: &str, base_backoff_ms: u64) -> Result<()> {
        let attempts = job.attempts + 1;
        if attempts >= job.max_attempts {
            tracing::warn!(
                job_id = %job.id, queue = %job.queue, attempts,
                "job exhausted retries, abandoning: {error}"
            );
            sqlx::query(
                "UPDATE jobs SET status = 'failed', attempts = $2, last_error = $3, updated_at = now() \
                 WHERE id = $1",
            )
            .bind(job.id)
            .bind(attempts)
            .bind(error)
            .execute(&self.pool)
            .await?;
            return Ok(());
        }

        let backoff_ms = 2u64.saturating_pow(attempts as u32) * base_backoff_ms;
        tracing::debug!(job_id = %job.id, queue = %job.queue, attempts, backoff_ms, "job failed, retrying: {error}");

        sqlx::query(
            "UPDATE jobs SET status = 'pending', attempts = $2, last_error = $3, \
             run_at = now() + make_interval(secs => $4::double precision), updated_at = now() \
             WHERE id = $1",
        )
        .bind(job.id)
        .bind(attempts)
        .bind(error)
        .bind(backoff_ms as f64 / 1000.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn counts(&self, queue: &str) -> Result<JobCounts> {
        let rows = sqlx::query("SELECT status, count(*) as n FROM jobs WHERE queue = $1 GROUP BY status")
            .bind(queue)
            .fetch_all(&self.pool)
            .await?;

        let mut counts = JobCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            match status.as_str() {
                "pending" => counts.pending = n,
                "active" => counts.active = n,
                "completed" => counts.completed = n,
                "failed" => counts.failed = n,
                _ => {}
            }
        }
        Ok(counts)
    }

    /// Cheap connectivity probe for `GET /health` (§4.8).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// A queue worker: given a claimed job's payload, do the work.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: &serde_json::Value) -> Result<()>;
}

/// Poll `queue_name` forever with up to `concurrency` jobs in flight,
/// stopping when `shutdown` fires (§5: workers drain and stop on SIGINT/SIGTERM).
pub async fn run_worker_pool(
    queue: JobQueue,
    queue_name: &'static str,
    concurrency: usize,
    base_backoff_ms: u64,
    handler: std::sync::Arc<dyn JobHandler>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let semaphore = std::sync::Arc::new(tokio::sync::Semaphore::new(concurrency));
    let mut poll_interval = tokio::time::interval(std::time::Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = poll_interval.tick() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("{queue_name} worker pool shutting down");
                    break;
                }
            }
        }

        if *shutdown.borrow() {
            break;
        }

        let Ok(permit) = semaphore.clone().try_acquire_owned() else {
            continue;
        };

        match queue.claim_next(queue_name).await {
            Ok(Some(job)) => {
                let queue = queue.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    match handler.handle(&job.payload).await {
                        Ok(()) => {
                            if let Err(e) = queue.complete(job.id).await {
                                tracing::error!("failed to mark job {} completed: {e}", job.id);
                            }
                        }
                        Err(e) => {
                            if let Err(e2) = queue.fail(&job, &e.to_string(), base_backoff_ms).await {
                                tracing::error!("failed to record failure for job {}: {e2}", job.id);
                            }
                        }
                    }
                });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("{queue_name} claim failed: {e}");
            }
        }
    }
}
