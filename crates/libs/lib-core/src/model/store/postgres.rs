//! # Postgres-Backed Durable Store
//!
//! `sqlx::PgPool` implementation of [`super::DurableStore`]. Tables take the
//! place of the spec's "collections"; see `migrations/0001_init.sql` for the
//! schema and the module doc in `mod.rs` for the collection-name mapping.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;

use super::DurableStore;
use crate::error::{AppError, Result};
use crate::model::types::{
    CacheStatsBucket, DailyRollup, InterpolationDetails, InterpolationMethod, Network, PricePoint,
    PriceRecord, Provenance, RollupEntry, TokenEntry, TokenMetadata,
};

/// Type alias for the Postgres connection pool.
pub type DbPool = sqlx::PgPool;

/// Create a new Postgres connection pool.
pub async fn create_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// The durable store, backed by a Postgres pool.
#[derive(Clone)]
pub struct PgDurableStore {
    pool: DbPool,
}

impl PgDurableStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn provenance_str(p: Provenance) -> &'static str {
    match p {
        Provenance::FromCache => "fromCache",
        Provenance::FromDb => "fromDB",
        Provenance::FromApi => "fromAPI",
        Provenance::Interpolated => "interpolated",
    }
}

fn provenance_from_str(s: &str) -> Provenance {
    match s {
        "fromCache" => Provenance::FromCache,
        "fromDB" => Provenance::FromDb,
        "fromAPI" => Provenance::FromApi,
        _ => Provenance::Interpolated,
    }
}

fn method_str(m: InterpolationMethod) -> &'static str {
    match m {
        InterpolationMethod::Linear => "linear",
        InterpolationMethod::Extrapolation => "extrapolation",
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<PriceRecord> {
    let interpolated: bool = row.try_get("interpolated")?;
    let interpolation = if interpolated {
        let method: Option<String> = row.try_get("method")?;
        let confidence: Option<f64> = row.try_get("confidence")?;
        let data_points: Option<serde_json::Value> = row.try_get("data_points_used")?;
        let data_points_used: Vec<PricePoint> = data_points
            .map(|v| serde_json::from_value(v).unwrap_or_default())
            .unwrap_or_default();
        Some(InterpolationDetails {
            method: match method.as_deref() {
                Some("extrapolation") => InterpolationMethod::Extrapolation,
                _ => InterpolationMethod::Linear,
            },
            confidence: confidence.unwrap_or(0.0),
            data_points_used,
        })
    } else {
        None
    };

    let network_str: String = row.try_get("network")?;
    let provenance_raw: String = row.try_get("provenance")?;

    Ok(PriceRecord {
        token: row.try_get("token")?,
        network: Network::from_str(&network_str).map_err(AppError::Internal)?,
        timestamp: row.try_get("ts")?,
        usd: row.try_get("usd")?,
        last_updated: row.try_get("last_updated")?,
        metadata: TokenMetadata {
            symbol: row.try_get("symbol")?,
            name: row.try_get("name")?,
            decimals: row.try_get("decimals")?,
            total_supply: row.try_get("total_supply")?,
            logo_uri: row.try_get("logo_uri")?,
        },
        provenance: provenance_from_str(&provenance_raw),
        interpolation,
    })
}

#[async_trait]
impl DurableStore for PgDurableStore {
    async fn store_price(&self, record: &PriceRecord) -> Result<()> {
        let (method, confidence, data_points_used) = match &record.interpolation {
            Some(details) => (
                Some(method_str(details.method)),
                Some(details.confidence),
                serde_json::to_value(&details.data_points_used).ok(),
            ),
            None => (None, None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO prices (
                token, network, ts, usd, last_updated, symbol, name, decimals,
                total_supply, logo_uri, provenance, interpolated, method, confidence,
                data_points_used
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (token, network, ts) DO UPDATE SET
                usd = EXCLUDED.usd,
                last_updated = EXCLUDED.last_updated,
                symbol = EXCLUDED.symbol,
                name = EXCLUDED.name,
                decimals = EXCLUDED.decimals,
                total_supply = EXCLUDED.total_supply,
                logo_uri = EXCLUDED.logo_uri,
                provenance = EXCLUDED.provenance,
                interpolated = EXCLUDED.interpolated,
                method = EXCLUDED.method,
                confidence = EXCLUDED.confidence,
                data_points_used = EXCLUDED.data_points_used
            "#,
        )
        .bind(&record.token)
        .bind(record.network.as_str())
        .bind(record.timestamp)
        .bind(record.usd)
        .bind(record.last_updated)
        .bind(&record.metadata.symbol)
        .bind(&record.metadata.name)
        .bind(record.metadata.decimals)
        .bind(&record.metadata.total_supply)
        .bind(&record.metadata.logo_uri)
        .bind(provenance_str(record.provenance))
        .bind(record.interpolation.is_some())
        .bind(method)
        .bind(confidence)
        .bind(data_points_used)
        .execute(&self.pool)
        .await?;

        if record.provenance != Provenance::Interpolated {
            self.upsert_rollup(record).await?;
        }

        Ok(())
    }

    async fn get_price(
        &self,
        token: &str,
        network: Network,
        timestamp: Option<DateTime<Utc>>,
        include_interpolated: bool,
    ) -> Result<Option<PriceRecord>> {
        let row = if let Some(ts) = timestamp {
            sqlx::query(
                "SELECT * FROM prices WHERE token = $1 AND network = $2 AND ts = $3 \
                 AND (interpolated = FALSE OR $4) ORDER BY interpolated ASC LIMIT 1",
            )
            .bind(token)
            .bind(network.as_str())
            .bind(ts)
            .bind(include_interpolated)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT * FROM prices WHERE token = $1 AND network = $2 \
                 AND (interpolated = FALSE OR $3) ORDER BY ts DESC LIMIT 1",
            )
            .bind(token)
            .bind(network.as_str())
            .bind(include_interpolated)
            .fetch_optional(&self.pool)
            .await?
        };

        row.as_ref().map(row_to_record).transpose()
    }

    async fn get_nearest_prices(
        &self,
        token: &str,
        network: Network,
        target: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PriceRecord>> {
        let half = (limit / 2).max(1) as i64;

        let before_rows = sqlx::query(
            "SELECT * FROM prices WHERE token = $1 AND network = $2 AND ts < $3 \
             ORDER BY ts DESC LIMIT $4",
        )
        .bind(token)
        .bind(network.as_str())
        .bind(target)
        .bind(half)
        .fetch_all(&self.pool)
        .await?;

        let after_rows = sqlx::query(
            "SELECT * FROM prices WHERE token = $1 AND network = $2 AND ts > $3 \
             ORDER BY ts ASC LIMIT $4",
        )
        .bind(token)
        .bind(network.as_str())
        .bind(target)
        .bind(half)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(before_rows.len() + after_rows.len());
        for row in before_rows.iter().rev() {
            records.push(row_to_record(row)?);
        }
        for row in &after_rows {
            records.push(row_to_record(row)?);
        }
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    async fn get_all_tokens(&self) -> Result<Vec<TokenEntry>> {
        let rows = sqlx::query("SELECT * FROM tokens")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let network_str: String = row.try_get("network")?;
                Ok(TokenEntry {
                    token: row.try_get("token")?,
                    network: Network::from_str(&network_str).map_err(AppError::Internal)?,
                    creation_date: row.try_get("creation_date")?,
                    added_at: row.try_get("added_at")?,
                })
            })
            .collect()
    }

    async fn add_token(
        &self,
        token: &str,
        network: Network,
        creation_date: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (token, network, creation_date, added_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (token, network) DO UPDATE SET
                creation_date = COALESCE(tokens.creation_date, EXCLUDED.creation_date)
            "#,
        )
        .bind(token)
        .bind(network.as_str())
        .bind(creation_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_price_history(
        &self,
        token: &str,
        network: Network,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM prices WHERE token = $1 AND network = $2 AND ts BETWEEN $3 AND $4 \
             ORDER BY ts ASC",
        )
        .bind(token)
        .bind(network.as_str())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn archive_older_than(&self, days: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO archived_prices (
                token, network, ts, usd, last_updated, symbol, name, decimals,
                total_supply, logo_uri, provenance, interpolated, method, confidence,
                data_points_used
            )
            SELECT
                token, network, ts, usd, last_updated, symbol, name, decimals,
                total_supply, logo_uri, provenance, interpolated, method, confidence,
                data_points_used
            FROM prices
            WHERE created_at < now() - make_interval(days => $1::int)
            ON CONFLICT (token, network, ts) DO NOTHING
            "#,
        )
        .bind(days as i32)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query(
            "DELETE FROM prices WHERE created_at < now() - make_interval(days => $1::int)",
        )
        .bind(days as i32)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }

    async fn record_cache_op(&self, op: &str, strategy: Option<&str>) -> Result<()> {
        let today = Utc::now().date_naive();
        let column = match op {
            "hit" => "hit",
            "miss" => "miss",
            "set" => "set_count",
            "delete" => "delete",
            other => return Err(AppError::Internal(format!("unknown cache op: {other}"))),
        };

        let strategy_key = strategy.unwrap_or("none");

        let sql = format!(
            r#"
            INSERT INTO cache_stats (date, {column}, total, by_strategy)
            VALUES ($1, 1, 1, jsonb_build_object($2::text, 1))
            ON CONFLICT (date) DO UPDATE SET
                {column} = cache_stats.{column} + 1,
                total = cache_stats.total + 1,
                by_strategy = jsonb_set(
                    cache_stats.by_strategy,
                    ARRAY[$2::text],
                    to_jsonb(COALESCE((cache_stats.by_strategy->>$2::text)::bigint, 0) + 1)
                )
            "#
        );

        sqlx::query(&sql)
            .bind(today)
            .bind(strategy_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_cache_stats(&self, date: NaiveDate) -> Result<CacheStatsBucket> {
        let row = sqlx::query("SELECT * FROM cache_stats WHERE date = $1")
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(CacheStatsBucket {
                date,
                ..Default::default()
            });
        };

        let by_strategy_json: serde_json::Value = row.try_get("by_strategy")?;
        let by_strategy: HashMap<String, i64> =
            serde_json::from_value(by_strategy_json).unwrap_or_default();

        Ok(CacheStatsBucket {
            date,
            hit: row.try_get("hit")?,
            miss: row.try_get("miss")?,
            set: row.try_get("set_count")?,
            delete: row.try_get("delete")?,
            total: row.try_get("total")?,
            by_strategy,
        })
    }

    async fn get_daily_rollup(
        &self,
        token: &str,
        network: Network,
        date: NaiveDate,
    ) -> Result<Option<DailyRollup>> {
        let row = sqlx::query(
            "SELECT * FROM daily_rollups WHERE token = $1 AND network = $2 AND date = $3",
        )
        .bind(token)
        .bind(network.as_str())
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let entries_json: serde_json::Value = row.try_get("entries")?;
        let entries: Vec<RollupEntry> = serde_json::from_value(entries_json).unwrap_or_default();

        Ok(Some(DailyRollup {
            token: token.to_string(),
            network,
            date,
            count: row.try_get("count")?,
            first_price: row.try_get("first_price")?,
            last_price: row.try_get("last_price")?,
            min_price: row.try_get("min_price")?,
            max_price: row.try_get("max_price")?,
            entries,
        }))
    }

    async fn prune_cache_stats(&self, days: i64) -> Result<u64> {
        let deleted =
            sqlx::query("DELETE FROM cache_stats WHERE date < (now() - make_interval(days => $1::int))::date")
                .bind(days as i32)
                .execute(&self.pool)
                .await?
                .rows_affected();
        Ok(deleted)
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

impl PgDurableStore {
    /// Atomic daily-rollup upsert: `setOnInsert` for identity fields, `push` to
    /// the entries array, `$inc` on count, `$min`/`$max` on min/max, `set` on
    /// last_price — expressed as a single `INSERT ... ON CONFLICT DO UPDATE` so
    /// concurrent inserts for the same day converge without a read-modify-write
    /// race (§4.3, §5).
    async fn upsert_rollup(&self, record: &PriceRecord) -> Result<()> {
        let date = record.timestamp.date_naive();
        let entry = RollupEntry {
            timestamp: record.timestamp,
            usd: record.usd,
            source: record.provenance,
        };
        let entry_json = serde_json::to_value(vec![entry]).map_err(|e| AppError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO daily_rollups (
                token, network, date, count, first_price, last_price, min_price, max_price, entries, updated_at
            )
            VALUES ($1, $2, $3, 1, $4, $4, $4, $4, $5, now())
            ON CONFLICT (token, network, date) DO UPDATE SET
                count = daily_rollups.count + 1,
                last_price = EXCLUDED.last_price,
                min_price = LEAST(daily_rollups.min_price, EXCLUDED.min_price),
                max_price = GREATEST(daily_rollups.max_price, EXCLUDED.max_price),
                entries = daily_rollups.entries || EXCLUDED.entries,
                updated_at = now()
            "#,
        )
        .bind(&record.token)
        .bind(record.network.as_str())
        .bind(date)
        .bind(record.usd)
        .bind(entry_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
