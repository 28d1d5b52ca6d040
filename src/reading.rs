//! Reading store: latest row of the `"WeatherLog"` table in Postgres.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::types::Reading;

/// Columns are cast so the row decodes the same whether the table was created
/// with INTEGER/REAL/TIMESTAMP or the wider types. Assumes integer ids that grow
/// with insertion order; a text id column fails the cast on every fetch.
const LATEST_READING_SQL: &str = r#"
SELECT "id"::bigint AS id,
       "maxTemp"::float8 AS max_temp,
       "createdAt"::timestamptz AS created_at
FROM "WeatherLog"
ORDER BY "createdAt" DESC
LIMIT 1
"#;

/// Read-only access to the most recent reading.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn latest(&self) -> Result<Option<Reading>>;
}

#[derive(Debug, sqlx::FromRow)]
struct WeatherLogRow {
    id: i64,
    max_temp: Option<f64>,
    created_at: DateTime<Utc>,
}

impl WeatherLogRow {
    fn into_reading(self) -> Option<Reading> {
        let value = self.max_temp?;
        Some(Reading {
            id: self.id,
            value,
            observed_at: self.created_at,
        })
    }
}

pub struct PgReadingSource {
    pool: PgPool,
}

impl PgReadingSource {
    /// Lazy pool: no connection is made until the first query, so a database
    /// that is down at startup only costs the cycles that need it.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(database_url)
            .context("invalid DATABASE_URL")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ReadingSource for PgReadingSource {
    async fn latest(&self) -> Result<Option<Reading>> {
        let row: Option<WeatherLogRow> = sqlx::query_as(LATEST_READING_SQL)
            .fetch_optional(&self.pool)
            .await
            .context("WeatherLog query")?;

        Ok(row.and_then(|r| {
            let id = r.id;
            let reading = r.into_reading();
            if reading.is_none() {
                tracing::warn!(id, "latest WeatherLog row has no maxTemp, ignoring");
            }
            reading
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_without_value_is_not_a_reading() {
        let row = WeatherLogRow {
            id: 3,
            max_temp: None,
            created_at: Utc::now(),
        };
        assert!(row.into_reading().is_none());
    }

    #[test]
    fn row_maps_to_reading() {
        let ts = Utc::now();
        let row = WeatherLogRow {
            id: 11,
            max_temp: Some(41.5),
            created_at: ts,
        };
        let r = row.into_reading().unwrap();
        assert_eq!(r.id, 11);
        assert_eq!(r.value, 41.5);
        assert_eq!(r.observed_at, ts);
    }

    #[tokio::test]
    async fn lazy_pool_rejects_malformed_url() {
        assert!(PgReadingSource::connect_lazy("not a url").is_err());
    }
}
