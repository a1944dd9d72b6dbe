use super::{quote_identifier, FreshnessSource};
use crate::error::GapError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

/// Freshness source backed by PostgreSQL
#[derive(Clone)]
pub struct PostgresFreshness {
    pool: PgPool,
    query_timeout: Duration,
}

impl PostgresFreshness {
    /// Build a lazily-connected pool; no connection is made until the first query
    pub fn connect_lazy(
        database_url: &str,
        max_connections: u32,
        query_timeout: Duration,
    ) -> Result<Self, GapError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(query_timeout)
            .connect_lazy(database_url)?;

        info!("PostgreSQL freshness source configured");
        Ok(Self {
            pool,
            query_timeout,
        })
    }

    /// `SELECT MAX(column)` statement for a validated table/column pair
    pub fn max_query(table: &str, column: &str) -> Result<String, GapError> {
        if column.contains('.') {
            return Err(GapError::InvalidIdentifier(column.to_string()));
        }
        Ok(format!(
            "SELECT MAX({})::timestamptz FROM {}",
            quote_identifier(column)?,
            quote_identifier(table)?
        ))
    }
}

#[async_trait]
impl FreshnessSource for PostgresFreshness {
    async fn latest_timestamp(
        &self,
        table: &str,
        column: &str,
    ) -> Result<Option<DateTime<Utc>>, GapError> {
        let sql = Self::max_query(table, column)?;
        debug!("Freshness query: {}", sql);

        let query = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(&sql).fetch_one(&self.pool);
        match tokio::time::timeout(self.query_timeout, query).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(GapError::Timeout(self.query_timeout.as_secs())),
        }
    }
}
