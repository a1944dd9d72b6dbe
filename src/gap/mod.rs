//! Data-gap detection after recovery
//!
//! When a service with a freshness reference comes back, the newest timestamp
//! in its table tells how much data was missed while it was down. Large gaps
//! are recorded as markers for a later backfill.

pub mod postgres;

pub use postgres::PostgresFreshness;

use crate::domain::FreshnessRef;
use crate::error::GapError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Source of the newest timestamp in a table
#[async_trait]
pub trait FreshnessSource: Send + Sync {
    /// `Ok(None)` when the table holds no rows
    async fn latest_timestamp(
        &self,
        table: &str,
        column: &str,
    ) -> Result<Option<DateTime<Utc>>, GapError>;
}

/// Verdict of a freshness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// `gap` is `None` when it could not be measured (no rows, query error)
    Stale { gap: Option<Duration> },
}

/// Record of a detected data gap, appended to the marker log as one JSON line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapMarker {
    pub service: String,
    pub table: String,
    pub detected_at: DateTime<Utc>,
    pub latest_timestamp: Option<DateTime<Utc>>,
    pub gap_secs: Option<u64>,
}

/// Check that `name` is a plain or schema-qualified SQL identifier
pub fn validate_identifier(name: &str) -> Result<(), GapError> {
    let parts: Vec<&str> = name.split('.').collect();
    let valid = parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(())
    } else {
        Err(GapError::InvalidIdentifier(name.to_string()))
    }
}

/// Validate and double-quote each part of an identifier
pub fn quote_identifier(name: &str) -> Result<String, GapError> {
    validate_identifier(name)?;
    Ok(name
        .split('.')
        .map(|part| format!("\"{}\"", part))
        .collect::<Vec<_>>()
        .join("."))
}

/// Compares a recovered service's newest data against the gap threshold
pub struct GapDetector {
    source: Box<dyn FreshnessSource>,
    threshold: Duration,
    markers_path: PathBuf,
}

impl GapDetector {
    pub fn new(source: Box<dyn FreshnessSource>, threshold: Duration, markers_path: PathBuf) -> Self {
        Self {
            source,
            threshold,
            markers_path,
        }
    }

    pub fn markers_path(&self) -> &PathBuf {
        &self.markers_path
    }

    /// Check one table and record a marker when stale. Never fails.
    pub async fn check_freshness(
        &self,
        service_id: &str,
        freshness: &FreshnessRef,
        now: DateTime<Utc>,
    ) -> Freshness {
        let latest = match self
            .source
            .latest_timestamp(&freshness.table, &freshness.timestamp_column)
            .await
        {
            Ok(latest) => latest,
            Err(e) => {
                warn!(service = %service_id, table = %freshness.table, "Freshness query failed: {}", e);
                None
            }
        };

        let verdict = match latest {
            Some(ts) => {
                let gap = now.signed_duration_since(ts).to_std().unwrap_or(Duration::ZERO);
                if gap > self.threshold {
                    Freshness::Stale { gap: Some(gap) }
                } else {
                    Freshness::Fresh
                }
            }
            None => Freshness::Stale { gap: None },
        };

        match verdict {
            Freshness::Fresh => {
                debug!(service = %service_id, table = %freshness.table, "Data is fresh");
            }
            Freshness::Stale { gap } => {
                info!(
                    service = %service_id,
                    table = %freshness.table,
                    "Data gap detected: {}",
                    gap.map(|g| format!("{}s", g.as_secs()))
                        .unwrap_or_else(|| "unknown".to_string())
                );
                let marker = GapMarker {
                    service: service_id.to_string(),
                    table: freshness.table.clone(),
                    detected_at: now,
                    latest_timestamp: latest,
                    gap_secs: gap.map(|g| g.as_secs()),
                };
                if let Err(e) = self.record(&marker).await {
                    warn!(
                        service = %service_id,
                        "Failed to record gap marker at {}: {}",
                        self.markers_path.display(),
                        e
                    );
                }
            }
        }

        verdict
    }

    async fn record(&self, marker: &GapMarker) -> std::io::Result<()> {
        if let Some(parent) = self.markers_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(marker)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.markers_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

/// Read back all recorded markers; a missing log yields none
pub async fn read_markers(path: &std::path::Path) -> std::io::Result<Vec<GapMarker>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}
