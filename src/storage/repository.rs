//! Repository Pattern for trend persistence
//!
//! The analytics core treats persistence as an opaque upsert/query store.
//! This module defines that contract and two implementations:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                TrendAnalyticsService (pipeline)             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TrendStore trait                       │
//! └─────────────────────────────────────────────────────────────┘
//!                  ┌───────────┴───────────┐
//!                  ▼                       ▼
//!         ┌─────────────────┐     ┌─────────────────┐
//!         │     SQLite      │     │    In-memory    │
//!         │  Implementation │     │  Implementation │
//!         └─────────────────┘     └─────────────────┘
//! ```
//!
//! Every upsert is atomic per call and keyed by the artifact's natural
//! key, so replaying a write (e.g. after a retried batch) is harmless.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};

use crate::analytics::{Anomaly, AnomalyType, EnsembleForecast, TemporalBin, Variant, VariantType};
use crate::error::{Error, Result};
use crate::models::{Platform, ScorePoint, TimeRange, TrendSeries};

// ============================================================================
// Store Trait
// ============================================================================

/// Persistence contract for score series and derived artifacts
#[async_trait]
pub trait TrendStore: Send + Sync {
    /// Insert or overwrite score points keyed by `(trend_id, timestamp)`
    async fn upsert_score_points(&self, points: &[ScorePoint]) -> Result<usize>;

    /// Points of one trend within `range`
    async fn query_series(&self, trend_id: &str, range: TimeRange) -> Result<TrendSeries>;

    /// Every trend with points in `range`, restricted to that range, ordered by trend id
    async fn query_window(&self, range: TimeRange) -> Result<Vec<TrendSeries>>;

    /// Up to `limit` other trends in `category` with points in `range`, ordered by trend id
    async fn query_peers(
        &self,
        category: &str,
        exclude_trend_id: &str,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<TrendSeries>>;

    /// Upsert keyed by `(trend_id, detection_timestamp, anomaly_type)`
    async fn upsert_anomalies(&self, anomalies: &[Anomaly]) -> Result<usize>;

    /// Upsert keyed by `(trend_id, forecast_origin)`
    async fn upsert_forecast(&self, forecast: &EnsembleForecast) -> Result<()>;

    /// Upsert keyed by `(trend_id, variant_type, variant_name)`
    async fn upsert_variants(&self, variants: &[Variant]) -> Result<usize>;

    /// Stored anomalies of a trend, oldest first
    async fn anomalies_for(&self, trend_id: &str) -> Result<Vec<Anomaly>>;

    /// Stored forecasts of a trend, oldest origin first
    async fn forecasts_for(&self, trend_id: &str) -> Result<Vec<EnsembleForecast>>;

    /// Stored variants of a trend, ordered by type then name
    async fn variants_for(&self, trend_id: &str) -> Result<Vec<Variant>>;

    /// Upsert keyed by `(bin_start, bin_size, platform_source, category)`
    async fn upsert_bins(&self, bins: &[TemporalBin]) -> Result<usize>;

    /// Stored bins starting in `range`, oldest first, optionally restricted
    /// to one platform and/or category
    async fn query_bins(
        &self,
        range: TimeRange,
        platform: Option<&Platform>,
        category: Option<&str>,
    ) -> Result<Vec<TemporalBin>>;
}

/// Fixed-width RFC 3339 so lexical order matches time order
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::with_source(format!("Invalid stored timestamp: {s}"), e))
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`TrendStore`]
///
/// Uses a `Mutex` around a single connection; blocking calls run on the
/// tokio blocking pool.
pub struct SqliteTrendStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTrendStore {
    /// Open (or create) a store at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self::from_connection(conn)?;
        tracing::info!(path = %path.display(), "SQLite trend store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS score_points (
                    trend_id TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    content_id TEXT NOT NULL,
                    wave_score REAL NOT NULL,
                    confidence REAL NOT NULL,
                    platform_source TEXT NOT NULL,
                    category TEXT NOT NULL,
                    raw_metrics TEXT NOT NULL,
                    components TEXT,
                    published_at TEXT,
                    hashtags TEXT,
                    PRIMARY KEY (trend_id, timestamp)
                );

                CREATE INDEX IF NOT EXISTS idx_score_points_timestamp
                    ON score_points(timestamp);

                CREATE INDEX IF NOT EXISTS idx_score_points_category
                    ON score_points(category, timestamp);

                CREATE TABLE IF NOT EXISTS anomalies (
                    trend_id TEXT NOT NULL,
                    detection_timestamp TEXT NOT NULL,
                    anomaly_type TEXT NOT NULL,
                    severity TEXT NOT NULL,
                    anomaly_score REAL NOT NULL,
                    payload TEXT NOT NULL,
                    PRIMARY KEY (trend_id, detection_timestamp, anomaly_type)
                );

                CREATE TABLE IF NOT EXISTS forecasts (
                    trend_id TEXT NOT NULL,
                    forecast_origin TEXT NOT NULL,
                    horizon_hours INTEGER NOT NULL,
                    model_accuracy REAL NOT NULL,
                    payload TEXT NOT NULL,
                    PRIMARY KEY (trend_id, forecast_origin)
                );

                CREATE TABLE IF NOT EXISTS variants (
                    trend_id TEXT NOT NULL,
                    variant_type TEXT NOT NULL,
                    variant_name TEXT NOT NULL,
                    time_range_start TEXT NOT NULL,
                    time_range_end TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    PRIMARY KEY (trend_id, variant_type, variant_name)
                );

                CREATE TABLE IF NOT EXISTS normalized_bins (
                    bin_start TEXT NOT NULL,
                    bin_size TEXT NOT NULL,
                    platform_source TEXT NOT NULL,
                    category TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    PRIMARY KEY (bin_start, bin_size, platform_source, category)
                );
                "#,
        )?;
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::other("SQLite connection mutex poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::with_source("SQLite task failed", e))?
    }

    /// Load points matching `where_clause`, grouped into series
    fn load_series(
        conn: &Connection,
        where_clause: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<BTreeMap<String, TrendSeries>> {
        let sql = format!(
            "SELECT trend_id, timestamp, content_id, wave_score, confidence,
                    platform_source, category, raw_metrics, components,
                    published_at, hashtags
             FROM score_points WHERE {where_clause}
             ORDER BY trend_id, timestamp"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, Option<String>>(10)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut points = Vec::with_capacity(rows.len());
        for (
            trend_id,
            timestamp,
            content_id,
            wave_score,
            confidence,
            platform,
            category,
            raw,
            comps,
            published,
            tags,
        ) in rows
        {
            points.push(ScorePoint {
                timestamp: parse_ts(&timestamp)?,
                trend_id,
                content_id,
                wave_score,
                confidence,
                platform_source: platform.into(),
                category,
                raw_metrics: serde_json::from_str(&raw)?,
                components: comps.as_deref().map(serde_json::from_str).transpose()?,
                published_at: published.as_deref().map(parse_ts).transpose()?,
                hashtags: tags
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()?
                    .unwrap_or_default(),
            });
        }
        Ok(TrendSeries::group_by_trend(points))
    }

    fn load_payloads<T: serde::de::DeserializeOwned>(
        conn: &Connection,
        sql: &str,
        trend_id: &str,
    ) -> Result<Vec<T>> {
        let mut stmt = conn.prepare(sql)?;
        let payloads = stmt
            .query_map(params![trend_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(Error::from))
            .collect()
    }
}

#[async_trait]
impl TrendStore for SqliteTrendStore {
    async fn upsert_score_points(&self, points: &[ScorePoint]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }
        let points = points.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO score_points (trend_id, timestamp, content_id, wave_score,
                        confidence, platform_source, category, raw_metrics, components,
                        published_at, hashtags)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    ON CONFLICT(trend_id, timestamp) DO UPDATE SET
                        content_id = excluded.content_id,
                        wave_score = excluded.wave_score,
                        confidence = excluded.confidence,
                        platform_source = excluded.platform_source,
                        category = excluded.category,
                        raw_metrics = excluded.raw_metrics,
                        components = excluded.components,
                        published_at = excluded.published_at,
                        hashtags = excluded.hashtags
                    "#,
                )?;
                for p in &points {
                    let components = p.components.as_ref().map(serde_json::to_string).transpose()?;
                    let hashtags = if p.hashtags.is_empty() {
                        None
                    } else {
                        Some(serde_json::to_string(&p.hashtags)?)
                    };
                    stmt.execute(params![
                        p.trend_id,
                        ts(p.timestamp),
                        p.content_id,
                        p.wave_score,
                        p.confidence,
                        p.platform_source.as_str(),
                        p.category,
                        serde_json::to_string(&p.raw_metrics)?,
                        components,
                        p.published_at.map(ts),
                        hashtags,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(points.len())
        })
        .await
    }

    async fn query_series(&self, trend_id: &str, range: TimeRange) -> Result<TrendSeries> {
        let trend_id = trend_id.to_string();
        self.with_conn(move |conn| {
            let mut groups = Self::load_series(
                conn,
                "trend_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3",
                &[&trend_id, &ts(range.start), &ts(range.end)],
            )?;
            Ok(groups
                .remove(&trend_id)
                .unwrap_or_else(|| TrendSeries::new(trend_id)))
        })
        .await
    }

    async fn query_window(&self, range: TimeRange) -> Result<Vec<TrendSeries>> {
        self.with_conn(move |conn| {
            let groups = Self::load_series(
                conn,
                "timestamp >= ?1 AND timestamp <= ?2",
                &[&ts(range.start), &ts(range.end)],
            )?;
            Ok(groups.into_values().collect())
        })
        .await
    }

    async fn query_peers(
        &self,
        category: &str,
        exclude_trend_id: &str,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<TrendSeries>> {
        let category = category.to_string();
        let exclude = exclude_trend_id.to_string();
        self.with_conn(move |conn| {
            let peer_ids: Vec<String> = {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT trend_id FROM score_points
                     WHERE category = ?1 AND trend_id != ?2
                       AND timestamp >= ?3 AND timestamp <= ?4
                     ORDER BY trend_id LIMIT ?5",
                )?;
                let ids = stmt
                    .query_map(
                        params![category, exclude, ts(range.start), ts(range.end), limit as i64],
                        |row| row.get(0),
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            };

            let mut peers = Vec::with_capacity(peer_ids.len());
            for id in peer_ids {
                let mut groups = Self::load_series(
                    conn,
                    "trend_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3",
                    &[&id, &ts(range.start), &ts(range.end)],
                )?;
                if let Some(series) = groups.remove(&id) {
                    peers.push(series);
                }
            }
            Ok(peers)
        })
        .await
    }

    async fn upsert_anomalies(&self, anomalies: &[Anomaly]) -> Result<usize> {
        if anomalies.is_empty() {
            return Ok(0);
        }
        let anomalies = anomalies.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO anomalies (trend_id, detection_timestamp, anomaly_type,
                        severity, anomaly_score, payload)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(trend_id, detection_timestamp, anomaly_type) DO UPDATE SET
                        severity = excluded.severity,
                        anomaly_score = excluded.anomaly_score,
                        payload = excluded.payload
                    "#,
                )?;
                for a in &anomalies {
                    stmt.execute(params![
                        a.trend_id,
                        ts(a.detection_timestamp),
                        a.anomaly_type.as_str(),
                        a.severity.as_str(),
                        a.anomaly_score,
                        serde_json::to_string(a)?,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(anomalies.len())
        })
        .await
    }

    async fn upsert_forecast(&self, forecast: &EnsembleForecast) -> Result<()> {
        let forecast = forecast.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO forecasts (trend_id, forecast_origin, horizon_hours,
                    model_accuracy, payload)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(trend_id, forecast_origin) DO UPDATE SET
                    horizon_hours = excluded.horizon_hours,
                    model_accuracy = excluded.model_accuracy,
                    payload = excluded.payload
                "#,
                params![
                    forecast.trend_id,
                    ts(forecast.forecast_origin),
                    forecast.horizon_hours,
                    forecast.model_accuracy,
                    serde_json::to_string(&forecast)?,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn upsert_variants(&self, variants: &[Variant]) -> Result<usize> {
        if variants.is_empty() {
            return Ok(0);
        }
        let variants = variants.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO variants (trend_id, variant_type, variant_name,
                        time_range_start, time_range_end, payload)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(trend_id, variant_type, variant_name) DO UPDATE SET
                        time_range_start = excluded.time_range_start,
                        time_range_end = excluded.time_range_end,
                        payload = excluded.payload
                    "#,
                )?;
                for v in &variants {
                    stmt.execute(params![
                        v.trend_id,
                        v.variant_type.as_str(),
                        v.variant_name,
                        ts(v.time_range_start),
                        ts(v.time_range_end),
                        serde_json::to_string(v)?,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(variants.len())
        })
        .await
    }

    async fn anomalies_for(&self, trend_id: &str) -> Result<Vec<Anomaly>> {
        let trend_id = trend_id.to_string();
        self.with_conn(move |conn| {
            Self::load_payloads(
                conn,
                "SELECT payload FROM anomalies WHERE trend_id = ?1
                 ORDER BY detection_timestamp, anomaly_type",
                &trend_id,
            )
        })
        .await
    }

    async fn forecasts_for(&self, trend_id: &str) -> Result<Vec<EnsembleForecast>> {
        let trend_id = trend_id.to_string();
        self.with_conn(move |conn| {
            Self::load_payloads(
                conn,
                "SELECT payload FROM forecasts WHERE trend_id = ?1 ORDER BY forecast_origin",
                &trend_id,
            )
        })
        .await
    }

    async fn variants_for(&self, trend_id: &str) -> Result<Vec<Variant>> {
        let trend_id = trend_id.to_string();
        self.with_conn(move |conn| {
            let mut variants: Vec<Variant> = Self::load_payloads(
                conn,
                "SELECT payload FROM variants WHERE trend_id = ?1",
                &trend_id,
            )?;
            variants.sort_by(|a, b| {
                (a.variant_type, &a.variant_name).cmp(&(b.variant_type, &b.variant_name))
            });
            Ok(variants)
        })
        .await
    }

    async fn upsert_bins(&self, bins: &[TemporalBin]) -> Result<usize> {
        if bins.is_empty() {
            return Ok(0);
        }
        let bins = bins.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO normalized_bins (bin_start, bin_size, platform_source,
                        category, payload)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(bin_start, bin_size, platform_source, category) DO UPDATE SET
                        payload = excluded.payload
                    "#,
                )?;
                for bin in &bins {
                    stmt.execute(params![
                        ts(bin.bin_start),
                        bin.bin_size.as_str(),
                        bin.platform_source.as_str(),
                        bin.category,
                        serde_json::to_string(bin)?,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(bins.len())
        })
        .await
    }

    async fn query_bins(
        &self,
        range: TimeRange,
        platform: Option<&Platform>,
        category: Option<&str>,
    ) -> Result<Vec<TemporalBin>> {
        let platform = platform.map(|p| p.as_str().to_string());
        let category = category.map(str::to_string);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payload FROM normalized_bins
                 WHERE bin_start >= ?1 AND bin_start <= ?2
                   AND (?3 IS NULL OR platform_source = ?3)
                   AND (?4 IS NULL OR category = ?4)
                 ORDER BY bin_start, bin_size, platform_source, category",
            )?;
            let payloads = stmt
                .query_map(
                    params![ts(range.start), ts(range.end), platform, category],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            payloads
                .iter()
                .map(|p| serde_json::from_str(p).map_err(Error::from))
                .collect()
        })
        .await
    }
}

// ============================================================================
// In-memory Implementation (for testing)
// ============================================================================

/// In-memory implementation of [`TrendStore`]
///
/// Can be told to fail the next N calls of an operation with a recoverable
/// error, which exercises the batch runner's retry path.
#[derive(Default)]
pub struct MemoryTrendStore {
    series: RwLock<BTreeMap<String, TrendSeries>>,
    anomalies: RwLock<BTreeMap<(String, DateTime<Utc>, AnomalyType), Anomaly>>,
    forecasts: RwLock<BTreeMap<(String, DateTime<Utc>), EnsembleForecast>>,
    variants: RwLock<BTreeMap<(String, VariantType, String), Variant>>,
    bins: RwLock<BTreeMap<(DateTime<Utc>, String, String, String), TemporalBin>>,
    pending_failures: Mutex<BTreeMap<String, u32>>,
}

fn poisoned() -> Error {
    Error::other("In-memory store lock poisoned")
}

impl MemoryTrendStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls of `operation` fail with a recoverable I/O error
    pub fn inject_failures(&self, operation: &str, count: u32) {
        if let Ok(mut pending) = self.pending_failures.lock() {
            pending.insert(operation.to_string(), count);
        }
    }

    fn check_failure(&self, operation: &str) -> Result<()> {
        let mut pending = self.pending_failures.lock().map_err(|_| poisoned())?;
        let consumed = match pending.get_mut(operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if consumed {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("injected failure in {operation}"),
            )));
        }
        Ok(())
    }

    /// Number of stored score points across all trends
    pub fn point_count(&self) -> usize {
        self.series
            .read()
            .map(|s| s.values().map(TrendSeries::len).sum())
            .unwrap_or(0)
    }

    /// Number of stored derived artifacts (anomalies, forecasts, variants, bins)
    pub fn artifact_count(&self) -> usize {
        let anomalies = self.anomalies.read().map(|a| a.len()).unwrap_or(0);
        let forecasts = self.forecasts.read().map(|f| f.len()).unwrap_or(0);
        let variants = self.variants.read().map(|v| v.len()).unwrap_or(0);
        let bins = self.bins.read().map(|b| b.len()).unwrap_or(0);
        anomalies + forecasts + variants + bins
    }
}

#[async_trait]
impl TrendStore for MemoryTrendStore {
    async fn upsert_score_points(&self, points: &[ScorePoint]) -> Result<usize> {
        self.check_failure("upsert_score_points")?;
        let mut series = self.series.write().map_err(|_| poisoned())?;
        for point in points {
            series
                .entry(point.trend_id.clone())
                .or_insert_with(|| TrendSeries::new(point.trend_id.clone()))
                .upsert(point.clone());
        }
        Ok(points.len())
    }

    async fn query_series(&self, trend_id: &str, range: TimeRange) -> Result<TrendSeries> {
        self.check_failure("query_series")?;
        let series = self.series.read().map_err(|_| poisoned())?;
        Ok(series
            .get(trend_id)
            .map(|s| s.range(range.start, range.end))
            .unwrap_or_else(|| TrendSeries::new(trend_id)))
    }

    async fn query_window(&self, range: TimeRange) -> Result<Vec<TrendSeries>> {
        self.check_failure("query_window")?;
        let series = self.series.read().map_err(|_| poisoned())?;
        Ok(series
            .values()
            .map(|s| s.range(range.start, range.end))
            .filter(|s| !s.is_empty())
            .collect())
    }

    async fn query_peers(
        &self,
        category: &str,
        exclude_trend_id: &str,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<TrendSeries>> {
        self.check_failure("query_peers")?;
        let series = self.series.read().map_err(|_| poisoned())?;
        Ok(series
            .values()
            .filter(|s| s.trend_id != exclude_trend_id)
            .map(|s| s.range(range.start, range.end))
            .filter(|s| s.iter().any(|p| p.category == category))
            .take(limit)
            .collect())
    }

    async fn upsert_anomalies(&self, anomalies: &[Anomaly]) -> Result<usize> {
        self.check_failure("upsert_anomalies")?;
        let mut stored = self.anomalies.write().map_err(|_| poisoned())?;
        for anomaly in anomalies {
            stored.insert(anomaly.key(), anomaly.clone());
        }
        Ok(anomalies.len())
    }

    async fn upsert_forecast(&self, forecast: &EnsembleForecast) -> Result<()> {
        self.check_failure("upsert_forecast")?;
        let mut stored = self.forecasts.write().map_err(|_| poisoned())?;
        stored.insert(forecast.key(), forecast.clone());
        Ok(())
    }

    async fn upsert_variants(&self, variants: &[Variant]) -> Result<usize> {
        self.check_failure("upsert_variants")?;
        let mut stored = self.variants.write().map_err(|_| poisoned())?;
        for variant in variants {
            stored.insert(variant.key(), variant.clone());
        }
        Ok(variants.len())
    }

    async fn anomalies_for(&self, trend_id: &str) -> Result<Vec<Anomaly>> {
        self.check_failure("anomalies_for")?;
        let stored = self.anomalies.read().map_err(|_| poisoned())?;
        Ok(stored
            .values()
            .filter(|a| a.trend_id == trend_id)
            .cloned()
            .collect())
    }

    async fn forecasts_for(&self, trend_id: &str) -> Result<Vec<EnsembleForecast>> {
        self.check_failure("forecasts_for")?;
        let stored = self.forecasts.read().map_err(|_| poisoned())?;
        Ok(stored
            .values()
            .filter(|f| f.trend_id == trend_id)
            .cloned()
            .collect())
    }

    async fn variants_for(&self, trend_id: &str) -> Result<Vec<Variant>> {
        self.check_failure("variants_for")?;
        let stored = self.variants.read().map_err(|_| poisoned())?;
        Ok(stored
            .values()
            .filter(|v| v.trend_id == trend_id)
            .cloned()
            .collect())
    }

    async fn upsert_bins(&self, bins: &[TemporalBin]) -> Result<usize> {
        self.check_failure("upsert_bins")?;
        let mut stored = self.bins.write().map_err(|_| poisoned())?;
        for bin in bins {
            stored.insert(bin.key(), bin.clone());
        }
        Ok(bins.len())
    }

    async fn query_bins(
        &self,
        range: TimeRange,
        platform: Option<&Platform>,
        category: Option<&str>,
    ) -> Result<Vec<TemporalBin>> {
        self.check_failure("query_bins")?;
        let stored = self.bins.read().map_err(|_| poisoned())?;
        Ok(stored
            .values()
            .filter(|b| range.contains(b.bin_start))
            .filter(|b| platform.map_or(true, |p| p.as_str() == b.platform_source.as_str()))
            .filter(|b| category.map_or(true, |c| c == b.category))
            .cloned()
            .collect())
    }
}

// ============================================================================
// Shared Store Types
// ============================================================================

/// Thread-safe shared store handle
pub type SharedTrendStore = Arc<dyn TrendStore>;

/// Create a shared SQLite store
pub fn create_sqlite_store(path: impl AsRef<Path>) -> Result<SharedTrendStore> {
    Ok(Arc::new(SqliteTrendStore::new(path)?))
}

/// Create a shared in-memory store
pub fn create_memory_store() -> SharedTrendStore {
    Arc::new(MemoryTrendStore::new())
}

// ============================================================================
// Tests
// ============================================================================
