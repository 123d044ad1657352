use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::aggregator::AggregatedOutput;
use crate::error::{ErrorKind, StreamStatsResult};
use crate::exporter::Exporter;
use crate::ss_error;
use crate::types::{PointId, PointOutcome};

/// Output tables, in the order rows are replaced.
const TABLES: [&str; 5] = [
    "globalwatershedpoint",
    "globalwatershed",
    "characteristics",
    "statistics",
    "point_status",
];

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS globalwatershedpoint (
        point_id TEXT NOT NULL,
        input_x REAL NOT NULL,
        input_y REAL NOT NULL,
        geometry TEXT NOT NULL,
        properties TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS globalwatershed (
        point_id TEXT NOT NULL,
        geometry TEXT NOT NULL,
        properties TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS characteristics (
        point_id TEXT NOT NULL,
        code TEXT NOT NULL,
        name TEXT,
        description TEXT,
        value REAL,
        unit TEXT
    )",
    "CREATE TABLE IF NOT EXISTS statistics (
        point_id TEXT NOT NULL,
        region_code TEXT NOT NULL,
        region_name TEXT,
        code TEXT NOT NULL,
        name TEXT NOT NULL,
        value REAL,
        unit TEXT,
        equivalent_years REAL,
        interval_lower REAL,
        interval_upper REAL
    )",
    "CREATE TABLE IF NOT EXISTS point_status (
        point_id TEXT PRIMARY KEY NOT NULL,
        status TEXT NOT NULL,
        attempts INTEGER NOT NULL,
        backend TEXT,
        last_stage TEXT,
        error TEXT,
        exported_at TEXT NOT NULL
    )",
];

/// Writes batch output into a single SQLite database file.
///
/// Geometries are stored as GeoJSON text. Exporting replaces the rows of every point in the
/// batch, so re-running a batch into the same file does not duplicate data.
#[derive(Debug, Clone)]
pub struct SqliteExporter {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteExporter {
    /// Opens or creates the database at `path` and ensures the output tables exist.
    pub async fn connect(path: impl AsRef<Path>) -> StreamStatsResult<Self> {
        let path = path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self { pool, path })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identifiers of points previously exported as completed.
    pub async fn completed_ids(&self) -> StreamStatsResult<Vec<PointId>> {
        let rows = sqlx::query("SELECT point_id FROM point_status WHERE status = ? ORDER BY point_id")
            .bind(PointOutcome::Completed.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> StreamStatsResult<PointId> {
                Ok(PointId::new(row.try_get::<String, _>("point_id")?))
            })
            .collect()
    }

    async fn replace(
        tx: &mut Transaction<'_, Sqlite>,
        output: &AggregatedOutput,
    ) -> StreamStatsResult<()> {
        for status in &output.statuses {
            for table in TABLES {
                sqlx::query(&format!("DELETE FROM {table} WHERE point_id = ?"))
                    .bind(status.point_id.as_str())
                    .execute(&mut **tx)
                    .await?;
            }
        }

        for outlet in &output.outlets {
            sqlx::query(
                "INSERT INTO globalwatershedpoint (point_id, input_x, input_y, geometry, properties)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(outlet.point_id.as_str())
            .bind(outlet.input_x)
            .bind(outlet.input_y)
            .bind(to_json(&outlet.geometry)?)
            .bind(to_json(&outlet.properties)?)
            .execute(&mut **tx)
            .await?;
        }

        for watershed in &output.watersheds {
            sqlx::query(
                "INSERT INTO globalwatershed (point_id, geometry, properties) VALUES (?, ?, ?)",
            )
            .bind(watershed.point_id.as_str())
            .bind(to_json(&watershed.geometry)?)
            .bind(to_json(&watershed.properties)?)
            .execute(&mut **tx)
            .await?;
        }

        for characteristic in &output.characteristics {
            sqlx::query(
                "INSERT INTO characteristics (point_id, code, name, description, value, unit)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(characteristic.point_id.as_str())
            .bind(&characteristic.code)
            .bind(&characteristic.name)
            .bind(&characteristic.description)
            .bind(characteristic.value)
            .bind(&characteristic.unit)
            .execute(&mut **tx)
            .await?;
        }

        for statistic in &output.statistics {
            sqlx::query(
                "INSERT INTO statistics (point_id, region_code, region_name, code, name, value,
                    unit, equivalent_years, interval_lower, interval_upper)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(statistic.point_id.as_str())
            .bind(&statistic.region_code)
            .bind(&statistic.region_name)
            .bind(&statistic.code)
            .bind(&statistic.name)
            .bind(statistic.value)
            .bind(&statistic.unit)
            .bind(statistic.equivalent_years)
            .bind(statistic.interval_lower)
            .bind(statistic.interval_upper)
            .execute(&mut **tx)
            .await?;
        }

        let exported_at = Utc::now().to_rfc3339();
        for status in &output.statuses {
            sqlx::query(
                "INSERT INTO point_status (point_id, status, attempts, backend, last_stage, error,
                    exported_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(status.point_id.as_str())
            .bind(status.status.as_str())
            .bind(i64::from(status.attempts))
            .bind(&status.backend)
            .bind(status.last_stage.map(|stage| stage.as_str()))
            .bind(&status.error)
            .bind(&exported_at)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}

impl Exporter for SqliteExporter {
    fn name() -> &'static str {
        "sqlite"
    }

    async fn export(&self, output: &AggregatedOutput) -> StreamStatsResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::replace(&mut tx, output).await?;
        tx.commit().await?;

        info!(
            path = %self.path.display(),
            points = output.statuses.len(),
            outlets = output.outlets.len(),
            watersheds = output.watersheds.len(),
            characteristics = output.characteristics.len(),
            statistics = output.statistics.len(),
            "exported batch output"
        );

        Ok(())
    }
}

/// Renders a geometry or property map as JSON text for a `TEXT` column.
fn to_json<T: Serialize + ?Sized>(value: &T) -> StreamStatsResult<String> {
    serde_json::to_string(value).map_err(|err| {
        ss_error!(
            ErrorKind::SerializationError,
            "Failed to serialize output column",
            err.to_string(),
            source: err
        )
    })
}
