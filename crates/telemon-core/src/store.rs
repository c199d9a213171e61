//! Store — SQLite persistence for samples and capture metadata.
//!
//! One connection behind a mutex; every method is synchronous and short.
//! Async callers should go through `spawn_blocking`.
//!
//! # Schema
//!
//! `monitoring_data` keeps the column names the agents use on the wire
//! (`ram_libre`, `hora`, …). `metadata` holds one row per imported capture.
//! Timestamps are stored as text in the [`CanonicalTimestamp`] display form.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::timestamp::CanonicalTimestamp;
use crate::types::{Cleared, MetadataRecord, Metrics, NewMetadata, NewSample, Sample, Stats};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS monitoring_data (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    total_ram            INTEGER NOT NULL,
    ram_libre            INTEGER NOT NULL,
    uso_ram              INTEGER NOT NULL,
    porcentaje_ram       REAL    NOT NULL,
    porcentaje_cpu_uso   REAL    NOT NULL,
    porcentaje_cpu_libre REAL    NOT NULL,
    procesos_corriendo   INTEGER NOT NULL,
    total_procesos       INTEGER NOT NULL,
    procesos_durmiendo   INTEGER NOT NULL,
    procesos_zombie      INTEGER NOT NULL,
    procesos_parados     INTEGER NOT NULL,
    hora                 TEXT    NOT NULL,
    timestamp_received   TEXT    NOT NULL,
    api                  TEXT    NOT NULL,
    created_at           TEXT    NOT NULL
);
CREATE TABLE IF NOT EXISTS metadata (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    total_records    INTEGER NOT NULL,
    collection_start TEXT,
    collection_end   TEXT,
    duration_minutes INTEGER NOT NULL,
    users            INTEGER NOT NULL,
    generated_at     TEXT,
    phase            INTEGER NOT NULL,
    description      TEXT,
    api              TEXT    NOT NULL,
    created_at       TEXT    NOT NULL
);
";

const SAMPLE_COLUMNS: &str = "id, total_ram, ram_libre, uso_ram, porcentaje_ram, \
     porcentaje_cpu_uso, porcentaje_cpu_libre, procesos_corriendo, total_procesos, \
     procesos_durmiendo, procesos_zombie, procesos_parados, hora, timestamp_received, \
     api, created_at";

const INSERT_SAMPLE: &str = "INSERT INTO monitoring_data (
        total_ram, ram_libre, uso_ram, porcentaje_ram, porcentaje_cpu_uso,
        porcentaje_cpu_libre, procesos_corriendo, total_procesos, procesos_durmiendo,
        procesos_zombie, procesos_parados, hora, timestamp_received, api, created_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)";

/// Cloneable handle to the database.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened sample store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // -----------------------------------------------------------------------
    // monitoring_data
    // -----------------------------------------------------------------------

    /// Insert one sample and return its id.
    pub fn insert_sample(&self, sample: &NewSample) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        insert_sample_row(&conn, sample, Utc::now())?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert many samples in one transaction. Returns the number inserted.
    pub fn insert_samples(&self, samples: &[NewSample]) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let created_at = Utc::now();
        for sample in samples {
            insert_sample_row(&tx, sample, created_at)?;
        }
        tx.commit()?;
        Ok(samples.len())
    }

    /// Newest first.
    pub fn list_samples(&self, skip: u32, limit: u32) -> Result<Vec<Sample>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM monitoring_data ORDER BY id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![i64::from(limit), i64::from(skip)], sample_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_sample(&self, id: i64) -> Result<Option<Sample>, StoreError> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!("SELECT {SAMPLE_COLUMNS} FROM monitoring_data WHERE id = ?1"),
                params![id],
                sample_from_row,
            )
            .optional()?)
    }

    // -----------------------------------------------------------------------
    // metadata
    // -----------------------------------------------------------------------

    pub fn insert_metadata(&self, metadata: &NewMetadata) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO metadata (
                total_records, collection_start, collection_end, duration_minutes,
                users, generated_at, phase, description, api, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                metadata.total_records,
                metadata.collection_start.map(|ts| ts.to_string()),
                metadata.collection_end.map(|ts| ts.to_string()),
                metadata.duration_minutes,
                metadata.users,
                metadata.generated_at.map(|ts| ts.to_string()),
                metadata.phase,
                metadata.description,
                metadata.api,
                utc_text(Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All metadata rows, oldest first.
    pub fn list_metadata(&self) -> Result<Vec<MetadataRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, total_records, collection_start, collection_end, duration_minutes,
                    users, generated_at, phase, description, api, created_at
             FROM metadata ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MetadataRecord {
                id: row.get(0)?,
                total_records: row.get(1)?,
                collection_start: optional_timestamp(row, 2)?,
                collection_end: optional_timestamp(row, 3)?,
                duration_minutes: row.get(4)?,
                users: row.get(5)?,
                generated_at: optional_timestamp(row, 6)?,
                phase: row.get(7)?,
                description: row.get(8)?,
                api: row.get(9)?,
                created_at: utc_column(row, 10)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // -----------------------------------------------------------------------
    // Aggregates and maintenance
    // -----------------------------------------------------------------------

    /// Counts, averages (rounded to two decimals) and maxima. All zero when
    /// there are no samples.
    pub fn stats(&self, api: &str) -> Result<Stats, StoreError> {
        let conn = self.lock()?;
        let (total, avg_cpu, avg_ram, max_cpu, max_ram) = conn.query_row(
            "SELECT COUNT(*), AVG(porcentaje_cpu_uso), AVG(porcentaje_ram),
                    MAX(porcentaje_cpu_uso), MAX(porcentaje_ram)
             FROM monitoring_data",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                ))
            },
        )?;
        let metadata: i64 = conn.query_row("SELECT COUNT(*) FROM metadata", [], |row| row.get(0))?;

        Ok(Stats {
            total_monitoring_records: total,
            total_metadata_records: metadata,
            average_cpu_usage: round2(avg_cpu.unwrap_or(0.0)),
            average_ram_usage: round2(avg_ram.unwrap_or(0.0)),
            max_cpu_usage: max_cpu.unwrap_or(0.0),
            max_ram_usage: max_ram.unwrap_or(0.0),
            api: api.to_string(),
        })
    }

    /// Delete every sample and metadata row in one transaction.
    pub fn clear(&self) -> Result<Cleared, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let monitoring = tx.execute("DELETE FROM monitoring_data", [])?;
        let metadata = tx.execute("DELETE FROM metadata", [])?;
        tx.commit()?;
        tracing::info!(monitoring, metadata, "cleared sample store");
        Ok(Cleared {
            deleted_monitoring_records: monitoring as i64,
            deleted_metadata_records: metadata as i64,
        })
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn insert_sample_row(
    conn: &Connection,
    sample: &NewSample,
    created_at: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    let m = &sample.metrics;
    conn.execute(
        INSERT_SAMPLE,
        params![
            m.total_ram,
            m.free_ram,
            m.used_ram,
            m.ram_percent,
            m.cpu_percent,
            m.cpu_idle_percent,
            m.running_processes,
            m.total_processes,
            m.sleeping_processes,
            m.zombie_processes,
            m.stopped_processes,
            sample.sampled_at.to_string(),
            sample.received_at.to_string(),
            sample.api,
            utc_text(created_at),
        ],
    )
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<Sample> {
    Ok(Sample {
        id: row.get(0)?,
        metrics: Metrics {
            total_ram: row.get(1)?,
            free_ram: row.get(2)?,
            used_ram: row.get(3)?,
            ram_percent: row.get(4)?,
            cpu_percent: row.get(5)?,
            cpu_idle_percent: row.get(6)?,
            running_processes: row.get(7)?,
            total_processes: row.get(8)?,
            sleeping_processes: row.get(9)?,
            zombie_processes: row.get(10)?,
            stopped_processes: row.get(11)?,
        },
        sampled_at: timestamp_column(row, 12)?,
        received_at: timestamp_column(row, 13)?,
        api: row.get(14)?,
        created_at: utc_column(row, 15)?,
    })
}

fn decode_timestamp(idx: usize, text: &str) -> rusqlite::Result<CanonicalTimestamp> {
    CanonicalTimestamp::from_storage(text)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<CanonicalTimestamp> {
    let text: String = row.get(idx)?;
    decode_timestamp(idx, &text)
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<CanonicalTimestamp>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|text| decode_timestamp(idx, &text)).transpose()
}

fn utc_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn utc_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
