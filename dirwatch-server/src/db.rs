//! Postgres persistence for scan results.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use dirwatch_core::{CensusError, Result, ResultStore, ScanResult, ScanStatus};
use serde_json::{Value, json};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, warn};

const RESULT_COLUMNS: &str = "start_time, end_time, run_time_secs, files_added, files_deleted, \
                              magic_word, magic_word_count, run_status";

/// Connect to Postgres, retrying until the database accepts us. The daemon is
/// useless without its store, so startup simply waits.
pub async fn connect_with_retry(url: &str, reconnect_delay: Duration) -> PgPool {
    loop {
        match PgPoolOptions::new().max_connections(5).connect(url).await {
            Ok(pool) => {
                info!("connected to postgres");
                return pool;
            }
            Err(err) => {
                warn!(
                    "failed to connect to postgres: {err}; retrying in {}ms",
                    reconnect_delay.as_millis()
                );
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
}

/// Stores one row per scan cycle, keyed by `start_time`.
#[derive(Clone, Debug)]
pub struct PostgresResultStore {
    pool: PgPool,
    table: String,
}

impl PostgresResultStore {
    /// The table name is interpolated into SQL, so it is restricted to a
    /// plain identifier here.
    pub fn new(pool: PgPool, table: &str) -> Result<Self> {
        validate_identifier(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    /// Create the results table when it does not exist yet.
    pub async fn ensure_table(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             start_time timestamp(3) with time zone, \
             end_time timestamp(3) with time zone, \
             run_time_secs double precision, \
             files_added jsonb, \
             files_deleted jsonb, \
             magic_word varchar(255), \
             magic_word_count bigint, \
             run_status varchar(20))",
            self.table
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        debug!("results table {} is ready", self.table);
        Ok(())
    }
}

#[async_trait]
impl ResultStore for PostgresResultStore {
    async fn insert(&self, result: &ScanResult) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({RESULT_COLUMNS}) \
             VALUES (to_timestamp($1::double precision), to_timestamp($2::double precision), \
             $3, $4, $5, $6, $7, $8)",
            self.table
        );

        sqlx::query(&sql)
            .bind(result.start_time)
            .bind(result.end_time)
            .bind(result.duration_seconds)
            .bind(paths_envelope("added", &result.added_paths))
            .bind(paths_envelope("deleted", &result.deleted_paths))
            .bind(&result.search_token)
            .bind(result.occurrence_total as i64)
            .bind(result.status.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        debug!(
            "persisted scan result for start_time {}",
            result.start_time
        );
        Ok(())
    }

    async fn recent(&self, limit: i64, since: Option<i64>) -> Result<Vec<ScanResult>> {
        let filter = if since.is_some() {
            "WHERE EXTRACT(epoch FROM start_time) >= $2"
        } else {
            ""
        };
        let sql = format!(
            "SELECT EXTRACT(epoch FROM start_time)::bigint AS start_epoch, \
             EXTRACT(epoch FROM end_time)::bigint AS end_epoch, \
             run_time_secs, files_added, files_deleted, magic_word, magic_word_count, run_status \
             FROM {} {filter} ORDER BY start_time DESC LIMIT $1",
            self.table
        );

        let mut query = sqlx::query(&sql).bind(limit.max(0));
        if let Some(since) = since {
            query = query.bind(since);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(row_to_result).collect()
    }
}

fn db_err(err: sqlx::Error) -> CensusError {
    CensusError::Database(err.to_string())
}

fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(CensusError::Config(format!(
            "invalid table name {name:?}"
        )))
    }
}

/// Path lists are stored as `{"added": [...]}` / `{"deleted": [...]}` jsonb
/// envelopes.
fn paths_envelope(key: &str, paths: &[PathBuf]) -> Value {
    let paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    json!({ key: paths })
}

fn envelope_paths(value: &Value, key: &str) -> Vec<PathBuf> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default()
}

fn row_to_result(row: &PgRow) -> Result<ScanResult> {
    let start_time: i64 = row.try_get("start_epoch").map_err(db_err)?;
    let end_time: i64 = row.try_get("end_epoch").map_err(db_err)?;
    let duration_seconds: f64 = row.try_get("run_time_secs").map_err(db_err)?;
    let files_added: Value = row.try_get("files_added").map_err(db_err)?;
    let files_deleted: Value = row.try_get("files_deleted").map_err(db_err)?;
    let search_token: String = row.try_get("magic_word").map_err(db_err)?;
    let occurrence_total: i64 = row.try_get("magic_word_count").map_err(db_err)?;
    let run_status: String = row.try_get("run_status").map_err(db_err)?;

    let status = if run_status == ScanStatus::Success.as_str() {
        ScanStatus::Success
    } else {
        ScanStatus::Failed
    };

    Ok(ScanResult {
        start_time,
        end_time,
        duration_seconds,
        added_paths: envelope_paths(&files_added, "added"),
        deleted_paths: envelope_paths(&files_deleted, "deleted"),
        search_token,
        occurrence_total: occurrence_total.max(0) as u64,
        status,
    })
}
