//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "ai_jobs",
        sql: r#"
            CREATE TABLE IF NOT EXISTS ai_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                submitter_id INTEGER NOT NULL,
                post_ref INTEGER,
                deal_ref INTEGER,
                input_text TEXT,
                idempotency_key TEXT,
                request_fingerprint TEXT NOT NULL,
                output_text TEXT,
                output_structured TEXT,
                error TEXT,
                claimed_by TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_ai_jobs_status_created
                ON ai_jobs(status, created_at, id);
            CREATE INDEX IF NOT EXISTS idx_ai_jobs_submitter_created
                ON ai_jobs(submitter_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_ai_jobs_submitter_type_fingerprint
                ON ai_jobs(submitter_id, job_type, request_fingerprint);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_ai_jobs_active_idempotency
                ON ai_jobs(submitter_id, job_type, idempotency_key)
                WHERE idempotency_key IS NOT NULL AND status IN ('queued', 'running');

            CREATE TABLE IF NOT EXISTS analysis_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                deal_ref INTEGER NOT NULL,
                job_id INTEGER,
                created_by INTEGER NOT NULL,
                provider TEXT NOT NULL,
                model TEXT,
                output_text TEXT NOT NULL,
                output_structured TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_analysis_records_deal ON analysis_records(deal_ref);
            CREATE INDEX IF NOT EXISTS idx_analysis_records_job ON analysis_records(job_id);
        "#,
    },
    Migration {
        version: 2,
        name: "host_tables",
        // Owned by the host application. Created here only so that a fresh
        // database is usable on its own.
        sql: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY,
                author_id INTEGER,
                title TEXT,
                content TEXT
            );

            CREATE TABLE IF NOT EXISTS deal_details (
                id INTEGER PRIMARY KEY,
                post_id INTEGER,
                asset_class TEXT NOT NULL,
                strategy TEXT,
                location TEXT,
                time_horizon_months INTEGER,
                target_irr REAL,
                target_multiple REAL,
                minimum_investment INTEGER,
                sponsor_name TEXT,
                thesis TEXT NOT NULL,
                key_risks TEXT,
                diligence_needed TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_deal_details_asset_class ON deal_details(asset_class);

            CREATE TABLE IF NOT EXISTS deal_outcomes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                deal_id INTEGER NOT NULL,
                outcome TEXT,
                key_lessons TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            CREATE INDEX IF NOT EXISTS idx_deal_outcomes_deal ON deal_outcomes(deal_id);

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_id INTEGER NOT NULL,
                notification_type TEXT NOT NULL DEFAULT 'ai_complete',
                message TEXT NOT NULL,
                related_post_id INTEGER,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id);
        "#,
    },
];

/// Create the `_migrations` table and apply every pending migration.
pub async fn init_schema(conn: &Connection) -> Result<(), DatabaseError> {
    run_migrations(conn).await
}

async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    if tracing::enabled!(tracing::Level::DEBUG) {
        let version = get_current_version(conn).await?;
        tracing::debug!(version, "Database migrations complete");
    }

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
