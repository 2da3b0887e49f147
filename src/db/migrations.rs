use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::{info, warn};

use crate::error::AppResult;

const USER_VERSION: i32 = 3;

#[derive(Debug)]
pub struct MigrationInfo {
    pub version: i32,
    pub description: String,
    pub applied_at: DateTime<Utc>,
}

pub fn run(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS migration_history (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL,
            rollback_sql TEXT
        );
        "#,
    )?;

    let mut current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version < 1 {
        info!(target: "app::db", version = current_version, "running migration v1");
        migrate_to_v1(conn)?;
        current_version = 1;
        conn.execute(&format!("PRAGMA user_version = {}", current_version), [])?;
        record_migration(
            conn,
            1,
            "Index appointments and blocked times by staff timeline",
            Some(
                r#"
                DROP INDEX IF EXISTS idx_appointments_staff_start;
                DROP INDEX IF EXISTS idx_blocked_times_staff_start;
                "#,
            ),
        )?;
    }

    if current_version < 2 {
        info!(target: "app::db", version = current_version, "running migration v2");
        migrate_to_v2(conn)?;
        current_version = 2;
        conn.execute(&format!("PRAGMA user_version = {}", current_version), [])?;
        record_migration(conn, 2, "Add customer rating to appointments", None)?;
    }

    if current_version < 3 {
        info!(target: "app::db", version = current_version, "running migration v3");
        migrate_to_v3(conn)?;
        current_version = 3;
        conn.execute(&format!("PRAGMA user_version = {}", current_version), [])?;
        record_migration(
            conn,
            3,
            "Index time-off requests by status",
            Some("DROP INDEX IF EXISTS idx_time_off_status;"),
        )?;
    }

    if current_version != USER_VERSION {
        conn.execute(&format!("PRAGMA user_version = {}", USER_VERSION), [])?;
    }

    Ok(())
}

fn record_migration(
    conn: &Connection,
    version: i32,
    description: &str,
    rollback_sql: Option<&str>,
) -> AppResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR REPLACE INTO migration_history (version, description, applied_at, rollback_sql) VALUES (?, ?, ?, ?)",
        (version, description, now, rollback_sql),
    )?;
    Ok(())
}

pub fn rollback_to_version(conn: &Connection, target_version: i32) -> AppResult<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if target_version >= current_version {
        warn!(
            target: "app::db",
            target_version, current_version, "rollback target is not below current version"
        );
        return Ok(());
    }

    let scripts = {
        let mut stmt = conn.prepare(
            "SELECT version, rollback_sql FROM migration_history WHERE version > ? ORDER BY version DESC",
        )?;
        let rows = stmt.query_map([target_version], |row| {
            Ok((row.get::<_, i32>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let tx = conn.unchecked_transaction()?;
    for (version, rollback_sql) in scripts {
        if let Some(sql) = rollback_sql {
            info!(target: "app::db", version, "rolling back migration");
            tx.execute_batch(&sql)?;
        } else {
            warn!(target: "app::db", version, "no rollback script for migration");
        }
    }

    tx.execute_batch(&format!("PRAGMA user_version = {target_version}"))?;
    tx.execute(
        "DELETE FROM migration_history WHERE version > ?",
        [target_version],
    )?;
    tx.commit()?;

    Ok(())
}

pub fn get_migration_history(conn: &Connection) -> AppResult<Vec<MigrationInfo>> {
    let mut stmt = conn.prepare(
        "SELECT version, description, applied_at FROM migration_history ORDER BY version",
    )?;

    let migrations = stmt
        .query_map([], |row| {
            let applied_at_str: String = row.get(2)?;
            let applied_at = DateTime::parse_from_rfc3339(&applied_at_str)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        2,
                        "applied_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Utc);

            Ok(MigrationInfo {
                version: row.get(0)?,
                description: row.get(1)?,
                applied_at,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(migrations)
}

fn migrate_to_v1(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_appointments_staff_start
            ON appointments(staff_id, start_time);
        CREATE INDEX IF NOT EXISTS idx_blocked_times_staff_start
            ON blocked_times(staff_id, start_time);
        "#,
    )?;
    Ok(())
}

fn migrate_to_v2(conn: &Connection) -> AppResult<()> {
    ensure_column(conn, "appointments", "customer_rating", "REAL")?;
    Ok(())
}

fn migrate_to_v3(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_time_off_status ON time_off_requests(status);",
    )?;
    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, column: &str, definition: &str) -> AppResult<()> {
    if !column_exists(conn, table, column)? {
        let sql = format!("ALTER TABLE {table} ADD COLUMN {column} {definition};");
        conn.execute(&sql, [])?;
    }
    Ok(())
}

pub(crate) fn column_exists(conn: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let pragma = format!("PRAGMA table_info({table})");
    let mut stmt = conn.prepare(&pragma)?;
    let mut rows = stmt.query([])?;

    while let Some(row) = rows.next()? {
        if equals_name(row, column)? {
            return Ok(true);
        }
    }

    Ok(false)
}

fn equals_name(row: &Row<'_>, column: &str) -> Result<bool, rusqlite::Error> {
    let name: String = row.get(1)?;
    Ok(name.eq_ignore_ascii_case(column))
}
