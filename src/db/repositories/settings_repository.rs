use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::AppResult;

/// Every scheduling setting is stored under this key prefix.
pub const SCHEDULING_PREFIX: &str = "scheduling.";

#[derive(Debug, Clone)]
pub struct SettingRow {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

impl SettingRow {
    /// Key without the scheduling prefix.
    pub fn short_key(&self) -> &str {
        self.key
            .strip_prefix(SCHEDULING_PREFIX)
            .unwrap_or(self.key.as_str())
    }
}

impl TryFrom<&Row<'_>> for SettingRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            key: row.get("key")?,
            value: row.get("value")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct SettingsRepository;

impl SettingsRepository {
    pub fn get(conn: &Connection, name: &str) -> AppResult<Option<SettingRow>> {
        let mut stmt =
            conn.prepare("SELECT key, value, updated_at FROM app_settings WHERE key = ?1")?;
        let row = stmt
            .query_row([scoped_key(name)], |row| SettingRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn list_scheduling(conn: &Connection) -> AppResult<Vec<SettingRow>> {
        let mut stmt = conn.prepare(
            "SELECT key, value, updated_at FROM app_settings WHERE key LIKE :prefix ORDER BY key ASC",
        )?;
        let rows = stmt
            .query_map(
                named_params! {":prefix": format!("{SCHEDULING_PREFIX}%")},
                |row| SettingRow::try_from(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn upsert(conn: &Connection, name: &str, value: &str, updated_at: &str) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO app_settings (key, value, updated_at)
                VALUES (:key, :value, :updated_at)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
            "#,
            named_params! {
                ":key": scoped_key(name),
                ":value": value,
                ":updated_at": updated_at,
            },
        )?;
        Ok(())
    }

    /// Removes every stored scheduling setting, returning how many were dropped.
    pub fn clear_scheduling(conn: &Connection) -> AppResult<usize> {
        let affected = conn.execute(
            "DELETE FROM app_settings WHERE key LIKE ?1",
            [format!("{SCHEDULING_PREFIX}%")],
        )?;
        Ok(affected)
    }
}

fn scoped_key(name: &str) -> String {
    if name.starts_with(SCHEDULING_PREFIX) {
        name.to_string()
    } else {
        format!("{SCHEDULING_PREFIX}{name}")
    }
}
