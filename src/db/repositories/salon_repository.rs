use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::salon::{SalonRecord, ServiceRecord};

#[derive(Debug, Clone)]
pub struct SalonRow {
    pub id: String,
    pub name: String,
    pub timezone: String,
    pub open_minute: u32,
    pub close_minute: u32,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl SalonRow {
    pub fn from_record(record: &SalonRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            timezone: record.timezone.clone(),
            open_minute: record.open_minute,
            close_minute: record.close_minute,
            is_active: record.is_active,
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> SalonRecord {
        SalonRecord {
            id: self.id,
            name: self.name,
            timezone: self.timezone,
            open_minute: self.open_minute,
            close_minute: self.close_minute,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl TryFrom<&Row<'_>> for SalonRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            timezone: row.get("timezone")?,
            open_minute: row.get("open_minute")?,
            close_minute: row.get("close_minute")?,
            is_active: row.get::<_, i64>("is_active")? != 0,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServiceRow {
    pub id: String,
    pub salon_id: String,
    pub name: String,
    pub duration_minutes: i64,
    pub price: f64,
    pub created_at: String,
    pub updated_at: String,
}

impl ServiceRow {
    pub fn from_record(record: &ServiceRecord) -> Self {
        Self {
            id: record.id.clone(),
            salon_id: record.salon_id.clone(),
            name: record.name.clone(),
            duration_minutes: record.duration_minutes,
            price: record.price,
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> ServiceRecord {
        ServiceRecord {
            id: self.id,
            salon_id: self.salon_id,
            name: self.name,
            duration_minutes: self.duration_minutes,
            price: self.price,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl TryFrom<&Row<'_>> for ServiceRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            salon_id: row.get("salon_id")?,
            name: row.get("name")?,
            duration_minutes: row.get("duration_minutes")?,
            price: row.get("price")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct SalonRepository;

impl SalonRepository {
    pub fn insert(conn: &Connection, row: &SalonRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO salons (
                    id, name, timezone, open_minute, close_minute, is_active, created_at, updated_at
                ) VALUES (
                    :id, :name, :timezone, :open_minute, :close_minute, :is_active, :created_at, :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":name": &row.name,
                ":timezone": &row.timezone,
                ":open_minute": row.open_minute,
                ":close_minute": row.close_minute,
                ":is_active": row.is_active as i64,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(())
    }

    pub fn update_hours(
        conn: &Connection,
        id: &str,
        open_minute: u32,
        close_minute: u32,
        updated_at: &str,
    ) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE salons SET
                    open_minute = :open_minute,
                    close_minute = :close_minute,
                    updated_at = :updated_at
                WHERE id = :id
            "#,
            named_params! {
                ":id": id,
                ":open_minute": open_minute,
                ":close_minute": close_minute,
                ":updated_at": updated_at,
            },
        )?;
        if affected == 0 {
            return Err(AppError::not_found());
        }
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<SalonRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, timezone, open_minute, close_minute, is_active, created_at, updated_at FROM salons WHERE id = ?1",
        )?;
        let row = stmt
            .query_row([id], |row| SalonRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn list_all(conn: &Connection) -> AppResult<Vec<SalonRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, timezone, open_minute, close_minute, is_active, created_at, updated_at FROM salons ORDER BY name ASC",
        )?;
        let rows = stmt
            .query_map([], |row| SalonRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_service(conn: &Connection, row: &ServiceRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO services (
                    id, salon_id, name, duration_minutes, price, created_at, updated_at
                ) VALUES (
                    :id, :salon_id, :name, :duration_minutes, :price, :created_at, :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":salon_id": &row.salon_id,
                ":name": &row.name,
                ":duration_minutes": row.duration_minutes,
                ":price": row.price,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(())
    }

    pub fn find_service(conn: &Connection, id: &str) -> AppResult<Option<ServiceRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, salon_id, name, duration_minutes, price, created_at, updated_at FROM services WHERE id = ?1",
        )?;
        let row = stmt
            .query_row([id], |row| ServiceRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn list_services(conn: &Connection, salon_id: &str) -> AppResult<Vec<ServiceRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, salon_id, name, duration_minutes, price, created_at, updated_at FROM services WHERE salon_id = ?1 ORDER BY name ASC",
        )?;
        let rows = stmt
            .query_map([salon_id], |row| ServiceRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
