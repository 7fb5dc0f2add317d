//! Appointment type registry.

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::AppointmentType;

/// Lookup of named appointment types.
///
/// Daily limits are configuration ([`TypeLimits`](crate::config::TypeLimits)),
/// not stored state, so the registry only knows IDs and names.
pub trait TypeRegistry {
    /// Register a new type. Names are unique ignoring case.
    fn insert_appointment_type(&self, name: &str) -> DbResult<AppointmentType>;

    fn get_appointment_type(&self, id: i64) -> DbResult<Option<AppointmentType>>;

    /// Resolve a numeric ID or a case-insensitive name.
    fn find_appointment_type(&self, id_or_name: &str) -> DbResult<Option<AppointmentType>>;

    fn list_appointment_types(&self) -> DbResult<Vec<AppointmentType>>;
}

impl TypeRegistry for Connection {
    fn insert_appointment_type(&self, name: &str) -> DbResult<AppointmentType> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DbError::Constraint("Appointment type name is empty".into()));
        }

        let now = chrono::Utc::now().to_rfc3339();
        match self.execute(
            "INSERT INTO appointment_types (name, created_at) VALUES (?1, ?2)",
            params![name, now],
        ) {
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(DbError::Constraint(format!(
                    "Appointment type already exists: {}",
                    name
                )));
            }
            other => {
                other?;
            }
        }

        Ok(AppointmentType {
            id: self.last_insert_rowid(),
            name: name.to_string(),
            created_at: now,
        })
    }

    fn get_appointment_type(&self, id: i64) -> DbResult<Option<AppointmentType>> {
        self.query_row(
            "SELECT id, name, created_at FROM appointment_types WHERE id = ?",
            [id],
            |row| {
                Ok(AppointmentType {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    fn find_appointment_type(&self, id_or_name: &str) -> DbResult<Option<AppointmentType>> {
        let needle = id_or_name.trim();

        if let Ok(id) = needle.parse::<i64>() {
            if let Some(found) = self.get_appointment_type(id)? {
                return Ok(Some(found));
            }
        }

        // Column collation is NOCASE, so equality ignores case
        self.query_row(
            "SELECT id, name, created_at FROM appointment_types WHERE name = ?",
            [needle],
            |row| {
                Ok(AppointmentType {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    fn list_appointment_types(&self) -> DbResult<Vec<AppointmentType>> {
        let mut stmt =
            self.prepare("SELECT id, name, created_at FROM appointment_types ORDER BY name")?;

        let rows = stmt.query_map([], |row| {
            Ok(AppointmentType {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

impl TypeRegistry for Database {
    fn insert_appointment_type(&self, name: &str) -> DbResult<AppointmentType> {
        self.conn.insert_appointment_type(name)
    }

    fn get_appointment_type(&self, id: i64) -> DbResult<Option<AppointmentType>> {
        self.conn.get_appointment_type(id)
    }

    fn find_appointment_type(&self, id_or_name: &str) -> DbResult<Option<AppointmentType>> {
        self.conn.find_appointment_type(id_or_name)
    }

    fn list_appointment_types(&self) -> DbResult<Vec<AppointmentType>> {
        self.conn.list_appointment_types()
    }
}
