//! SQLite schema definition.

/// Complete database schema for vet-schedule.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Appointment Types
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointment_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Appointments (logically deleted via is_canceled, never removed)
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,                          -- YYYY-MM-DD
    time TEXT NOT NULL,                          -- HH:MM, 24-hour
    appointment_type_id INTEGER REFERENCES appointment_types(id),  -- legacy single type
    patient_id INTEGER,                          -- legacy single patient
    is_approved INTEGER NOT NULL DEFAULT 0,
    is_completed INTEGER NOT NULL DEFAULT 0,
    is_canceled INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_appointments_date ON appointments(date, is_canceled);
CREATE INDEX IF NOT EXISTS idx_appointments_date_time ON appointments(date, time);

-- Authoritative type membership (many-to-many)
CREATE TABLE IF NOT EXISTS appointment_type_links (
    appointment_id INTEGER NOT NULL REFERENCES appointments(id),
    appointment_type_id INTEGER NOT NULL REFERENCES appointment_types(id),
    PRIMARY KEY (appointment_id, appointment_type_id)
);

CREATE INDEX IF NOT EXISTS idx_type_links_type ON appointment_type_links(appointment_type_id);

-- Authoritative patient membership (many-to-many), one slot time per pet
CREATE TABLE IF NOT EXISTS appointment_patients (
    appointment_id INTEGER NOT NULL REFERENCES appointments(id),
    patient_id INTEGER NOT NULL,
    slot_time TEXT NOT NULL,                     -- HH:MM, 24-hour
    PRIMARY KEY (appointment_id, patient_id)
);

CREATE INDEX IF NOT EXISTS idx_appointment_patients_time ON appointment_patients(slot_time);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_type_names_unique_ignoring_case() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute("INSERT INTO appointment_types (name) VALUES (?)", ["Vaccination"])
            .unwrap();
        let result = conn.execute("INSERT INTO appointment_types (name) VALUES (?)", ["vaccination"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_type_link_requires_known_type() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO appointments (date, time) VALUES ('2025-06-01', '10:00')",
            [],
        )
        .unwrap();

        // Type 99 does not exist
        let result = conn.execute(
            "INSERT INTO appointment_type_links (appointment_id, appointment_type_id) VALUES (1, 99)",
            [],
        );
        assert!(result.is_err());
    }
}
