//! Appointment store operations.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};

use super::{date_from_sql, date_to_sql, time_from_sql, time_to_sql, Database, DbError, DbResult};
use crate::models::{Appointment, AttachedPatient, NewAppointment};

/// Persisted bookings as seen by the scheduling rules.
///
/// Every read ignores canceled appointments except [`get_appointment`](Self::get_appointment).
/// `exclude_id` drops one appointment from the result, used when an existing
/// booking is being moved.
pub trait AppointmentStore {
    /// Non-canceled appointments of `type_id` on `date`.
    ///
    /// An appointment is matched through either its legacy type column or a
    /// type link, and counted once per type.
    fn count_non_canceled(
        &self,
        date: NaiveDate,
        type_id: i64,
        exclude_id: Option<i64>,
    ) -> DbResult<u32>;

    /// Non-canceled appointments of any type on `date`.
    fn count_non_canceled_on(&self, date: NaiveDate, exclude_id: Option<i64>) -> DbResult<u32>;

    /// Whether any non-canceled appointment (or one of its pets) occupies `time`.
    fn exists_at(&self, date: NaiveDate, time: NaiveTime, exclude_id: Option<i64>) -> DbResult<bool>;

    /// Distinct occupied times on `date`, ascending.
    fn times_booked(&self, date: NaiveDate, exclude_id: Option<i64>) -> DbResult<Vec<NaiveTime>>;

    /// Insert an appointment with its type and patient links. Returns the new ID.
    fn insert(&self, appointment: &NewAppointment) -> DbResult<i64>;

    /// Move an appointment to a new date and time.
    ///
    /// Each attached pet is shifted by the same offset as the record time, so
    /// a 09:00/10:00 visit moved to 14:00 becomes 14:00/15:00.
    fn update_date_time(&self, id: i64, date: NaiveDate, time: NaiveTime) -> DbResult<bool>;

    /// Mark an appointment approved.
    fn set_approved(&self, id: i64) -> DbResult<bool>;

    fn get_appointment(&self, id: i64) -> DbResult<Option<Appointment>>;
}

impl AppointmentStore for Connection {
    fn count_non_canceled(
        &self,
        date: NaiveDate,
        type_id: i64,
        exclude_id: Option<i64>,
    ) -> DbResult<u32> {
        let count: i64 = self.query_row(
            r#"
            SELECT COUNT(*) FROM appointments a
            WHERE a.date = ?1
              AND a.is_canceled = 0
              AND (?3 IS NULL OR a.id <> ?3)
              AND (
                  a.appointment_type_id = ?2
                  OR EXISTS (
                      SELECT 1 FROM appointment_type_links l
                      WHERE l.appointment_id = a.id AND l.appointment_type_id = ?2
                  )
              )
            "#,
            params![date_to_sql(date), type_id, exclude_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    fn count_non_canceled_on(&self, date: NaiveDate, exclude_id: Option<i64>) -> DbResult<u32> {
        let count: i64 = self.query_row(
            r#"
            SELECT COUNT(*) FROM appointments
            WHERE date = ?1 AND is_canceled = 0 AND (?2 IS NULL OR id <> ?2)
            "#,
            params![date_to_sql(date), exclude_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    fn exists_at(&self, date: NaiveDate, time: NaiveTime, exclude_id: Option<i64>) -> DbResult<bool> {
        let exists: bool = self.query_row(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM appointments a
                WHERE a.date = ?1
                  AND a.is_canceled = 0
                  AND (?3 IS NULL OR a.id <> ?3)
                  AND (
                      a.time = ?2
                      OR EXISTS (
                          SELECT 1 FROM appointment_patients p
                          WHERE p.appointment_id = a.id AND p.slot_time = ?2
                      )
                  )
            )
            "#,
            params![date_to_sql(date), time_to_sql(time), exclude_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn times_booked(&self, date: NaiveDate, exclude_id: Option<i64>) -> DbResult<Vec<NaiveTime>> {
        let mut stmt = self.prepare(
            r#"
            SELECT a.time FROM appointments a
            WHERE a.date = ?1 AND a.is_canceled = 0 AND (?2 IS NULL OR a.id <> ?2)
            UNION
            SELECT p.slot_time FROM appointment_patients p
            JOIN appointments a ON a.id = p.appointment_id
            WHERE a.date = ?1 AND a.is_canceled = 0 AND (?2 IS NULL OR a.id <> ?2)
            ORDER BY 1
            "#,
        )?;

        let rows = stmt.query_map(params![date_to_sql(date), exclude_id], |row| {
            row.get::<_, String>(0)
        })?;

        let mut times = Vec::new();
        for row in rows {
            times.push(time_from_sql(&row?)?);
        }
        Ok(times)
    }

    fn insert(&self, appointment: &NewAppointment) -> DbResult<i64> {
        let now = chrono::Utc::now().to_rfc3339();

        self.execute(
            r#"
            INSERT INTO appointments (
                date, time, appointment_type_id, patient_id,
                is_approved, is_completed, is_canceled, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6, ?6)
            "#,
            params![
                date_to_sql(appointment.date),
                time_to_sql(appointment.time),
                appointment.legacy_type_id(),
                appointment.legacy_patient_id(),
                appointment.is_approved,
                now,
            ],
        )?;
        let id = self.last_insert_rowid();

        for type_id in &appointment.type_ids {
            self.execute(
                "INSERT OR IGNORE INTO appointment_type_links (appointment_id, appointment_type_id) VALUES (?1, ?2)",
                params![id, type_id],
            )?;
        }

        for patient in &appointment.patients {
            self.execute(
                "INSERT INTO appointment_patients (appointment_id, patient_id, slot_time) VALUES (?1, ?2, ?3)",
                params![id, patient.patient_id, time_to_sql(patient.time)],
            )?;
        }

        Ok(id)
    }

    fn update_date_time(&self, id: i64, date: NaiveDate, time: NaiveTime) -> DbResult<bool> {
        let Some(current) = self.get_appointment(id)? else {
            return Ok(false);
        };
        let patients = current.rescheduled_patients(time).ok_or_else(|| {
            DbError::Constraint(format!("Moving appointment {} to {} crosses midnight", id, time))
        })?;

        let rows_affected = self.execute(
            "UPDATE appointments SET date = ?2, time = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, date_to_sql(date), time_to_sql(time), chrono::Utc::now().to_rfc3339()],
        )?;
        for patient in &patients {
            self.execute(
                "UPDATE appointment_patients SET slot_time = ?3 WHERE appointment_id = ?1 AND patient_id = ?2",
                params![id, patient.patient_id, time_to_sql(patient.time)],
            )?;
        }
        Ok(rows_affected > 0)
    }

    fn set_approved(&self, id: i64) -> DbResult<bool> {
        set_flag(self, id, "is_approved")
    }

    fn get_appointment(&self, id: i64) -> DbResult<Option<Appointment>> {
        let row = self
            .query_row(
                r#"
                SELECT id, date, time, appointment_type_id, patient_id,
                       is_approved, is_completed, is_canceled, created_at, updated_at
                FROM appointments
                WHERE id = ?
                "#,
                [id],
                |row| {
                    Ok(AppointmentRow {
                        id: row.get(0)?,
                        date: row.get(1)?,
                        time: row.get(2)?,
                        appointment_type_id: row.get(3)?,
                        patient_id: row.get(4)?,
                        is_approved: row.get(5)?,
                        is_completed: row.get(6)?,
                        is_canceled: row.get(7)?,
                        created_at: row.get(8)?,
                        updated_at: row.get(9)?,
                    })
                },
            )
            .optional()?;

        row.map(|row| load_appointment(self, row)).transpose()
    }
}

impl AppointmentStore for Database {
    fn count_non_canceled(
        &self,
        date: NaiveDate,
        type_id: i64,
        exclude_id: Option<i64>,
    ) -> DbResult<u32> {
        self.conn.count_non_canceled(date, type_id, exclude_id)
    }

    fn count_non_canceled_on(&self, date: NaiveDate, exclude_id: Option<i64>) -> DbResult<u32> {
        self.conn.count_non_canceled_on(date, exclude_id)
    }

    fn exists_at(&self, date: NaiveDate, time: NaiveTime, exclude_id: Option<i64>) -> DbResult<bool> {
        self.conn.exists_at(date, time, exclude_id)
    }

    fn times_booked(&self, date: NaiveDate, exclude_id: Option<i64>) -> DbResult<Vec<NaiveTime>> {
        self.conn.times_booked(date, exclude_id)
    }

    fn insert(&self, appointment: &NewAppointment) -> DbResult<i64> {
        self.conn.insert(appointment)
    }

    fn update_date_time(&self, id: i64, date: NaiveDate, time: NaiveTime) -> DbResult<bool> {
        self.conn.update_date_time(id, date, time)
    }

    fn set_approved(&self, id: i64) -> DbResult<bool> {
        self.conn.set_approved(id)
    }

    fn get_appointment(&self, id: i64) -> DbResult<Option<Appointment>> {
        self.conn.get_appointment(id)
    }
}

impl Database {
    /// All appointments on a date, canceled ones included, ordered by time.
    pub fn list_appointments_on(&self, date: NaiveDate) -> DbResult<Vec<Appointment>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM appointments WHERE date = ? ORDER BY time, id")?;
        let ids = stmt
            .query_map([date_to_sql(date)], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut appointments = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(appointment) = self.conn.get_appointment(id)? {
                appointments.push(appointment);
            }
        }
        Ok(appointments)
    }

    /// Mark an appointment completed (after a prescription is issued).
    pub fn mark_appointment_completed(&self, id: i64) -> DbResult<bool> {
        set_flag(&self.conn, id, "is_completed")
    }

    /// Logically delete an appointment.
    pub fn cancel_appointment(&self, id: i64) -> DbResult<bool> {
        set_flag(&self.conn, id, "is_canceled")
    }
}

fn set_flag(conn: &Connection, id: i64, column: &'static str) -> DbResult<bool> {
    let sql = format!(
        "UPDATE appointments SET {} = 1, updated_at = ?2 WHERE id = ?1",
        column
    );
    let rows_affected = conn.execute(&sql, params![id, chrono::Utc::now().to_rfc3339()])?;
    Ok(rows_affected > 0)
}

/// Intermediate row struct for database mapping.
struct AppointmentRow {
    id: i64,
    date: String,
    time: String,
    appointment_type_id: Option<i64>,
    patient_id: Option<i64>,
    is_approved: bool,
    is_completed: bool,
    is_canceled: bool,
    created_at: String,
    updated_at: String,
}

fn load_appointment(conn: &Connection, row: AppointmentRow) -> DbResult<Appointment> {
    let date = date_from_sql(&row.date)?;
    let time = time_from_sql(&row.time)?;

    let mut type_ids: BTreeSet<i64> = {
        let mut stmt = conn.prepare(
            "SELECT appointment_type_id FROM appointment_type_links WHERE appointment_id = ?",
        )?;
        let ids = stmt
            .query_map([row.id], |r| r.get::<_, i64>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        ids
    };
    // Rows written before type links existed only carry the legacy column
    if let Some(legacy) = row.appointment_type_id {
        type_ids.insert(legacy);
    }

    let mut patients = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT patient_id, slot_time FROM appointment_patients WHERE appointment_id = ? ORDER BY rowid",
        )?;
        let rows = stmt.query_map([row.id], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
        })?;
        for link in rows {
            let (patient_id, slot_time) = link?;
            patients.push(AttachedPatient {
                patient_id,
                time: time_from_sql(&slot_time)?,
            });
        }
    }
    if patients.is_empty() {
        if let Some(patient_id) = row.patient_id {
            patients.push(AttachedPatient { patient_id, time });
        }
    }

    Ok(Appointment {
        id: row.id,
        date,
        time,
        type_ids,
        patients,
        is_approved: row.is_approved,
        is_completed: row.is_completed,
        is_canceled: row.is_canceled,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
