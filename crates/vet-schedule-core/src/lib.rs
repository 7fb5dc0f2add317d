//! Vet-Schedule Core Library
//!
//! Appointment slot generation and daily-capacity limits for a veterinary clinic.
//!
//! # Architecture
//!
//! ```text
//!                 ScheduleConfig (hours, lunch, slot, buffer, notice, limits)
//!                                         │
//!        ┌────────────────────────────────┼────────────────────────────────┐
//!        ▼                                ▼                                ▼
//!  Slot Generator ──► Constraint Filters ──► Booking Validator ──► Booking Composer
//!                                                  │                       │
//!                                                  └──────┐   ┌────────────┘
//!                                                         ▼   ▼
//!                                          [ one IMMEDIATE transaction ]
//!                                          count + check + insert rows
//!                                                         │
//!                                                 SQLite (appointments,
//!                                                 type links, pet links)
//! ```
//!
//! # Core Principle
//!
//! **A daily limit is checked and consumed in the same transaction.** Two
//! concurrent submissions can never both take the last slot of a type.
//!
//! # Modules
//!
//! - [`config`]: Scheduling rules, loaded from the environment
//! - [`db`]: SQLite appointment store and type registry
//! - [`models`]: Domain types (Appointment, AppointmentType, etc.)
//! - [`schedule`]: Slot generator, filters, validator and booking composer

pub mod config;
pub mod db;
pub mod models;
pub mod schedule;

// Re-export commonly used types
pub use config::{ConfigError, ScheduleConfig, TypeLimits};
pub use db::{AppointmentStore, Database, DbError, TypeRegistry};
pub use models::{Appointment, AppointmentStatus, AppointmentType, AttachedPatient, NewAppointment};
pub use schedule::{
    BookingRejection, BookingRequest, BookingSource, BookingValidator, LimitViolation,
    ScheduleError, Scheduler, SlotListing,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum VetScheduleError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// JSON-encoded [`BookingRejection`], tagged by `code`
    #[error("Booking rejected: {0}")]
    Rejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<DbError> for VetScheduleError {
    fn from(e: DbError) -> Self {
        VetScheduleError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for VetScheduleError {
    fn from(e: serde_json::Error) -> Self {
        VetScheduleError::SerializationError(e.to_string())
    }
}

impl From<ConfigError> for VetScheduleError {
    fn from(e: ConfigError) -> Self {
        VetScheduleError::InvalidInput(e.to_string())
    }
}

impl From<ScheduleError> for VetScheduleError {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::Database(db) => db.into(),
            ScheduleError::Rejected(rejection) => match serde_json::to_string(&rejection) {
                Ok(json) => VetScheduleError::Rejected(json),
                Err(err) => err.into(),
            },
            ScheduleError::UnknownAppointmentType(name) => {
                VetScheduleError::NotFound(format!("appointment type {}", name))
            }
            ScheduleError::NotFound(id) => VetScheduleError::NotFound(format!("appointment {}", id)),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for VetScheduleError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        VetScheduleError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path, with rules from the environment.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<VetScheduleCore>, VetScheduleError> {
    let config = ScheduleConfig::from_env()?;
    let db = Database::open(&path)?;
    Ok(Arc::new(VetScheduleCore::new(db, config)))
}

/// Create an in-memory database with default rules (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<VetScheduleCore>, VetScheduleError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(VetScheduleCore::new(db, ScheduleConfig::default())))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe scheduler wrapper for FFI.
#[derive(uniffi::Object)]
pub struct VetScheduleCore {
    db: Arc<Mutex<Database>>,
    scheduler: Scheduler,
}

impl VetScheduleCore {
    fn new(db: Database, config: ScheduleConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            scheduler: Scheduler::new(config),
        }
    }
}

#[uniffi::export]
impl VetScheduleCore {
    // =========================================================================
    // Appointment Type Operations
    // =========================================================================

    /// Register an appointment type.
    pub fn create_appointment_type(
        &self,
        name: String,
    ) -> Result<FfiAppointmentType, VetScheduleError> {
        let db = self.db.lock()?;
        let created = db.insert_appointment_type(&name)?;
        Ok(self.type_record(created))
    }

    /// List appointment types with their configured daily limits.
    pub fn list_appointment_types(&self) -> Result<Vec<FfiAppointmentType>, VetScheduleError> {
        let db = self.db.lock()?;
        let types = db.list_appointment_types()?;
        Ok(types.into_iter().map(|t| self.type_record(t)).collect())
    }

    // =========================================================================
    // Slot Operations
    // =========================================================================

    /// Available and disabled slots for a `YYYY-MM-DD` date.
    pub fn available_slots(&self, date: String) -> Result<FfiSlotListing, VetScheduleError> {
        let date = parse_date(&date)?;
        let db = self.db.lock()?;
        let listing = self.scheduler.available_slots(&*db, date)?;
        Ok(listing.into())
    }

    // =========================================================================
    // Booking Operations
    // =========================================================================

    /// Book one submission. Returns one appointment per appointment type.
    pub fn book_appointments(
        &self,
        request: FfiBookingRequest,
    ) -> Result<Vec<FfiAppointment>, VetScheduleError> {
        let request = BookingRequest::try_from(request)?;
        let mut db = self.db.lock()?;
        let created = self.scheduler.book(&mut db, &request, local_now())?;
        Ok(created.into_iter().map(Into::into).collect())
    }

    /// Approve an appointment, optionally moving it to a new date and time.
    pub fn approve_appointment(
        &self,
        id: i64,
        new_date: Option<String>,
        new_time: Option<String>,
    ) -> Result<FfiAppointment, VetScheduleError> {
        let reschedule = match (new_date, new_time) {
            (Some(date), Some(time)) => Some((parse_date(&date)?, parse_time(&time)?)),
            (None, None) => None,
            _ => {
                return Err(VetScheduleError::InvalidInput(
                    "reschedule needs both a date and a time".into(),
                ))
            }
        };
        let mut db = self.db.lock()?;
        let approved = self.scheduler.approve(&mut db, id, reschedule, local_now())?;
        Ok(approved.into())
    }

    /// Mark an appointment completed.
    pub fn complete_appointment(&self, id: i64) -> Result<FfiAppointment, VetScheduleError> {
        let db = self.db.lock()?;
        Ok(self.scheduler.complete(&db, id)?.into())
    }

    /// Cancel an appointment.
    pub fn cancel_appointment(&self, id: i64) -> Result<FfiAppointment, VetScheduleError> {
        let db = self.db.lock()?;
        Ok(self.scheduler.cancel(&db, id)?.into())
    }

    /// Get an appointment by ID.
    pub fn get_appointment(&self, id: i64) -> Result<Option<FfiAppointment>, VetScheduleError> {
        let db = self.db.lock()?;
        let appointment = db.get_appointment(id)?;
        Ok(appointment.map(Into::into))
    }
}

impl VetScheduleCore {
    fn type_record(&self, appointment_type: AppointmentType) -> FfiAppointmentType {
        let daily_limit = appointment_type.daily_limit(&self.scheduler.config().type_limits);
        FfiAppointmentType {
            id: appointment_type.id,
            name: appointment_type.name,
            daily_limit,
        }
    }
}

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

fn parse_date(s: &str) -> Result<NaiveDate, VetScheduleError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| VetScheduleError::InvalidInput(format!("invalid date: {}", s)))
}

fn parse_time(s: &str) -> Result<chrono::NaiveTime, VetScheduleError> {
    schedule::parse_slot(s).ok_or_else(|| VetScheduleError::InvalidInput(format!("invalid time: {}", s)))
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe appointment type.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointmentType {
    pub id: i64,
    pub name: String,
    pub daily_limit: u32,
}

/// FFI-safe slot listing (12-hour labels).
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSlotListing {
    pub date: String,
    pub available: Vec<String>,
    pub disabled: Vec<String>,
}

impl From<SlotListing> for FfiSlotListing {
    fn from(listing: SlotListing) -> Self {
        Self {
            date: listing.date.format("%Y-%m-%d").to_string(),
            available: listing.available_labels(),
            disabled: listing.disabled_labels(),
        }
    }
}

/// FFI-safe booking submission.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBookingRequest {
    pub date: String,
    pub patient_ids: Vec<i64>,
    /// One time per patient, `"10:30 AM"` or `"10:30"`
    pub times: Vec<String>,
    /// Type IDs or names
    pub appointment_types: Vec<String>,
    /// Staff bookings are approved on creation
    pub created_by_staff: bool,
}

impl TryFrom<FfiBookingRequest> for BookingRequest {
    type Error = VetScheduleError;

    fn try_from(req: FfiBookingRequest) -> Result<Self, Self::Error> {
        let times = req
            .times
            .iter()
            .map(|t| parse_time(t))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BookingRequest {
            date: parse_date(&req.date)?,
            patient_ids: req.patient_ids,
            times,
            appointment_types: req.appointment_types,
            source: if req.created_by_staff {
                BookingSource::Staff
            } else {
                BookingSource::Client
            },
        })
    }
}

/// FFI-safe appointment, including the legacy single-valued view.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointment {
    pub id: i64,
    pub date: String,
    pub time: String,
    pub type_ids: Vec<i64>,
    pub patient_ids: Vec<i64>,
    pub patient_times: Vec<String>,
    pub type_id: Option<i64>,
    pub patient_id: Option<i64>,
    pub status: String,
    pub is_approved: bool,
    pub is_completed: bool,
    pub is_canceled: bool,
    pub created_at: String,
}

impl From<Appointment> for FfiAppointment {
    fn from(appt: Appointment) -> Self {
        Self {
            id: appt.id,
            date: appt.date.format("%Y-%m-%d").to_string(),
            time: schedule::format_slot(appt.time),
            type_ids: appt.type_ids.iter().copied().collect(),
            patient_ids: appt.patient_ids(),
            patient_times: appt
                .patients
                .iter()
                .map(|p| schedule::format_slot(p.time))
                .collect(),
            type_id: appt.legacy_type_id(),
            patient_id: appt.legacy_patient_id(),
            status: format!("{:?}", appt.status()),
            is_approved: appt.is_approved,
            is_completed: appt.is_completed,
            is_canceled: appt.is_canceled,
            created_at: appt.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tomorrow() -> String {
        (chrono::Local::now().date_naive() + chrono::Duration::days(1))
            .format("%Y-%m-%d")
            .to_string()
    }

    #[test]
    fn test_ffi_booking_flow() {
        let core = open_database_in_memory().unwrap();
        let ty = core.create_appointment_type("Vaccination".into()).unwrap();
        assert_eq!(ty.daily_limit, 40);

        let created = core
            .book_appointments(FfiBookingRequest {
                date: tomorrow(),
                patient_ids: vec![3, 4],
                times: vec!["10:00 AM".into(), "10:30".into()],
                appointment_types: vec!["vaccination".into()],
                created_by_staff: false,
            })
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].type_id, Some(ty.id));
        assert_eq!(created[0].patient_id, Some(3));
        assert_eq!(created[0].patient_times, vec!["10:00 AM", "10:30 AM"]);
        assert_eq!(created[0].status, "Pending");

        let approved = core.approve_appointment(created[0].id, None, None).unwrap();
        assert!(approved.is_approved);

        let listing = core.available_slots(tomorrow()).unwrap();
        assert!(listing.disabled.contains(&"10:00 AM".to_string()));
        assert!(listing.disabled.contains(&"10:30 AM".to_string()));
    }

    #[test]
    fn test_ffi_rejection_is_json() {
        let core = open_database_in_memory().unwrap();
        core.create_appointment_type("Vaccination".into()).unwrap();

        let err = core
            .book_appointments(FfiBookingRequest {
                date: tomorrow(),
                patient_ids: vec![3, 4],
                times: vec!["10:00 AM".into()],
                appointment_types: vec!["Vaccination".into()],
                created_by_staff: true,
            })
            .unwrap_err();

        match err {
            VetScheduleError::Rejected(json) => {
                let value: serde_json::Value = serde_json::from_str(&json).unwrap();
                assert_eq!(value["code"], "slot_count_mismatch");
                assert_eq!(value["patients"], 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ffi_input_errors() {
        let core = open_database_in_memory().unwrap();
        assert!(matches!(
            core.available_slots("June 1st".into()),
            Err(VetScheduleError::InvalidInput(_))
        ));
        assert!(matches!(
            core.approve_appointment(1, Some(tomorrow()), None),
            Err(VetScheduleError::InvalidInput(_))
        ));
        assert!(matches!(
            core.cancel_appointment(77),
            Err(VetScheduleError::NotFound(_))
        ));
    }
}
