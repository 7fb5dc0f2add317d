//! Appointment slot and daily-limit engine.
//!
//! Pipeline: Slot Generator → Constraint Filters → Booking Validator → Composer

mod slots;
mod validator;
mod composer;

pub use slots::*;
pub use validator::*;
pub use composer::*;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ScheduleConfig;
use crate::db::{AppointmentStore, Database, DbError, DbResult, TypeRegistry};
use crate::models::{Appointment, AppointmentType};

/// Shortfall for one appointment type on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitViolation {
    pub type_id: i64,
    pub type_name: String,
    pub current: u32,
    pub limit: u32,
    pub remaining: u32,
    pub requested: u32,
}

/// Why a booking was refused. These are expected outcomes, not faults.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum BookingRejection {
    #[error("Appointments must be booked at least {required_hours} hours ahead (earliest {earliest})")]
    InsufficientNotice {
        required_hours: u32,
        earliest: NaiveDateTime,
    },

    #[error("{time} is outside working hours ({start} to {end})")]
    OutsideWorkingHours {
        time: NaiveTime,
        start: NaiveTime,
        end: NaiveTime,
    },

    #[error("{time} is not on a {slot_minutes}-minute slot boundary")]
    OffSlotBoundary { time: NaiveTime, slot_minutes: u32 },

    #[error("{time} falls within the lunch break ({start} to {end})")]
    DuringLunchBreak {
        time: NaiveTime,
        start: NaiveTime,
        end: NaiveTime,
    },

    #[error("{time} on {date} is already booked")]
    SlotAlreadyBooked { date: NaiveDate, time: NaiveTime },

    #[error("{time} is within {buffer_minutes} minutes of the booking at {conflicting}")]
    BufferViolation {
        time: NaiveTime,
        conflicting: NaiveTime,
        buffer_minutes: u32,
    },

    #[error("Daily limit reached on {date}: {}", describe_violations(.violations))]
    DailyLimitExceeded {
        date: NaiveDate,
        violations: Vec<LimitViolation>,
    },

    #[error("{times} time slots supplied for {patients} patients")]
    SlotCountMismatch { patients: usize, times: usize },

    #[error("A booking needs at least one patient and one appointment type")]
    EmptySubmission,

    #[error("Patient {patient_id} appears more than once")]
    DuplicatePatient { patient_id: i64 },

    #[error("Appointment {id} is canceled")]
    AppointmentCanceled { id: i64 },
}

fn describe_violations(violations: &[LimitViolation]) -> String {
    violations
        .iter()
        .map(|v| {
            format!(
                "{} ({}/{} booked, {} remaining, {} requested)",
                v.type_name, v.current, v.limit, v.remaining, v.requested
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Scheduling errors.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Booking rejected: {0}")]
    Rejected(#[from] BookingRejection),

    #[error("Unknown appointment type: {0}")]
    UnknownAppointmentType(String),

    #[error("Appointment not found: {0}")]
    NotFound(i64),
}

impl ScheduleError {
    /// The rejection, when this error is a rule violation rather than a fault.
    pub fn rejection(&self) -> Option<&BookingRejection> {
        match self {
            ScheduleError::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Entry point that ties configuration, validation and persistence together.
pub struct Scheduler {
    config: ScheduleConfig,
}

impl Scheduler {
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn validator(&self) -> BookingValidator<'_> {
        BookingValidator::new(&self.config)
    }

    /// Slots to offer for a date.
    ///
    /// Lunch slots are dropped. Booked slots, slots inside another booking's
    /// buffer, and every slot once the day's overall count reaches
    /// `max_appointments_per_day` are listed as disabled. This listing uses the
    /// type-agnostic total; booking applies the per-type limits.
    pub fn available_slots<S: AppointmentStore + ?Sized>(
        &self,
        store: &S,
        date: NaiveDate,
    ) -> DbResult<SlotListing> {
        let config = &self.config;
        let booked = store.times_booked(date, None)?;
        let total = store.count_non_canceled_on(date, None)?;
        let day_full = total >= config.max_appointments_per_day;

        let mut available = Vec::new();
        let mut disabled = Vec::new();

        for slot in generate_slots(config) {
            if !within_working_hours(config, slot) || during_lunch_break(config, slot) {
                continue;
            }
            let taken = booked.contains(&slot);
            let too_close = buffer_conflict(config, slot, &booked).is_some();
            if taken || too_close || day_full {
                disabled.push(slot);
            } else {
                available.push(slot);
            }
        }

        debug!(
            %date,
            available = available.len(),
            disabled = disabled.len(),
            day_full,
            "computed slot listing"
        );

        Ok(SlotListing {
            date,
            available,
            disabled,
        })
    }

    /// Validate and persist one submission atomically.
    ///
    /// Every (pet, time) pairing and every type's capacity is checked inside
    /// the same immediate transaction as the inserts. Pairings are also checked
    /// against the ones before them in the submission. Nothing is written
    /// unless the whole submission passes.
    pub fn book(
        &self,
        db: &mut Database,
        request: &BookingRequest,
        now: NaiveDateTime,
    ) -> ScheduleResult<Vec<Appointment>> {
        let result = self.book_in_transaction(db, request, now);
        match &result {
            Ok(created) => info!(
                date = %request.date,
                pets = request.patient_ids.len(),
                records = created.len(),
                source = ?request.source,
                "booked appointments"
            ),
            Err(ScheduleError::Rejected(rejection)) => {
                info!(date = %request.date, %rejection, "booking rejected")
            }
            Err(e) => warn!(date = %request.date, error = %e, "booking failed"),
        }
        result
    }

    fn book_in_transaction(
        &self,
        db: &mut Database,
        request: &BookingRequest,
        now: NaiveDateTime,
    ) -> ScheduleResult<Vec<Appointment>> {
        request.check_shape()?;

        let validator = self.validator();
        let tx = db.immediate_transaction()?;

        let types = resolve_types(&*tx, &request.appointment_types)?;

        let mut accepted = Vec::new();
        for (patient_id, time) in request.pairings() {
            debug!(patient_id, %time, "validating pairing");
            validator.validate_slot(&*tx, request.date, time, now, None)?;
            validator.validate_against_pending(request.date, time, &accepted)?;
            accepted.push(time);
        }

        validator.check_daily_limits(&*tx, request.date, &types, request.pet_count(), None)?;

        let mut created = Vec::new();
        for planned in plan_appointments(request, &types) {
            let id = tx.insert(&planned)?;
            let appointment = tx.get_appointment(id)?.ok_or(ScheduleError::NotFound(id))?;
            created.push(appointment);
        }

        tx.commit().map_err(DbError::from)?;
        Ok(created)
    }

    /// Approve an appointment, optionally moving it first.
    ///
    /// A move shifts every pet by the same offset as the record time. Each
    /// resulting slot re-runs the slot checks, and the limits are re-checked,
    /// with the appointment itself excluded from every count.
    pub fn approve(
        &self,
        db: &mut Database,
        id: i64,
        reschedule: Option<(NaiveDate, NaiveTime)>,
        now: NaiveDateTime,
    ) -> ScheduleResult<Appointment> {
        let validator = self.validator();
        let tx = db.immediate_transaction()?;

        let current = tx.get_appointment(id)?.ok_or(ScheduleError::NotFound(id))?;
        if !current.is_active() {
            return Err(BookingRejection::AppointmentCanceled { id }.into());
        }

        if let Some((date, time)) = reschedule {
            let moved = current.rescheduled_patients(time).ok_or(
                BookingRejection::OutsideWorkingHours {
                    time,
                    start: self.config.working_hours_start,
                    end: self.config.working_hours_end,
                },
            )?;

            let mut slots = vec![time];
            for patient in &moved {
                if !slots.contains(&patient.time) {
                    slots.push(patient.time);
                }
            }

            let mut accepted = Vec::new();
            for slot in slots {
                validator.validate_slot(&*tx, date, slot, now, Some(id))?;
                validator.validate_against_pending(date, slot, &accepted)?;
                accepted.push(slot);
            }

            let types = current
                .type_ids
                .iter()
                .map(|&type_id| {
                    tx.get_appointment_type(type_id)?
                        .ok_or_else(|| ScheduleError::UnknownAppointmentType(type_id.to_string()))
                })
                .collect::<ScheduleResult<Vec<AppointmentType>>>()?;
            validator.check_daily_limits(&*tx, date, &types, 1, Some(id))?;

            tx.update_date_time(id, date, time)?;
            info!(id, from = %current.date, to = %date, %time, "rescheduled appointment");
        }

        tx.set_approved(id)?;
        let updated = tx.get_appointment(id)?.ok_or(ScheduleError::NotFound(id))?;
        tx.commit().map_err(DbError::from)?;

        info!(id, "approved appointment");
        Ok(updated)
    }

    /// Mark an appointment completed once its prescription is issued.
    pub fn complete(&self, db: &Database, id: i64) -> ScheduleResult<Appointment> {
        let current = db.get_appointment(id)?.ok_or(ScheduleError::NotFound(id))?;
        if !current.is_active() {
            return Err(BookingRejection::AppointmentCanceled { id }.into());
        }

        db.mark_appointment_completed(id)?;
        info!(id, "completed appointment");
        db.get_appointment(id)?.ok_or(ScheduleError::NotFound(id))
    }

    /// Logically delete an appointment. Canceling twice is a no-op.
    pub fn cancel(&self, db: &Database, id: i64) -> ScheduleResult<Appointment> {
        let current = db.get_appointment(id)?.ok_or(ScheduleError::NotFound(id))?;
        if !current.is_active() {
            return Ok(current);
        }

        db.cancel_appointment(id)?;
        info!(id, date = %current.date, "canceled appointment");
        db.get_appointment(id)?.ok_or(ScheduleError::NotFound(id))
    }
}
