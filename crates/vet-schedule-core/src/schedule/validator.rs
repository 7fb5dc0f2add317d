//! Booking validation against clinic rules and current bookings.
//!
//! The validator only reads. Callers that act on a passing result must keep
//! the check and the write inside one immediate transaction.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::slots::{
    buffer_conflict, during_lunch_break, earliest_bookable, meets_minimum_notice,
    on_slot_boundary, within_working_hours,
};
use super::{BookingRejection, LimitViolation, ScheduleResult};
use crate::config::ScheduleConfig;
use crate::db::{AppointmentStore, DbResult};
use crate::models::AppointmentType;

/// Checks a proposed booking against [`ScheduleConfig`] and an [`AppointmentStore`].
pub struct BookingValidator<'a> {
    config: &'a ScheduleConfig,
}

impl<'a> BookingValidator<'a> {
    pub fn new(config: &'a ScheduleConfig) -> Self {
        Self { config }
    }

    /// Validate one (date, time) pairing, failing on the first broken rule.
    ///
    /// Order: notice, working hours, slot boundary, lunch break, exact
    /// collision, buffer. `exclude_id` ignores an appointment being moved.
    pub fn validate_slot<S: AppointmentStore + ?Sized>(
        &self,
        store: &S,
        date: NaiveDate,
        time: NaiveTime,
        now: NaiveDateTime,
        exclude_id: Option<i64>,
    ) -> ScheduleResult<()> {
        let config = self.config;

        if !meets_minimum_notice(config, date, time, now) {
            return Err(BookingRejection::InsufficientNotice {
                required_hours: config.minimum_notice_hours,
                earliest: earliest_bookable(config, now),
            }
            .into());
        }

        if !within_working_hours(config, time) {
            return Err(BookingRejection::OutsideWorkingHours {
                time,
                start: config.working_hours_start,
                end: config.working_hours_end,
            }
            .into());
        }

        if !on_slot_boundary(config, time) {
            return Err(BookingRejection::OffSlotBoundary {
                time,
                slot_minutes: config.slot_duration_minutes,
            }
            .into());
        }

        if during_lunch_break(config, time) {
            return Err(BookingRejection::DuringLunchBreak {
                time,
                start: config.lunch_break_start,
                end: config.lunch_break_end,
            }
            .into());
        }

        if store.exists_at(date, time, exclude_id)? {
            return Err(BookingRejection::SlotAlreadyBooked { date, time }.into());
        }

        let booked = store.times_booked(date, exclude_id)?;
        if let Some(conflicting) = buffer_conflict(config, time, &booked) {
            return Err(BookingRejection::BufferViolation {
                time,
                conflicting,
                buffer_minutes: config.buffer_time_minutes,
            }
            .into());
        }

        Ok(())
    }

    /// Check a time against slots already accepted earlier in the same request.
    pub fn validate_against_pending(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        pending: &[NaiveTime],
    ) -> Result<(), BookingRejection> {
        if pending.contains(&time) {
            return Err(BookingRejection::SlotAlreadyBooked { date, time });
        }
        if let Some(conflicting) = buffer_conflict(self.config, time, pending) {
            return Err(BookingRejection::BufferViolation {
                time,
                conflicting,
                buffer_minutes: self.config.buffer_time_minutes,
            });
        }
        Ok(())
    }

    /// Current usage and configured limit for a type on a date.
    pub fn capacity<S: AppointmentStore + ?Sized>(
        &self,
        store: &S,
        date: NaiveDate,
        appointment_type: &AppointmentType,
        exclude_id: Option<i64>,
    ) -> DbResult<TypeCapacity> {
        Ok(TypeCapacity {
            current: store.count_non_canceled(date, appointment_type.id, exclude_id)?,
            limit: appointment_type.daily_limit(&self.config.type_limits),
        })
    }

    /// Require `requested` more appointments of every type to fit on `date`.
    ///
    /// All types are checked before failing so every shortfall is reported.
    pub fn check_daily_limits<S: AppointmentStore + ?Sized>(
        &self,
        store: &S,
        date: NaiveDate,
        types: &[AppointmentType],
        requested: u32,
        exclude_id: Option<i64>,
    ) -> ScheduleResult<()> {
        let mut violations = Vec::new();

        for appointment_type in types {
            let capacity = self.capacity(store, date, appointment_type, exclude_id)?;
            if capacity.remaining() < requested {
                violations.push(LimitViolation {
                    type_id: appointment_type.id,
                    type_name: appointment_type.name.clone(),
                    current: capacity.current,
                    limit: capacity.limit,
                    remaining: capacity.remaining(),
                    requested,
                });
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(BookingRejection::DailyLimitExceeded { date, violations }.into())
        }
    }
}

/// Non-canceled count against the configured limit for one type and date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeCapacity {
    pub current: u32,
    pub limit: u32,
}

impl TypeCapacity {
    /// `max(0, limit - current)`
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TypeLimits;
    use crate::db::{Database, TypeRegistry};
    use crate::models::{AttachedPatient, NewAppointment};
    use crate::schedule::ScheduleError;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn long_ago() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_time(at(0, 0))
    }

    fn book(db: &Database, type_id: i64, time: NaiveTime) -> i64 {
        db.insert(&NewAppointment {
            date: day(),
            time,
            type_ids: vec![type_id],
            patients: vec![AttachedPatient { patient_id: 1, time }],
            is_approved: true,
        })
        .unwrap()
    }

    fn rejection(result: ScheduleResult<()>) -> BookingRejection {
        match result {
            Err(ScheduleError::Rejected(r)) => r,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_checks_run_in_order() {
        let config = ScheduleConfig::default();
        let validator = BookingValidator::new(&config);
        let db = Database::open_in_memory().unwrap();

        // Too soon wins over being outside working hours
        let now = day().and_time(at(7, 0));
        let r = rejection(validator.validate_slot(&db, day(), at(8, 0), now, None));
        assert!(matches!(r, BookingRejection::InsufficientNotice { required_hours: 2, .. }));

        let r = rejection(validator.validate_slot(&db, day(), at(17, 0), long_ago(), None));
        assert!(matches!(r, BookingRejection::OutsideWorkingHours { .. }));

        let r = rejection(validator.validate_slot(&db, day(), at(10, 10), long_ago(), None));
        assert!(matches!(r, BookingRejection::OffSlotBoundary { slot_minutes: 30, .. }));

        let r = rejection(validator.validate_slot(&db, day(), at(12, 30), long_ago(), None));
        assert!(matches!(r, BookingRejection::DuringLunchBreak { .. }));

        assert!(validator
            .validate_slot(&db, day(), at(13, 0), long_ago(), None)
            .is_ok());
    }

    #[test]
    fn test_exact_collision_and_self_exclusion() {
        let config = ScheduleConfig::default();
        let validator = BookingValidator::new(&config);
        let db = Database::open_in_memory().unwrap();
        let ty = db.insert_appointment_type("Vaccination").unwrap();
        let id = book(&db, ty.id, at(10, 0));

        let r = rejection(validator.validate_slot(&db, day(), at(10, 0), long_ago(), None));
        assert_eq!(r, BookingRejection::SlotAlreadyBooked { date: day(), time: at(10, 0) });

        assert!(validator
            .validate_slot(&db, day(), at(10, 0), long_ago(), Some(id))
            .is_ok());
    }

    #[test]
    fn test_canceled_booking_frees_slot() {
        let config = ScheduleConfig::default();
        let validator = BookingValidator::new(&config);
        let db = Database::open_in_memory().unwrap();
        let ty = db.insert_appointment_type("Vaccination").unwrap();
        let id = book(&db, ty.id, at(10, 0));
        db.cancel_appointment(id).unwrap();

        assert!(validator
            .validate_slot(&db, day(), at(10, 0), long_ago(), None)
            .is_ok());
    }

    #[test]
    fn test_buffer_scenario() {
        let config = ScheduleConfig {
            slot_duration_minutes: 5,
            buffer_time_minutes: 15,
            ..ScheduleConfig::default()
        };
        let validator = BookingValidator::new(&config);
        let db = Database::open_in_memory().unwrap();
        let ty = db.insert_appointment_type("Check-up").unwrap();
        book(&db, ty.id, at(10, 0));

        let r = rejection(validator.validate_slot(&db, day(), at(10, 10), long_ago(), None));
        assert_eq!(
            r,
            BookingRejection::BufferViolation {
                time: at(10, 10),
                conflicting: at(10, 0),
                buffer_minutes: 15,
            }
        );
        assert!(validator
            .validate_slot(&db, day(), at(10, 15), long_ago(), None)
            .is_ok());
        assert!(validator
            .validate_slot(&db, day(), at(9, 45), long_ago(), None)
            .is_ok());
    }

    #[test]
    fn test_daily_limit_boundary() {
        let mut limits = TypeLimits::with_default(10);
        limits.set("vaccination", 3);
        let config = ScheduleConfig {
            buffer_time_minutes: 0,
            type_limits: limits,
            ..ScheduleConfig::default()
        };
        let validator = BookingValidator::new(&config);
        let db = Database::open_in_memory().unwrap();
        let ty = db.insert_appointment_type("Vaccination").unwrap();

        book(&db, ty.id, at(9, 0));
        book(&db, ty.id, at(9, 30));

        // count == limit - 1: one more fits exactly
        assert!(validator
            .check_daily_limits(&db, day(), std::slice::from_ref(&ty), 1, None)
            .is_ok());
        let capacity = validator.capacity(&db, day(), &ty, None).unwrap();
        assert_eq!(capacity, TypeCapacity { current: 2, limit: 3 });
        assert_eq!(capacity.remaining(), 1);

        book(&db, ty.id, at(10, 0));

        // count == limit
        let r = rejection(validator.check_daily_limits(&db, day(), std::slice::from_ref(&ty), 1, None));
        match r {
            BookingRejection::DailyLimitExceeded { violations, .. } => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].current, 3);
                assert_eq!(violations[0].limit, 3);
                assert_eq!(violations[0].remaining, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_daily_limit_reports_every_type() {
        let mut limits = TypeLimits::with_default(1);
        limits.set("vaccination", 5);
        let config = ScheduleConfig {
            buffer_time_minutes: 0,
            type_limits: limits,
            ..ScheduleConfig::default()
        };
        let validator = BookingValidator::new(&config);
        let db = Database::open_in_memory().unwrap();
        let vaccination = db.insert_appointment_type("Vaccination").unwrap();
        let checkup = db.insert_appointment_type("Check-up").unwrap();
        let grooming = db.insert_appointment_type("Grooming").unwrap();
        book(&db, checkup.id, at(9, 0));
        book(&db, grooming.id, at(9, 30));

        let types = vec![vaccination, checkup.clone(), grooming.clone()];
        let r = rejection(validator.check_daily_limits(&db, day(), &types, 2, None));
        match r {
            BookingRejection::DailyLimitExceeded { violations, .. } => {
                let names: Vec<&str> = violations.iter().map(|v| v.type_name.as_str()).collect();
                assert_eq!(names, vec!["Check-up", "Grooming"]);
                assert!(violations.iter().all(|v| v.requested == 2 && v.remaining == 0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_daily_limit_excludes_by_id() {
        let mut limits = TypeLimits::with_default(10);
        limits.set("vaccination", 1);
        let config = ScheduleConfig {
            type_limits: limits,
            ..ScheduleConfig::default()
        };
        let validator = BookingValidator::new(&config);
        let db = Database::open_in_memory().unwrap();
        let ty = db.insert_appointment_type("Vaccination").unwrap();
        let id = book(&db, ty.id, at(9, 0));

        assert!(validator
            .check_daily_limits(&db, day(), std::slice::from_ref(&ty), 1, None)
            .is_err());
        assert!(validator
            .check_daily_limits(&db, day(), std::slice::from_ref(&ty), 1, Some(id))
            .is_ok());
    }

    #[test]
    fn test_pending_times_collide_and_buffer() {
        let config = ScheduleConfig {
            slot_duration_minutes: 5,
            buffer_time_minutes: 15,
            ..ScheduleConfig::default()
        };
        let validator = BookingValidator::new(&config);
        let pending = [at(10, 0)];

        assert_eq!(
            validator.validate_against_pending(day(), at(10, 0), &pending),
            Err(BookingRejection::SlotAlreadyBooked { date: day(), time: at(10, 0) })
        );
        assert_eq!(
            validator.validate_against_pending(day(), at(10, 5), &pending),
            Err(BookingRejection::BufferViolation {
                time: at(10, 5),
                conflicting: at(10, 0),
                buffer_minutes: 15,
            })
        );
        assert!(validator.validate_against_pending(day(), at(10, 15), &pending).is_ok());
        assert!(validator.validate_against_pending(day(), at(10, 0), &[]).is_ok());
    }
}
