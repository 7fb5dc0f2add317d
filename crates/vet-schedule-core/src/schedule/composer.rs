//! Turns one multi-pet, multi-type submission into appointment records.
//!
//! One record is created per distinct appointment type, and every selected
//! pet is attached to each of those records with its own slot time.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::{BookingRejection, ScheduleError, ScheduleResult};
use crate::db::TypeRegistry;
use crate::models::{AppointmentType, AttachedPatient, NewAppointment};

/// Who submitted the booking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BookingSource {
    /// Client self-service; needs staff approval
    Client,
    /// Created directly by staff; approved on creation
    Staff,
}

/// One booking submission: N pets, N times (one per pet), M types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingRequest {
    pub date: NaiveDate,
    pub patient_ids: Vec<i64>,
    /// `times[i]` is the slot for `patient_ids[i]`
    pub times: Vec<NaiveTime>,
    /// Appointment type IDs or names
    pub appointment_types: Vec<String>,
    pub source: BookingSource,
}

impl BookingRequest {
    /// Structural checks that need no store access.
    pub fn check_shape(&self) -> Result<(), BookingRejection> {
        if self.times.len() != self.patient_ids.len() {
            return Err(BookingRejection::SlotCountMismatch {
                patients: self.patient_ids.len(),
                times: self.times.len(),
            });
        }
        if self.patient_ids.is_empty() || self.appointment_types.is_empty() {
            return Err(BookingRejection::EmptySubmission);
        }

        let mut seen = HashSet::new();
        for &patient_id in &self.patient_ids {
            if !seen.insert(patient_id) {
                return Err(BookingRejection::DuplicatePatient { patient_id });
            }
        }
        Ok(())
    }

    /// (patient, time) pairs in submission order.
    pub fn pairings(&self) -> impl Iterator<Item = (i64, NaiveTime)> + '_ {
        self.patient_ids
            .iter()
            .copied()
            .zip(self.times.iter().copied())
    }

    pub fn pet_count(&self) -> u32 {
        self.patient_ids.len() as u32
    }
}

/// Resolve type references, dropping repeats of the same type.
pub fn resolve_types<R: TypeRegistry + ?Sized>(
    registry: &R,
    references: &[String],
) -> ScheduleResult<Vec<AppointmentType>> {
    let mut resolved: Vec<AppointmentType> = Vec::with_capacity(references.len());

    for reference in references {
        let found = registry
            .find_appointment_type(reference)?
            .ok_or_else(|| ScheduleError::UnknownAppointmentType(reference.clone()))?;
        if !resolved.iter().any(|t| t.id == found.id) {
            resolved.push(found);
        }
    }

    Ok(resolved)
}

/// Records to insert for a submission that already passed validation.
///
/// The record time is the first pet's slot; each pet keeps its own slot on
/// the patient link.
pub fn plan_appointments(request: &BookingRequest, types: &[AppointmentType]) -> Vec<NewAppointment> {
    let patients: Vec<AttachedPatient> = request
        .pairings()
        .map(|(patient_id, time)| AttachedPatient { patient_id, time })
        .collect();

    let Some(first) = patients.first() else {
        return Vec::new();
    };
    let time = first.time;

    types
        .iter()
        .map(|appointment_type| NewAppointment {
            date: request.date,
            time,
            type_ids: vec![appointment_type.id],
            patients: patients.clone(),
            is_approved: request.source == BookingSource::Staff,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn request(pets: Vec<i64>, times: Vec<NaiveTime>, types: &[&str]) -> BookingRequest {
        BookingRequest {
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            patient_ids: pets,
            times,
            appointment_types: types.iter().map(|t| t.to_string()).collect(),
            source: BookingSource::Client,
        }
    }

    fn make_type(id: i64, name: &str) -> AppointmentType {
        AppointmentType {
            id,
            name: name.into(),
            created_at: String::new(),
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let req = request(vec![1, 2], vec![at(9, 0)], &["Vaccination"]);
        assert_eq!(
            req.check_shape(),
            Err(BookingRejection::SlotCountMismatch { patients: 2, times: 1 })
        );
    }

    #[test]
    fn test_shape_empty_and_duplicates() {
        let req = request(vec![], vec![], &["Vaccination"]);
        assert_eq!(req.check_shape(), Err(BookingRejection::EmptySubmission));

        let req = request(vec![1], vec![at(9, 0)], &[]);
        assert_eq!(req.check_shape(), Err(BookingRejection::EmptySubmission));

        let req = request(vec![1, 1], vec![at(9, 0), at(9, 30)], &["Vaccination"]);
        assert_eq!(
            req.check_shape(),
            Err(BookingRejection::DuplicatePatient { patient_id: 1 })
        );

        let req = request(vec![1, 2], vec![at(9, 0), at(9, 30)], &["Vaccination"]);
        assert!(req.check_shape().is_ok());
    }

    #[test]
    fn test_plan_one_record_per_type_with_all_pets() {
        let req = request(vec![7, 8], vec![at(9, 0), at(9, 30)], &["a", "b"]);
        let types = vec![make_type(1, "Vaccination"), make_type(2, "Check-up")];

        let planned = plan_appointments(&req, &types);
        assert_eq!(planned.len(), 2);
        for (record, ty) in planned.iter().zip(&types) {
            assert_eq!(record.type_ids, vec![ty.id]);
            assert_eq!(record.legacy_patient_id(), Some(7));
            assert_eq!(record.time, at(9, 0));
            assert_eq!(record.patients.len(), 2);
            assert_eq!(record.patients[1].time, at(9, 30));
            assert!(!record.is_approved);
        }
    }

    #[test]
    fn test_plan_staff_bookings_are_approved() {
        let mut req = request(vec![7], vec![at(9, 0)], &["a"]);
        req.source = BookingSource::Staff;
        let planned = plan_appointments(&req, &[make_type(1, "Vaccination")]);
        assert!(planned[0].is_approved);
    }

    #[test]
    fn test_resolve_types_by_id_or_name() {
        let db = Database::open_in_memory().unwrap();
        let vaccination = db.insert_appointment_type("Vaccination").unwrap();
        db.insert_appointment_type("Check-up").unwrap();

        let refs = vec![
            "check-up".to_string(),
            vaccination.id.to_string(),
            "VACCINATION".to_string(),
        ];
        let resolved = resolve_types(&db, &refs).unwrap();
        let names: Vec<&str> = resolved.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Check-up", "Vaccination"]);

        let result = resolve_types(&db, &["Surgery".to_string()]);
        assert!(matches!(result, Err(ScheduleError::UnknownAppointmentType(name)) if name == "Surgery"));
    }
}
