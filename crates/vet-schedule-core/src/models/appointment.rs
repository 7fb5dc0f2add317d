//! Appointment models.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Lifecycle state derived from the approval/completion/cancellation flags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppointmentStatus {
    /// Submitted by a client, awaiting staff approval
    Pending,
    /// Approved by staff
    Approved,
    /// Prescription issued
    Completed,
    /// Logically deleted
    Canceled,
}

/// A patient attached to an appointment, with the slot chosen for that pet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachedPatient {
    pub patient_id: i64,
    pub time: NaiveTime,
}

/// A persisted booking.
///
/// `type_ids` and `patients` are the canonical associations. The legacy
/// single-valued columns are derived from them (see [`Appointment::legacy_type_id`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: i64,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub type_ids: BTreeSet<i64>,
    pub patients: Vec<AttachedPatient>,
    pub is_approved: bool,
    pub is_completed: bool,
    pub is_canceled: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Appointment {
    pub fn status(&self) -> AppointmentStatus {
        if self.is_canceled {
            AppointmentStatus::Canceled
        } else if self.is_completed {
            AppointmentStatus::Completed
        } else if self.is_approved {
            AppointmentStatus::Approved
        } else {
            AppointmentStatus::Pending
        }
    }

    /// Patient IDs in attachment order.
    pub fn patient_ids(&self) -> Vec<i64> {
        self.patients.iter().map(|p| p.patient_id).collect()
    }

    /// Single-valued type view for older consumers.
    pub fn legacy_type_id(&self) -> Option<i64> {
        self.type_ids.iter().next().copied()
    }

    /// Single-valued patient view for older consumers.
    pub fn legacy_patient_id(&self) -> Option<i64> {
        self.patients.first().map(|p| p.patient_id)
    }

    /// Whether this appointment counts toward limits and slot occupancy.
    pub fn is_active(&self) -> bool {
        !self.is_canceled
    }

    /// Patients moved so the record lands on `time`, each pet keeping its
    /// offset from the record time. `None` if any pet would cross midnight.
    pub fn rescheduled_patients(&self, time: NaiveTime) -> Option<Vec<AttachedPatient>> {
        let offset = time.signed_duration_since(self.time);
        self.patients
            .iter()
            .map(|p| {
                let (moved, wrapped) = p.time.overflowing_add_signed(offset);
                (wrapped == 0).then_some(AttachedPatient {
                    patient_id: p.patient_id,
                    time: moved,
                })
            })
            .collect()
    }
}

/// An appointment about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub date: NaiveDate,
    pub time: NaiveTime,
    /// Insertion order is kept; the first entry feeds the legacy column
    pub type_ids: Vec<i64>,
    pub patients: Vec<AttachedPatient>,
    pub is_approved: bool,
}

impl NewAppointment {
    pub fn legacy_type_id(&self) -> Option<i64> {
        self.type_ids.first().copied()
    }

    pub fn legacy_patient_id(&self) -> Option<i64> {
        self.patients.first().map(|p| p.patient_id)
    }
}
