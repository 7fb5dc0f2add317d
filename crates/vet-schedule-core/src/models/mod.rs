//! Domain models for the vet-schedule system.

mod appointment;
mod appointment_type;

pub use appointment::*;
pub use appointment_type::*;
