//! Appointment type models.

use serde::{Deserialize, Serialize};

use crate::config::TypeLimits;

/// A named category of visit (e.g. "Vaccination", "Check-up").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppointmentType {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

impl AppointmentType {
    /// Daily capacity for this type under the given limits.
    pub fn daily_limit(&self, limits: &TypeLimits) -> u32 {
        limits.limit_for(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_limit_uses_name() {
        let limits = TypeLimits::parse("vaccination=40,default=7").unwrap();
        let ty = AppointmentType {
            id: 1,
            name: "Vaccination".into(),
            created_at: String::new(),
        };
        assert_eq!(ty.daily_limit(&limits), 40);

        let other = AppointmentType {
            id: 2,
            name: "Dental".into(),
            created_at: String::new(),
        };
        assert_eq!(other.daily_limit(&limits), 7);
    }
}
