//! Slot generation and the per-slot constraint filters.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::config::ScheduleConfig;

const SLOT_LABEL_FORMAT: &str = "%I:%M %p";

/// Every candidate slot of a day: `start`, `start + d`, ... while `< end`.
pub fn generate_slots(config: &ScheduleConfig) -> Vec<NaiveTime> {
    let mut slots = Vec::new();
    if config.slot_duration_minutes == 0 {
        return slots;
    }

    let step = Duration::minutes(i64::from(config.slot_duration_minutes));
    let mut slot = config.working_hours_start;
    while slot < config.working_hours_end {
        slots.push(slot);
        let (next, wrapped) = slot.overflowing_add_signed(step);
        if wrapped != 0 {
            break;
        }
        slot = next;
    }
    slots
}

pub fn within_working_hours(config: &ScheduleConfig, time: NaiveTime) -> bool {
    time >= config.working_hours_start && time < config.working_hours_end
}

pub fn during_lunch_break(config: &ScheduleConfig, time: NaiveTime) -> bool {
    time >= config.lunch_break_start && time < config.lunch_break_end
}

/// Whether `time` is a whole number of slots past the start of the day.
pub fn on_slot_boundary(config: &ScheduleConfig, time: NaiveTime) -> bool {
    if config.slot_duration_minutes == 0 || time < config.working_hours_start {
        return false;
    }
    let offset = (time - config.working_hours_start).num_seconds();
    offset % (i64::from(config.slot_duration_minutes) * 60) == 0
}

/// First booked time closer than the buffer to `time`, if any.
pub fn buffer_conflict(config: &ScheduleConfig, time: NaiveTime, booked: &[NaiveTime]) -> Option<NaiveTime> {
    let buffer_secs = i64::from(config.buffer_time_minutes) * 60;
    booked
        .iter()
        .copied()
        .find(|&b| (time - b).num_seconds().abs() < buffer_secs)
}

/// Earliest bookable moment given `now`.
pub fn earliest_bookable(config: &ScheduleConfig, now: NaiveDateTime) -> NaiveDateTime {
    now + Duration::hours(i64::from(config.minimum_notice_hours))
}

pub fn meets_minimum_notice(
    config: &ScheduleConfig,
    date: NaiveDate,
    time: NaiveTime,
    now: NaiveDateTime,
) -> bool {
    date.and_time(time) >= earliest_bookable(config, now)
}

/// 12-hour display label, e.g. `"01:00 PM"`.
pub fn format_slot(time: NaiveTime) -> String {
    time.format(SLOT_LABEL_FORMAT).to_string()
}

/// Parse a slot label in 12-hour (`"10:15 AM"`) or 24-hour (`"10:15"`) form.
pub fn parse_slot(label: &str) -> Option<NaiveTime> {
    let label = label.trim();
    NaiveTime::parse_from_str(&label.to_uppercase(), SLOT_LABEL_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(label, "%H:%M"))
        .ok()
}

/// Slots offered to a client for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotListing {
    pub date: NaiveDate,
    pub available: Vec<NaiveTime>,
    /// Generated slots that are taken, too close to a taken slot, or blocked by the daily cap
    pub disabled: Vec<NaiveTime>,
}

impl SlotListing {
    pub fn available_labels(&self) -> Vec<String> {
        self.available.iter().copied().map(format_slot).collect()
    }

    pub fn disabled_labels(&self) -> Vec<String> {
        self.disabled.iter().copied().map(format_slot).collect()
    }
}
