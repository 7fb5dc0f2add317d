//! Property tests for slot generation and listing.

use chrono::{NaiveDate, NaiveTime};
use proptest::prelude::*;
use vet_schedule_core::db::Database;
use vet_schedule_core::schedule::{generate_slots, Scheduler};
use vet_schedule_core::ScheduleConfig;

fn minutes(m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(m / 60, m % 60, 0).unwrap()
}

prop_compose! {
    fn arb_config()(
        start in 0u32..(20 * 60),
        length in 1u32..(4 * 60),
        slot in 1u32..120,
        lunch_offset in 0u32..(4 * 60),
        lunch_length in 0u32..120,
        buffer in 0u32..60,
    ) -> ScheduleConfig {
        let end = (start + length).min(24 * 60 - 1);
        let lunch_start = (start + lunch_offset).min(24 * 60 - 1);
        let lunch_end = (lunch_start + lunch_length).min(24 * 60 - 1);
        ScheduleConfig {
            working_hours_start: minutes(start),
            working_hours_end: minutes(end),
            lunch_break_start: minutes(lunch_start),
            lunch_break_end: minutes(lunch_end),
            slot_duration_minutes: slot,
            buffer_time_minutes: buffer,
            ..ScheduleConfig::default()
        }
    }
}

proptest! {
    #[test]
    fn slots_are_aligned_and_before_end(config in arb_config()) {
        let slots = generate_slots(&config);
        prop_assert!(!slots.is_empty());
        prop_assert_eq!(slots[0], config.working_hours_start);

        for slot in &slots {
            let offset = (*slot - config.working_hours_start).num_minutes();
            prop_assert_eq!(offset % i64::from(config.slot_duration_minutes), 0);
            prop_assert!(*slot < config.working_hours_end);
        }
        for pair in slots.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn listing_never_offers_lunch(config in arb_config()) {
        let scheduler = Scheduler::new(config.clone());
        let db = Database::open_in_memory().unwrap();
        let listing = scheduler
            .available_slots(&db, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
            .unwrap();

        for slot in listing.available.iter().chain(&listing.disabled) {
            prop_assert!(!(*slot >= config.lunch_break_start && *slot < config.lunch_break_end));
        }
    }

    #[test]
    fn listing_is_idempotent(config in arb_config()) {
        let scheduler = Scheduler::new(config);
        let db = Database::open_in_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let first = scheduler.available_slots(&db, day).unwrap();
        let second = scheduler.available_slots(&db, day).unwrap();
        prop_assert_eq!(first, second);
    }
}
