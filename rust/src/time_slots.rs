//! Time slot generation from a day template.
//!
//! Walks a cursor from the start of the day to its end, emitting either a
//! configured break (when the cursor lands on its start) or a class period.

use chrono::{NaiveTime, Timelike};

use crate::config::{ConfigError, ScheduleConfig};
use crate::models::TimeSlot;

/// Hard cap on slots emitted for one day.
pub const MAX_SLOTS_PER_DAY: usize = 20;

/// A break is taken when the cursor is less than this far from its start.
pub const BREAK_ALIGNMENT_TOLERANCE_SECS: i64 = 60;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

fn secs(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight())
}

fn time_at(secs: i64) -> Option<NaiveTime> {
    if !(0..SECS_PER_DAY).contains(&secs) {
        return None;
    }
    NaiveTime::from_num_seconds_from_midnight_opt(u32::try_from(secs).ok()?, 0)
}

/// Generate the ordered slots of one day.
///
/// Breaks are only taken when the cursor reaches their start; a break the
/// cursor steps over is skipped. The last class period is clamped to the end
/// of the day. Degenerate templates stop at [`MAX_SLOTS_PER_DAY`].
pub fn generate_time_slots(config: &ScheduleConfig) -> Vec<TimeSlot> {
    let end = secs(config.end_time);
    let step = config.class_duration_minutes.saturating_mul(60);
    let mut cursor = secs(config.start_time);
    let mut slots = Vec::new();

    while cursor < end && slots.len() < MAX_SLOTS_PER_DAY {
        let aligned_break = config
            .break_slots
            .iter()
            .find(|brk| (secs(brk.start) - cursor).abs() < BREAK_ALIGNMENT_TOLERANCE_SECS);

        if let Some(brk) = aligned_break {
            slots.push(TimeSlot {
                start: brk.start,
                end: brk.end,
                label: brk.label.clone(),
                is_break: true,
            });
            cursor = secs(brk.end);
            continue;
        }

        let Some(start) = time_at(cursor) else {
            break;
        };
        let next = cursor.saturating_add(step);
        let Some(slot_end) = time_at(next.min(end)) else {
            break;
        };
        slots.push(TimeSlot::class_period(start, slot_end));
        cursor = next;
    }

    slots
}

/// Validate the template, then generate its slots.
///
/// An empty day, or one cut short by the slot cap, is reported as a
/// configuration error instead of a silently shortened grid.
pub fn generate_checked(config: &ScheduleConfig) -> Result<Vec<TimeSlot>, ConfigError> {
    config.validate()?;
    let slots = generate_time_slots(config);

    let Some(last) = slots.last() else {
        return Err(ConfigError::EmptyDay);
    };
    if last.end < config.end_time {
        return Err(ConfigError::Truncated {
            cap: MAX_SLOTS_PER_DAY,
            end: config.end_time,
        });
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakSlot;
    use proptest::prelude::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn config(
        start: NaiveTime,
        end: NaiveTime,
        duration: i64,
        breaks: Vec<BreakSlot>,
    ) -> ScheduleConfig {
        ScheduleConfig::new(None, Some(start), Some(end), Some(duration), Some(breaks))
    }

    fn assert_contiguous(slots: &[TimeSlot], start: NaiveTime, end: NaiveTime) {
        assert_eq!(slots.first().map(|s| s.start), Some(start));
        assert_eq!(slots.last().map(|s| s.end), Some(end));
        for pair in slots.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "gap or overlap at {}", pair[0].label);
        }
    }

    #[test]
    fn test_two_periods_without_breaks() {
        let slots = generate_time_slots(&config(t(7, 0), t(8, 30), 45, vec![]));
        assert_eq!(slots.len(), 2);
        assert_eq!((slots[0].start, slots[0].end), (t(7, 0), t(7, 45)));
        assert_eq!((slots[1].start, slots[1].end), (t(7, 45), t(8, 30)));
        assert_eq!(slots[0].label, "07:00 - 07:45");
    }

    #[test]
    fn test_aligned_break_is_emitted() {
        let slots = generate_time_slots(&config(
            t(7, 0),
            t(9, 45),
            45,
            vec![BreakSlot::new(t(8, 30), t(9, 0), "Recess".into())],
        ));
        let labels: Vec<&str> = slots.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["07:00 - 07:45", "07:45 - 08:30", "Recess", "09:00 - 09:45"]
        );
        assert!(slots[2].is_break);
        assert_contiguous(&slots, t(7, 0), t(9, 45));
    }

    #[test]
    fn test_break_within_tolerance_is_taken() {
        let brk_start = NaiveTime::from_hms_opt(7, 45, 30).unwrap();
        let slots = generate_time_slots(&config(
            t(7, 0),
            t(8, 45),
            45,
            vec![BreakSlot::new(brk_start, t(8, 0), "Snack".into())],
        ));
        assert!(slots[1].is_break);
        assert_eq!(slots[1].start, brk_start);
    }

    #[test]
    fn test_misaligned_break_is_skipped() {
        // Cursor goes 07:00 -> 07:45 -> 08:30, never touching 08:00.
        let slots = generate_time_slots(&config(
            t(7, 0),
            t(9, 0),
            45,
            vec![BreakSlot::new(t(8, 0), t(8, 15), "Recess".into())],
        ));
        assert!(slots.iter().all(|s| !s.is_break));
        assert_contiguous(&slots, t(7, 0), t(9, 0));
    }

    #[test]
    fn test_last_period_is_clamped_to_day_end() {
        let slots = generate_time_slots(&config(t(7, 0), t(8, 0), 45, vec![]));
        assert_eq!(slots.len(), 2);
        assert_eq!((slots[1].start, slots[1].end), (t(7, 45), t(8, 0)));
    }

    #[test]
    fn test_zero_duration_hits_cap() {
        let slots = generate_time_slots(&config(t(7, 0), t(8, 0), 0, vec![]));
        assert_eq!(slots.len(), MAX_SLOTS_PER_DAY);
    }

    #[test]
    fn test_checked_rejects_zero_duration() {
        let result = generate_checked(&config(t(7, 0), t(8, 0), 0, vec![]));
        assert_eq!(result, Err(ConfigError::InvalidDuration(0)));
    }

    #[test]
    fn test_checked_reports_truncation() {
        // 5-minute periods over a full morning need more than the cap.
        let result = generate_checked(&config(t(7, 0), t(12, 0), 5, vec![]));
        assert!(matches!(result, Err(ConfigError::Truncated { cap: 20, .. })));
    }

    #[test]
    fn test_end_of_day_near_midnight() {
        let slots = generate_time_slots(&config(
            t(22, 30),
            NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
            60,
            vec![],
        ));
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].end, NaiveTime::from_hms_opt(23, 59, 59).unwrap());
    }

    proptest! {
        #[test]
        fn prop_valid_config_covers_day(
            start_min in 6u32 * 60..10 * 60,
            duration in 30i64..=60,
            periods in 1usize..8,
            break_after in 0usize..8,
            break_len in 5i64..=30,
        ) {
            let start = NaiveTime::from_num_seconds_from_midnight_opt(start_min * 60, 0).unwrap();
            let mut breaks = Vec::new();
            let mut total = duration * periods as i64;
            if break_after < periods {
                let brk_start = start + chrono::Duration::minutes(duration * break_after as i64);
                breaks.push(BreakSlot::new(
                    brk_start,
                    brk_start + chrono::Duration::minutes(break_len),
                    "Break".into(),
                ));
                total += break_len;
            }
            let end = start + chrono::Duration::minutes(total);
            let cfg = config(start, end, duration, breaks);

            let slots = generate_checked(&cfg).unwrap();
            prop_assert_eq!(slots.first().map(|s| s.start), Some(start));
            prop_assert_eq!(slots.last().map(|s| s.end), Some(end));
            for pair in slots.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
            }
            prop_assert!(slots.iter().all(|s| s.start < s.end));
        }
    }
}
