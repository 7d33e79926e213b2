//! Configuration types for the schedule builder.

use chrono::NaiveTime;
use pyo3::prelude::*;
use thiserror::Error;

use crate::conflicts::ConflictAxis;
use crate::models::DayOfWeek;

/// Errors found while validating a day template or generating its slots.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Class duration must be positive, got {0} minutes")]
    InvalidDuration(i64),
    #[error("Day start {start} must be before day end {end}")]
    InvalidRange { start: NaiveTime, end: NaiveTime },
    #[error("Invalid working day {0} (expected 1=Monday..7=Sunday)")]
    InvalidWorkingDay(DayOfWeek),
    #[error("Break '{label}' must start before it ends")]
    InvalidBreak { label: String },
    #[error("Break '{label}' falls outside the school day")]
    BreakOutOfRange { label: String },
    #[error("Breaks '{first}' and '{second}' overlap or are out of order")]
    BreaksOverlap { first: String, second: String },
    #[error("Configuration produced no time slots")]
    EmptyDay,
    #[error("Slot generation stopped at the {cap}-slot cap before reaching {end}")]
    Truncated { cap: usize, end: NaiveTime },
}

/// A fixed recess or lunch window. Never eligible for assignment.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakSlot {
    #[pyo3(get, set)]
    pub start: NaiveTime,
    #[pyo3(get, set)]
    pub end: NaiveTime,
    #[pyo3(get, set)]
    pub label: String,
}

#[pymethods]
impl BreakSlot {
    #[new]
    pub fn new(start: NaiveTime, end: NaiveTime, label: String) -> Self {
        Self { start, end, label }
    }

    fn __repr__(&self) -> String {
        format!(
            "BreakSlot(label={:?}, start={}, end={})",
            self.label, self.start, self.end
        )
    }
}

/// Day template for one section's weekly grid.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// ISO weekday numbers (1=Monday .. 7=Sunday), in display order
    #[pyo3(get, set)]
    pub working_days: Vec<DayOfWeek>,
    #[pyo3(get, set)]
    pub start_time: NaiveTime,
    #[pyo3(get, set)]
    pub end_time: NaiveTime,
    #[pyo3(get, set)]
    pub class_duration_minutes: i64,
    /// Ordered by start time
    #[pyo3(get, set)]
    pub break_slots: Vec<BreakSlot>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            working_days: vec![1, 2, 3, 4, 5],
            start_time: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
            end_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap_or_default(),
            class_duration_minutes: 45,
            break_slots: Vec::new(),
        }
    }
}

impl ScheduleConfig {
    /// Check the template for the degenerate inputs slot generation cannot cover.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.class_duration_minutes <= 0 {
            return Err(ConfigError::InvalidDuration(self.class_duration_minutes));
        }
        if self.start_time >= self.end_time {
            return Err(ConfigError::InvalidRange {
                start: self.start_time,
                end: self.end_time,
            });
        }
        if let Some(&day) = self.working_days.iter().find(|d| !(1..=7).contains(*d)) {
            return Err(ConfigError::InvalidWorkingDay(day));
        }

        for brk in &self.break_slots {
            if brk.start >= brk.end {
                return Err(ConfigError::InvalidBreak {
                    label: brk.label.clone(),
                });
            }
            if brk.start < self.start_time || brk.end > self.end_time {
                return Err(ConfigError::BreakOutOfRange {
                    label: brk.label.clone(),
                });
            }
        }

        for pair in self.break_slots.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(ConfigError::BreaksOverlap {
                    first: pair[0].label.clone(),
                    second: pair[1].label.clone(),
                });
            }
        }

        Ok(())
    }
}

#[pymethods]
impl ScheduleConfig {
    #[new]
    #[pyo3(signature = (
        working_days=None,
        start_time=None,
        end_time=None,
        class_duration_minutes=None,
        break_slots=None
    ))]
    pub fn new(
        working_days: Option<Vec<DayOfWeek>>,
        start_time: Option<NaiveTime>,
        end_time: Option<NaiveTime>,
        class_duration_minutes: Option<i64>,
        break_slots: Option<Vec<BreakSlot>>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            working_days: working_days.unwrap_or(defaults.working_days),
            start_time: start_time.unwrap_or(defaults.start_time),
            end_time: end_time.unwrap_or(defaults.end_time),
            class_duration_minutes: class_duration_minutes
                .unwrap_or(defaults.class_duration_minutes),
            break_slots: break_slots.unwrap_or(defaults.break_slots),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "ScheduleConfig(days={:?}, start={}, end={}, duration={}, breaks={})",
            self.working_days,
            self.start_time,
            self.end_time,
            self.class_duration_minutes,
            self.break_slots.len()
        )
    }
}

/// What to do with a drop that reports conflicts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Reject the drop; the grid and change set are left untouched.
    #[default]
    Block,
    /// Accept the drop and hand the conflicts back as warnings.
    Warn,
}

/// Settings for one interactive editing session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Section whose grid is being edited
    pub section_id: i64,
    pub conflict_policy: ConflictPolicy,
    /// Axes that never block a drop (e.g. co-taught classes sharing a room)
    pub tolerated_axes: Vec<ConflictAxis>,
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    pub verbosity: u8,
}

impl SessionConfig {
    pub fn new(section_id: i64) -> Self {
        Self {
            section_id,
            conflict_policy: ConflictPolicy::default(),
            tolerated_axes: Vec::new(),
            verbosity: 0,
        }
    }

    /// Whether a conflict on this axis should stop a drop.
    pub fn blocks(&self, axis: ConflictAxis) -> bool {
        self.conflict_policy == ConflictPolicy::Block && !self.tolerated_axes.contains(&axis)
    }
}
