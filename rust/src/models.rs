//! Core data types for the schedule builder.

use chrono::NaiveTime;
use pyo3::prelude::*;
use std::fmt;

/// ISO weekday number: 1=Monday .. 7=Sunday.
pub type DayOfWeek = u8;

/// Format a time of day as `HH:MM`.
pub fn hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// One period of the daily grid: a class period or a fixed break.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeSlot {
    #[pyo3(get)]
    pub start: NaiveTime,
    #[pyo3(get)]
    pub end: NaiveTime,
    #[pyo3(get)]
    pub label: String,
    #[pyo3(get)]
    pub is_break: bool,
}

impl TimeSlot {
    /// A class period labelled by its time range.
    pub fn class_period(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start,
            end,
            label: format!("{} - {}", hhmm(start), hhmm(end)),
            is_break: false,
        }
    }

    /// Whether a time of day falls inside `[start, end)`.
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }
}

#[pymethods]
impl TimeSlot {
    fn __repr__(&self) -> String {
        format!(
            "TimeSlot(label={:?}, start={}, end={}, is_break={})",
            self.label, self.start, self.end, self.is_break
        )
    }
}

/// A schedule the persistence layer has written and assigned an id.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    #[pyo3(get, set)]
    pub id: i64,
    #[pyo3(get, set)]
    pub section_id: i64,
    #[pyo3(get, set)]
    pub course_id: i64,
    #[pyo3(get, set)]
    pub teacher_id: Option<i64>,
    #[pyo3(get, set)]
    pub day_of_week: DayOfWeek,
    #[pyo3(get, set)]
    pub start_time: NaiveTime,
    #[pyo3(get, set)]
    pub end_time: NaiveTime,
    #[pyo3(get, set)]
    pub classroom: Option<String>,
}

#[pymethods]
impl Schedule {
    #[new]
    #[pyo3(signature = (
        id,
        section_id,
        course_id,
        day_of_week,
        start_time,
        end_time,
        teacher_id=None,
        classroom=None
    ))]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: i64,
        section_id: i64,
        course_id: i64,
        day_of_week: DayOfWeek,
        start_time: NaiveTime,
        end_time: NaiveTime,
        teacher_id: Option<i64>,
        classroom: Option<String>,
    ) -> Self {
        Self {
            id,
            section_id,
            course_id,
            teacher_id,
            day_of_week,
            start_time,
            end_time,
            classroom,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Schedule(id={}, course_id={}, day={}, {}-{})",
            self.id,
            self.course_id,
            self.day_of_week,
            hhmm(self.start_time),
            hhmm(self.end_time)
        )
    }
}

impl Schedule {
    /// Attach a server id to a complete draft. Returns `None` if the draft has no course.
    pub fn from_draft(id: i64, draft: &ScheduleDraft) -> Option<Self> {
        Some(Self {
            id,
            section_id: draft.section_id,
            course_id: draft.course_id?,
            teacher_id: draft.teacher_id,
            day_of_week: draft.day_of_week,
            start_time: draft.start_time,
            end_time: draft.end_time,
            classroom: draft.classroom.clone(),
        })
    }

    pub fn to_draft(&self) -> ScheduleDraft {
        ScheduleDraft {
            section_id: self.section_id,
            course_id: Some(self.course_id),
            teacher_id: self.teacher_id,
            day_of_week: self.day_of_week,
            start_time: self.start_time,
            end_time: self.end_time,
            classroom: self.classroom.clone(),
        }
    }
}

/// Schedule fields without an identity.
///
/// Course, teacher and classroom may be missing while an assignment is
/// still being built on the grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleDraft {
    pub section_id: i64,
    pub course_id: Option<i64>,
    pub teacher_id: Option<i64>,
    pub day_of_week: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub classroom: Option<String>,
}

impl ScheduleDraft {
    pub fn is_complete(&self) -> bool {
        self.course_id.is_some()
    }
}

/// A schedule created locally and not yet confirmed by the persistence layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TempSchedule {
    pub local_id: String,
    pub draft: ScheduleDraft,
}

/// Identity of a schedule in the working set.
///
/// Pending and persisted identities live in separate variants so a local id
/// can never be mistaken for a server id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScheduleRef {
    Pending(String),
    Persisted(i64),
}

impl ScheduleRef {
    pub fn is_pending(&self) -> bool {
        matches!(self, ScheduleRef::Pending(_))
    }
}

impl fmt::Display for ScheduleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleRef::Pending(local_id) => write!(f, "{}", local_id),
            ScheduleRef::Persisted(id) => write!(f, "#{}", id),
        }
    }
}

/// A schedule as held by the grid: persisted or pending, with its fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub key: ScheduleRef,
    pub draft: ScheduleDraft,
}

impl ScheduleEntry {
    pub fn is_pending(&self) -> bool {
        self.key.is_pending()
    }
}

impl From<&Schedule> for ScheduleEntry {
    fn from(schedule: &Schedule) -> Self {
        Self {
            key: ScheduleRef::Persisted(schedule.id),
            draft: schedule.to_draft(),
        }
    }
}

impl From<&TempSchedule> for ScheduleEntry {
    fn from(temp: &TempSchedule) -> Self {
        Self {
            key: ScheduleRef::Pending(temp.local_id.clone()),
            draft: temp.draft.clone(),
        }
    }
}

/// Partial update of a schedule.
///
/// `None` leaves a field unchanged. For the nullable fields, `Some(None)`
/// clears the value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulePatch {
    pub course_id: Option<i64>,
    pub teacher_id: Option<Option<i64>>,
    pub day_of_week: Option<DayOfWeek>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub classroom: Option<Option<String>>,
}

impl SchedulePatch {
    /// Patch that moves a schedule to another day and time range.
    pub fn moved_to(day_of_week: DayOfWeek, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            day_of_week: Some(day_of_week),
            start_time: Some(start_time),
            end_time: Some(end_time),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fold a later patch into this one; fields set in `later` win.
    pub fn merge(&mut self, later: SchedulePatch) {
        if later.course_id.is_some() {
            self.course_id = later.course_id;
        }
        if later.teacher_id.is_some() {
            self.teacher_id = later.teacher_id;
        }
        if later.day_of_week.is_some() {
            self.day_of_week = later.day_of_week;
        }
        if later.start_time.is_some() {
            self.start_time = later.start_time;
        }
        if later.end_time.is_some() {
            self.end_time = later.end_time;
        }
        if later.classroom.is_some() {
            self.classroom = later.classroom;
        }
    }

    pub fn apply_to(&self, draft: &mut ScheduleDraft) {
        if let Some(course_id) = self.course_id {
            draft.course_id = Some(course_id);
        }
        if let Some(teacher_id) = self.teacher_id {
            draft.teacher_id = teacher_id;
        }
        if let Some(day) = self.day_of_week {
            draft.day_of_week = day;
        }
        if let Some(start) = self.start_time {
            draft.start_time = start;
        }
        if let Some(end) = self.end_time {
            draft.end_time = end;
        }
        if let Some(classroom) = &self.classroom {
            draft.classroom = classroom.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn draft() -> ScheduleDraft {
        ScheduleDraft {
            section_id: 1,
            course_id: None,
            teacher_id: Some(5),
            day_of_week: 2,
            start_time: t(9, 0),
            end_time: t(9, 45),
            classroom: Some("B-12".into()),
        }
    }

    #[test]
    fn test_class_period_label() {
        let slot = TimeSlot::class_period(t(7, 0), t(7, 45));
        assert_eq!(slot.label, "07:00 - 07:45");
        assert!(!slot.is_break);
        assert!(slot.contains(t(7, 0)));
        assert!(!slot.contains(t(7, 45)));
    }

    #[test]
    fn test_incomplete_draft_cannot_be_persisted() {
        assert!(Schedule::from_draft(10, &draft()).is_none());

        let mut complete = draft();
        complete.course_id = Some(3);
        let schedule = Schedule::from_draft(10, &complete).unwrap();
        assert_eq!(schedule.id, 10);
        assert_eq!(schedule.to_draft(), complete);
    }

    #[test]
    fn test_schedule_ref_variants_never_compare_equal() {
        let pending = ScheduleRef::Pending("7".into());
        let persisted = ScheduleRef::Persisted(7);
        assert_ne!(pending, persisted);
        assert!(pending.is_pending());
        assert!(!persisted.is_pending());
        assert_eq!(persisted.to_string(), "#7");
    }

    #[test]
    fn test_patch_merge_later_wins() {
        let mut patch = SchedulePatch::moved_to(2, t(9, 0), t(9, 45));
        patch.merge(SchedulePatch {
            day_of_week: Some(4),
            classroom: Some(None),
            ..SchedulePatch::default()
        });
        assert_eq!(patch.day_of_week, Some(4));
        assert_eq!(patch.start_time, Some(t(9, 0)));
        assert_eq!(patch.classroom, Some(None));
    }

    #[test]
    fn test_patch_apply_clears_nullable_fields() {
        let mut target = draft();
        let patch = SchedulePatch {
            teacher_id: Some(None),
            classroom: Some(None),
            course_id: Some(8),
            ..SchedulePatch::default()
        };
        patch.apply_to(&mut target);
        assert_eq!(target.teacher_id, None);
        assert_eq!(target.classroom, None);
        assert_eq!(target.course_id, Some(8));
        assert_eq!(target.start_time, t(9, 0));
    }
}
