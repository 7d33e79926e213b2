//! Time-overlap conflict detection across teacher, classroom and section.
//!
//! Detection compares raw time ranges, not slot identity: two schedules in
//! different nominal slots still conflict when their minutes overlap.

use chrono::{NaiveTime, Timelike};
use std::fmt;

use crate::models::{hhmm, DayOfWeek, ScheduleDraft, ScheduleEntry, ScheduleRef};

/// Resource axis on which two schedules collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConflictAxis {
    Teacher,
    Classroom,
    Section,
}

impl fmt::Display for ConflictAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictAxis::Teacher => "teacher",
            ConflictAxis::Classroom => "classroom",
            ConflictAxis::Section => "section",
        };
        f.write_str(name)
    }
}

/// A placement being evaluated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictCandidate {
    pub section_id: i64,
    pub day_of_week: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub teacher_id: Option<i64>,
    pub classroom: Option<String>,
}

impl ConflictCandidate {
    pub fn from_draft(draft: &ScheduleDraft) -> Self {
        Self {
            section_id: draft.section_id,
            day_of_week: draft.day_of_week,
            start_time: draft.start_time,
            end_time: draft.end_time,
            teacher_id: draft.teacher_id,
            classroom: draft.classroom.clone(),
        }
    }
}

/// One detected collision between the candidate and an existing schedule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictResult {
    pub axis: ConflictAxis,
    pub message: String,
    pub conflicting: ScheduleEntry,
}

pub fn minutes_since_midnight(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}

/// Half-open interval overlap: `[s1, e1)` and `[s2, e2)`.
#[inline]
pub fn intervals_overlap(s1: u32, e1: u32, s2: u32, e2: u32) -> bool {
    s1 < e2 && s2 < e1
}

fn non_empty(classroom: &Option<String>) -> Option<&str> {
    classroom.as_deref().filter(|room| !room.is_empty())
}

fn describe(axis: ConflictAxis, candidate: &ConflictCandidate, other: &ScheduleDraft) -> String {
    let window = format!(
        "{}-{} on day {}",
        hhmm(other.start_time),
        hhmm(other.end_time),
        other.day_of_week
    );
    match axis {
        ConflictAxis::Teacher => format!(
            "Teacher {} is already teaching {}",
            candidate.teacher_id.unwrap_or_default(),
            window
        ),
        ConflictAxis::Classroom => format!(
            "Classroom {} is already in use {}",
            candidate.classroom.as_deref().unwrap_or_default(),
            window
        ),
        ConflictAxis::Section => format!(
            "Section {} already has a class {}",
            candidate.section_id, window
        ),
    }
}

/// Check a candidate placement against the working set.
///
/// Only schedules on the same day are considered, and `exclude` (the
/// schedule being moved) is skipped. Each overlapping schedule is tested
/// independently per axis, so one schedule may yield several results.
/// Classrooms compare by literal string equality. The result is advisory;
/// the caller decides whether it blocks.
pub fn detect_conflicts(
    candidate: &ConflictCandidate,
    existing: &[ScheduleEntry],
    exclude: Option<&ScheduleRef>,
) -> Vec<ConflictResult> {
    let start = minutes_since_midnight(candidate.start_time);
    let end = minutes_since_midnight(candidate.end_time);
    let mut conflicts = Vec::new();

    for entry in existing {
        if Some(&entry.key) == exclude || entry.draft.day_of_week != candidate.day_of_week {
            continue;
        }

        let other = &entry.draft;
        let other_start = minutes_since_midnight(other.start_time);
        let other_end = minutes_since_midnight(other.end_time);
        if !intervals_overlap(start, end, other_start, other_end) {
            continue;
        }

        let mut axes = Vec::with_capacity(3);
        if let (Some(a), Some(b)) = (candidate.teacher_id, other.teacher_id) {
            if a == b {
                axes.push(ConflictAxis::Teacher);
            }
        }
        if let (Some(a), Some(b)) = (non_empty(&candidate.classroom), non_empty(&other.classroom)) {
            if a == b {
                axes.push(ConflictAxis::Classroom);
            }
        }
        if candidate.section_id == other.section_id {
            axes.push(ConflictAxis::Section);
        }

        for axis in axes {
            conflicts.push(ConflictResult {
                axis,
                message: describe(axis, candidate, other),
                conflicting: entry.clone(),
            });
        }
    }

    conflicts
}
