//! Rust core of the class-schedule builder.
//!
//! Generates the weekly slot grid from a day template, detects time-overlap
//! conflicts between schedules, drives drag-and-drop placement, and stages
//! schedule changes until they are committed to the persistence layer.
//!
//! The pure pieces (slot generation, conflict detection) are also exported
//! to Python for server-side re-validation.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::NaiveTime;
use pyo3::prelude::*;

pub mod changes;
mod config;
pub mod conflicts;
pub mod drag;
pub mod grid;
pub mod logging;
mod models;
pub mod time_slots;

pub use changes::{
    CancelFlag, ChangeError, CommitError, CommitOutcome, CommitReport, CommitSuccess, DeleteMode,
    PendingChange, PendingChangeSet, PersistenceError, SchedulePersistence,
};
pub use config::{BreakSlot, ConfigError, ConflictPolicy, ScheduleConfig, SessionConfig};
pub use conflicts::{detect_conflicts, ConflictAxis, ConflictCandidate, ConflictResult};
pub use drag::{
    CancelReason, CellLocator, CourseAssignment, DragCoordinator, DragItem, DragItemKind,
    DragPayload, DragPhase, DragResolution, DropOutcome, PointerPosition, UniformGridLayout,
};
pub use grid::{CellRef, PlacementRejection, ScheduleGridModel};
pub use models::{
    DayOfWeek, Schedule, ScheduleDraft, ScheduleEntry, SchedulePatch, ScheduleRef, TempSchedule,
    TimeSlot,
};
pub use time_slots::{generate_checked, generate_time_slots, MAX_SLOTS_PER_DAY};

/// Generate the slots of one day from a template.
///
/// Degenerate templates are capped rather than rejected; use
/// `validate_schedule_config` to surface them as errors.
#[pyfunction]
#[pyo3(name = "generate_time_slots")]
fn py_generate_time_slots(config: ScheduleConfig) -> Vec<TimeSlot> {
    generate_time_slots(&config)
}

/// Validate a template and return its slots.
///
/// # Raises
/// * ValueError if the template is degenerate, empty, or cut short by the slot cap
#[pyfunction]
fn validate_schedule_config(config: ScheduleConfig) -> PyResult<Vec<TimeSlot>> {
    generate_checked(&config).map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))
}

/// One conflict as seen from Python.
#[pyclass(name = "ConflictInfo")]
#[derive(Clone, Debug)]
pub struct PyConflictInfo {
    /// "teacher", "classroom" or "section"
    #[pyo3(get)]
    pub axis: String,
    #[pyo3(get)]
    pub message: String,
    #[pyo3(get)]
    pub conflicting_id: i64,
}

#[pymethods]
impl PyConflictInfo {
    fn __repr__(&self) -> String {
        format!(
            "ConflictInfo(axis={:?}, conflicting_id={})",
            self.axis, self.conflicting_id
        )
    }
}

/// Check a proposed class against persisted schedules.
///
/// # Arguments
/// * `section_id`, `day_of_week`, `start_time`, `end_time` - the proposed class
/// * `existing` - schedules to check against
/// * `teacher_id`, `classroom` - optional resources of the proposed class
/// * `exclude_id` - schedule being edited in place, skipped during the check
///
/// # Returns
/// * One ConflictInfo per (schedule, axis) collision; empty when clear
#[pyfunction]
#[pyo3(
    name = "detect_conflicts",
    signature = (
        section_id,
        day_of_week,
        start_time,
        end_time,
        existing,
        teacher_id=None,
        classroom=None,
        exclude_id=None
    )
)]
#[allow(clippy::too_many_arguments)]
fn py_detect_conflicts(
    section_id: i64,
    day_of_week: DayOfWeek,
    start_time: NaiveTime,
    end_time: NaiveTime,
    existing: Vec<Schedule>,
    teacher_id: Option<i64>,
    classroom: Option<String>,
    exclude_id: Option<i64>,
) -> Vec<PyConflictInfo> {
    let candidate = ConflictCandidate {
        section_id,
        day_of_week,
        start_time,
        end_time,
        teacher_id,
        classroom,
    };
    let entries: Vec<ScheduleEntry> = existing.iter().map(ScheduleEntry::from).collect();
    let exclude = exclude_id.map(ScheduleRef::Persisted);

    detect_conflicts(&candidate, &entries, exclude.as_ref())
        .into_iter()
        .filter_map(|conflict| {
            let ScheduleRef::Persisted(id) = conflict.conflicting.key else {
                return None;
            };
            Some(PyConflictInfo {
                axis: conflict.axis.to_string(),
                message: conflict.message,
                conflicting_id: id,
            })
        })
        .collect()
}

/// The schedule_builder.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Data types
    m.add_class::<TimeSlot>()?;
    m.add_class::<Schedule>()?;
    m.add_class::<PyConflictInfo>()?;

    // Config types
    m.add_class::<ScheduleConfig>()?;
    m.add_class::<BreakSlot>()?;

    // Algorithms
    m.add_function(wrap_pyfunction!(py_generate_time_slots, m)?)?;
    m.add_function(wrap_pyfunction!(validate_schedule_config, m)?)?;
    m.add_function(wrap_pyfunction!(py_detect_conflicts, m)?)?;

    Ok(())
}
