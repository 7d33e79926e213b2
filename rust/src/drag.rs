//! Drag-and-drop placement session.
//!
//! A [`DragCoordinator`] drives one pointer gesture at a time:
//!
//! - `Idle` → `Dragging` on [`DragCoordinator::start_drag`]
//! - `Dragging` → `Dropped` when released over an eligible cell and the
//!   placement is accepted; grid and change set are updated
//! - `Dragging` → `Cancelled` on release elsewhere, an ineligible cell, a
//!   blocking conflict, or an explicit cancel; nothing is mutated
//!
//! `Dropped` and `Cancelled` are reported through [`DragResolution`] and the
//! session is back to `Idle` when the call returns. How a pointer position
//! maps to a cell is left to a [`CellLocator`].

use crate::changes::{ChangeError, PendingChangeSet};
use crate::config::SessionConfig;
use crate::conflicts::{detect_conflicts, ConflictCandidate, ConflictResult};
use crate::grid::{CellRef, PlacementRejection, ScheduleGridModel};
use crate::models::{
    DayOfWeek, ScheduleDraft, ScheduleEntry, SchedulePatch, ScheduleRef, TempSchedule,
};
use crate::{log_changes, log_checks, log_debug};

/// A course/teacher pairing offered by the assignment directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CourseAssignment {
    pub course_id: i64,
    pub teacher_id: Option<i64>,
    pub classroom: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DragPayload {
    /// New assignment dragged in from the directory
    Assignment(CourseAssignment),
    /// Schedule already on the grid being moved
    Existing(ScheduleRef),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragItemKind {
    CourseAssignment,
    ExistingSchedule,
}

/// The thing under the pointer during a gesture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DragItem {
    pub id: String,
    pub payload: DragPayload,
}

impl DragItem {
    pub fn assignment(id: impl Into<String>, assignment: CourseAssignment) -> Self {
        Self {
            id: id.into(),
            payload: DragPayload::Assignment(assignment),
        }
    }

    pub fn existing(key: ScheduleRef) -> Self {
        Self {
            id: key.to_string(),
            payload: DragPayload::Existing(key),
        }
    }

    pub fn kind(&self) -> DragItemKind {
        match self.payload {
            DragPayload::Assignment(_) => DragItemKind::CourseAssignment,
            DragPayload::Existing(_) => DragItemKind::ExistingSchedule,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

impl PointerPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Hit-testing seam: which grid cell, if any, lies under a pointer.
pub trait CellLocator {
    fn cell_at(&self, pointer: PointerPosition) -> Option<CellRef>;
}

/// Locator for a grid drawn as equal columns (days) and rows (slots).
#[derive(Clone, Debug)]
pub struct UniformGridLayout {
    pub origin: PointerPosition,
    pub column_width: f64,
    pub row_height: f64,
    /// Day shown in each column, left to right
    pub days: Vec<DayOfWeek>,
    pub slot_count: usize,
}

impl CellLocator for UniformGridLayout {
    fn cell_at(&self, pointer: PointerPosition) -> Option<CellRef> {
        if self.column_width <= 0.0 || self.row_height <= 0.0 {
            return None;
        }
        let dx = pointer.x - self.origin.x;
        let dy = pointer.y - self.origin.y;
        if dx < 0.0 || dy < 0.0 {
            return None;
        }
        let column = (dx / self.column_width).floor() as usize;
        let row = (dy / self.row_height).floor() as usize;
        if row >= self.slot_count {
            return None;
        }
        self.days.get(column).map(|&day| CellRef::new(day, row))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragPhase {
    Idle,
    Dragging,
    Dropped,
    Cancelled,
}

/// Why a gesture ended without changing anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// Explicit cancel signal
    Aborted,
    /// A new drag started while this one was active
    Superseded,
    /// Released with no cell under the pointer
    NoTarget,
    /// Released over the cell the schedule already occupies
    SameCell,
    /// Break, full, or unknown cell; checked before conflicts
    Ineligible(PlacementRejection),
    /// Conflicts the session policy does not tolerate
    Conflicts(Vec<ConflictResult>),
    /// The dragged schedule is no longer in the working set
    UnknownSchedule(ScheduleRef),
    /// The change set refused the move
    Rejected(ChangeError),
    /// Release or cancel with no gesture in progress
    NotDragging,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropOutcome {
    /// A new pending schedule was created
    Created { local_id: String, cell: CellRef },
    /// An existing schedule moved; `from` is `None` if it was off-grid
    Moved {
        key: ScheduleRef,
        from: Option<CellRef>,
        to: CellRef,
    },
}

/// How a gesture ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DragResolution {
    Dropped {
        outcome: DropOutcome,
        /// Conflicts accepted under the session policy
        warnings: Vec<ConflictResult>,
    },
    Cancelled {
        item: Option<DragItem>,
        reason: CancelReason,
    },
}

impl DragResolution {
    pub fn phase(&self) -> DragPhase {
        match self {
            DragResolution::Dropped { .. } => DragPhase::Dropped,
            DragResolution::Cancelled { .. } => DragPhase::Cancelled,
        }
    }

    pub fn is_dropped(&self) -> bool {
        self.phase() == DragPhase::Dropped
    }
}

#[derive(Clone, Debug)]
struct ActiveDrag {
    item: DragItem,
    origin: PointerPosition,
    pointer: PointerPosition,
    hover: Option<CellRef>,
}

/// One user's placement session over a section grid.
///
/// Owned by whoever owns the grid and change set, which are passed into the
/// calls that need them.
#[derive(Clone, Debug)]
pub struct DragCoordinator {
    config: SessionConfig,
    active: Option<ActiveDrag>,
}

impl DragCoordinator {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> DragPhase {
        if self.active.is_some() {
            DragPhase::Dragging
        } else {
            DragPhase::Idle
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_item(&self) -> Option<&DragItem> {
        self.active.as_ref().map(|a| &a.item)
    }

    pub fn hover_target(&self) -> Option<CellRef> {
        self.active.as_ref().and_then(|a| a.hover)
    }

    /// Pointer travel since the gesture started.
    pub fn drag_offset(&self) -> Option<(f64, f64)> {
        self.active
            .as_ref()
            .map(|a| (a.pointer.x - a.origin.x, a.pointer.y - a.origin.y))
    }

    /// Begin a gesture. A gesture already in progress is cancelled and returned.
    pub fn start_drag(
        &mut self,
        item: DragItem,
        pointer: PointerPosition,
    ) -> Option<DragResolution> {
        let superseded = self
            .active
            .take()
            .map(|prior| self.cancelled(prior.item, CancelReason::Superseded));

        log_debug!(self.config.verbosity, "Drag started: {}", item.id);
        self.active = Some(ActiveDrag {
            item,
            origin: pointer,
            pointer,
            hover: None,
        });
        superseded
    }

    /// Track the pointer and resolve the hover target.
    ///
    /// Only cells that could take the item become the hover target.
    pub fn update_pointer<L>(
        &mut self,
        pointer: PointerPosition,
        locator: &L,
        grid: &ScheduleGridModel,
    ) -> Option<CellRef>
    where
        L: CellLocator + ?Sized,
    {
        let active = self.active.as_mut()?;
        active.pointer = pointer;
        active.hover = locator
            .cell_at(pointer)
            .filter(|cell| grid.check_eligible(*cell).is_ok());
        log_debug!(self.config.verbosity, "Hover target: {:?}", active.hover);
        active.hover
    }

    /// Explicit cancel signal.
    pub fn cancel(&mut self) -> DragResolution {
        match self.active.take() {
            Some(active) => self.cancelled(active.item, CancelReason::Aborted),
            None => self.cancelled_without_item(CancelReason::NotDragging),
        }
    }

    /// Pointer released over the current hover target.
    pub fn release(
        &mut self,
        grid: &mut ScheduleGridModel,
        changes: &mut PendingChangeSet,
    ) -> DragResolution {
        let target = self.hover_target();
        self.release_over(target, grid, changes)
    }

    /// Pointer released over `target`: attempt the placement.
    pub fn release_over(
        &mut self,
        target: Option<CellRef>,
        grid: &mut ScheduleGridModel,
        changes: &mut PendingChangeSet,
    ) -> DragResolution {
        let Some(active) = self.active.take() else {
            return self.cancelled_without_item(CancelReason::NotDragging);
        };
        let Some(cell) = target else {
            return self.cancelled(active.item, CancelReason::NoTarget);
        };

        match self.place(&active.item, cell, grid, changes) {
            Ok((outcome, warnings)) => {
                log_changes!(self.config.verbosity, "Dropped {}: {:?}", active.item.id, outcome);
                DragResolution::Dropped { outcome, warnings }
            }
            Err(reason) => self.cancelled(active.item, reason),
        }
    }

    fn place(
        &self,
        item: &DragItem,
        cell: CellRef,
        grid: &mut ScheduleGridModel,
        changes: &mut PendingChangeSet,
    ) -> Result<(DropOutcome, Vec<ConflictResult>), CancelReason> {
        if let DragPayload::Existing(key) = &item.payload {
            if grid.locate(key) == Some(cell) {
                return Err(CancelReason::SameCell);
            }
        }

        let slot = grid
            .check_eligible(cell)
            .map_err(CancelReason::Ineligible)?
            .clone();

        let (draft, exclude) = match &item.payload {
            DragPayload::Assignment(assignment) => (
                ScheduleDraft {
                    section_id: self.config.section_id,
                    course_id: Some(assignment.course_id),
                    teacher_id: assignment.teacher_id,
                    day_of_week: cell.day,
                    start_time: slot.start,
                    end_time: slot.end,
                    classroom: assignment.classroom.clone(),
                },
                None,
            ),
            DragPayload::Existing(key) => {
                let entry = grid
                    .get(key)
                    .ok_or_else(|| CancelReason::UnknownSchedule(key.clone()))?;
                let mut draft = entry.draft.clone();
                draft.day_of_week = cell.day;
                draft.start_time = slot.start;
                draft.end_time = slot.end;
                (draft, Some(key))
            }
        };

        let conflicts = detect_conflicts(
            &ConflictCandidate::from_draft(&draft),
            &grid.entries(),
            exclude,
        );
        if conflicts.iter().any(|c| self.config.blocks(c.axis)) {
            log_checks!(
                self.config.verbosity,
                "Drop of {} blocked by {} conflict(s)",
                item.id,
                conflicts.len()
            );
            return Err(CancelReason::Conflicts(conflicts));
        }

        let outcome = match &item.payload {
            DragPayload::Assignment(_) => {
                let temp = TempSchedule {
                    local_id: changes.next_local_id(),
                    draft,
                };
                grid.place(cell, ScheduleEntry::from(&temp))
                    .map_err(CancelReason::Ineligible)?;
                let local_id = temp.local_id.clone();
                changes.record_create(temp);
                DropOutcome::Created { local_id, cell }
            }
            DragPayload::Existing(key) => {
                let patch = SchedulePatch::moved_to(cell.day, slot.start, slot.end);
                changes
                    .record_update(key, patch.clone())
                    .map_err(CancelReason::Rejected)?;
                let from = grid
                    .relocate(key, cell, &patch)
                    .map_err(CancelReason::Ineligible)?;
                DropOutcome::Moved {
                    key: key.clone(),
                    from,
                    to: cell,
                }
            }
        };

        Ok((outcome, conflicts))
    }

    fn cancelled(&self, item: DragItem, reason: CancelReason) -> DragResolution {
        log_checks!(self.config.verbosity, "Drag of {} cancelled: {:?}", item.id, reason);
        DragResolution::Cancelled {
            item: Some(item),
            reason,
        }
    }

    fn cancelled_without_item(&self, reason: CancelReason) -> DragResolution {
        DragResolution::Cancelled { item: None, reason }
    }
}
