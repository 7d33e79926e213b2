//! Sparse weekly grid of (day, slot) cells holding schedules.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::changes::{ChangeError, CommitReport, CommitSuccess, PendingChangeSet};
use crate::config::ScheduleConfig;
use crate::models::{DayOfWeek, Schedule, ScheduleEntry, SchedulePatch, ScheduleRef, TimeSlot};
use crate::time_slots::generate_time_slots;

/// Address of one grid cell: a working day and an index into the day's slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub day: DayOfWeek,
    pub slot: usize,
}

impl CellRef {
    pub fn new(day: DayOfWeek, slot: usize) -> Self {
        Self { day, slot }
    }
}

/// Why a cell cannot take a placement. Distinct from a time conflict.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlacementRejection {
    #[error("Day {0} is not a working day")]
    UnknownDay(DayOfWeek),
    #[error("Slot {0} does not exist")]
    UnknownSlot(usize),
    #[error("'{label}' is a break and cannot hold a class")]
    BreakSlot { label: String },
    #[error("Cell (day {}, slot {}) already holds a schedule", .0.day, .0.slot)]
    SlotFull(CellRef),
    #[error("Schedule {0} is not on this grid")]
    UnknownSchedule(ScheduleRef),
}

/// The weekly grid of one section.
///
/// Schedules whose start time matches no class period are kept off-grid so
/// they still take part in conflict detection.
#[derive(Clone, Debug, Default)]
pub struct ScheduleGridModel {
    slots: Vec<TimeSlot>,
    working_days: Vec<DayOfWeek>,
    cells: FxHashMap<CellRef, Vec<ScheduleEntry>>,
    off_grid: Vec<ScheduleEntry>,
}

impl ScheduleGridModel {
    pub fn new(config: &ScheduleConfig) -> Self {
        Self::from_slots(generate_time_slots(config), config.working_days.clone())
    }

    pub fn from_slots(slots: Vec<TimeSlot>, working_days: Vec<DayOfWeek>) -> Self {
        Self {
            slots,
            working_days,
            cells: FxHashMap::default(),
            off_grid: Vec::new(),
        }
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn working_days(&self) -> &[DayOfWeek] {
        &self.working_days
    }

    pub fn slot(&self, index: usize) -> Option<&TimeSlot> {
        self.slots.get(index)
    }

    pub fn schedules_for(&self, cell: CellRef) -> &[ScheduleEntry] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_slot_full(&self, cell: CellRef) -> bool {
        !self.schedules_for(cell).is_empty()
    }

    pub fn is_break(&self, cell: CellRef) -> bool {
        self.slot(cell.slot).is_some_and(|slot| slot.is_break)
    }

    /// Check whether a cell can take a new placement, returning its slot.
    pub fn check_eligible(&self, cell: CellRef) -> Result<&TimeSlot, PlacementRejection> {
        if !self.working_days.contains(&cell.day) {
            return Err(PlacementRejection::UnknownDay(cell.day));
        }
        let slot = self
            .slot(cell.slot)
            .ok_or(PlacementRejection::UnknownSlot(cell.slot))?;
        if slot.is_break {
            return Err(PlacementRejection::BreakSlot {
                label: slot.label.clone(),
            });
        }
        if self.is_slot_full(cell) {
            return Err(PlacementRejection::SlotFull(cell));
        }
        Ok(slot)
    }

    /// Put a schedule into an eligible cell. At most one schedule per cell.
    pub fn place(&mut self, cell: CellRef, entry: ScheduleEntry) -> Result<(), PlacementRejection> {
        self.check_eligible(cell)?;
        self.cells.entry(cell).or_default().push(entry);
        Ok(())
    }

    /// Take a schedule out of a cell.
    pub fn remove(&mut self, cell: CellRef, key: &ScheduleRef) -> Option<ScheduleEntry> {
        let entries = self.cells.get_mut(&cell)?;
        let index = entries.iter().position(|e| &e.key == key)?;
        let removed = entries.remove(index);
        if entries.is_empty() {
            self.cells.remove(&cell);
        }
        Some(removed)
    }

    /// Seed the grid with persisted schedules from the repository.
    ///
    /// Each schedule lands in the class period of its day that contains its
    /// start time. Authoritative data is loaded even into occupied cells.
    /// Returns how many schedules were kept off-grid.
    pub fn load(&mut self, schedules: &[Schedule]) -> usize {
        let mut off_grid = 0;
        for schedule in schedules {
            let entry = ScheduleEntry::from(schedule);
            match self.cell_for(schedule.day_of_week, schedule.start_time) {
                Some(cell) => self.cells.entry(cell).or_default().push(entry),
                None => {
                    self.off_grid.push(entry);
                    off_grid += 1;
                }
            }
        }
        off_grid
    }

    fn cell_for(&self, day: DayOfWeek, start: chrono::NaiveTime) -> Option<CellRef> {
        if !self.working_days.contains(&day) {
            return None;
        }
        self.slots
            .iter()
            .position(|slot| !slot.is_break && slot.contains(start))
            .map(|slot| CellRef::new(day, slot))
    }

    /// The whole working set (grid cells and off-grid), ordered by cell.
    pub fn entries(&self) -> Vec<ScheduleEntry> {
        let mut cells: Vec<(&CellRef, &Vec<ScheduleEntry>)> = self.cells.iter().collect();
        cells.sort_by_key(|(cell, _)| **cell);
        cells
            .into_iter()
            .flat_map(|(_, entries)| entries.iter().cloned())
            .chain(self.off_grid.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cells.values().map(Vec::len).sum::<usize>() + self.off_grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell holding a schedule; `None` if absent or off-grid.
    pub fn locate(&self, key: &ScheduleRef) -> Option<CellRef> {
        self.cells
            .iter()
            .find(|(_, entries)| entries.iter().any(|e| &e.key == key))
            .map(|(cell, _)| *cell)
    }

    pub fn get(&self, key: &ScheduleRef) -> Option<&ScheduleEntry> {
        self.cells
            .values()
            .flatten()
            .chain(self.off_grid.iter())
            .find(|e| &e.key == key)
    }

    fn get_mut(&mut self, key: &ScheduleRef) -> Option<&mut ScheduleEntry> {
        self.cells
            .values_mut()
            .flatten()
            .chain(self.off_grid.iter_mut())
            .find(|e| &e.key == key)
    }

    fn take(&mut self, key: &ScheduleRef) -> Option<ScheduleEntry> {
        if let Some(cell) = self.locate(key) {
            return self.remove(cell, key);
        }
        let index = self.off_grid.iter().position(|e| &e.key == key)?;
        Some(self.off_grid.remove(index))
    }

    /// Apply a field patch in place without moving the schedule between cells.
    pub fn update(&mut self, key: &ScheduleRef, patch: &SchedulePatch) -> bool {
        match self.get_mut(key) {
            Some(entry) => {
                patch.apply_to(&mut entry.draft);
                true
            }
            None => false,
        }
    }

    /// Move a schedule into another eligible cell, patching its fields.
    ///
    /// Returns the cell it left (`None` if it was off-grid).
    pub fn relocate(
        &mut self,
        key: &ScheduleRef,
        to: CellRef,
        patch: &SchedulePatch,
    ) -> Result<Option<CellRef>, PlacementRejection> {
        if self.get(key).is_none() {
            return Err(PlacementRejection::UnknownSchedule(key.clone()));
        }
        self.check_eligible(to)?;
        let from = self.locate(key);
        let mut entry = self
            .take(key)
            .ok_or_else(|| PlacementRejection::UnknownSchedule(key.clone()))?;
        patch.apply_to(&mut entry.draft);
        self.cells.entry(to).or_default().push(entry);
        Ok(from)
    }

    /// Re-key a pending schedule under its server id.
    pub fn promote(&mut self, local_id: &str, id: i64) -> bool {
        match self.get_mut(&ScheduleRef::Pending(local_id.to_string())) {
            Some(entry) => {
                entry.key = ScheduleRef::Persisted(id);
                true
            }
            None => false,
        }
    }

    /// Remove a schedule from the grid and record its deletion.
    ///
    /// Deleting a pending schedule just drops its staged create.
    pub fn delete_entry(
        &mut self,
        key: &ScheduleRef,
        changes: &mut PendingChangeSet,
    ) -> Result<ScheduleEntry, ChangeError> {
        if self.get(key).is_none() {
            return Err(ChangeError::UnknownTarget(key.clone()));
        }
        changes.record_delete(key)?;
        self.take(key)
            .ok_or_else(|| ChangeError::UnknownTarget(key.clone()))
    }

    /// Stage a reversible deletion; the schedule stays visible until commit.
    pub fn mark_entry_for_deletion(
        &mut self,
        key: &ScheduleRef,
        changes: &mut PendingChangeSet,
    ) -> Result<(), ChangeError> {
        if self.get(key).is_none() {
            return Err(ChangeError::UnknownTarget(key.clone()));
        }
        changes.mark_for_deletion(key)
    }

    /// Undo a pending schedule before commit: gone from grid and change set.
    pub fn undo_pending(
        &mut self,
        local_id: &str,
        changes: &mut PendingChangeSet,
    ) -> Result<ScheduleEntry, ChangeError> {
        let key = ScheduleRef::Pending(local_id.to_string());
        changes.discard(local_id)?;
        self.take(&key).ok_or(ChangeError::UnknownTarget(key))
    }

    /// Bring the grid in line with what the persistence layer accepted.
    ///
    /// Promoted local ids are released from the change set, since the grid
    /// no longer refers to them.
    pub fn apply_commit(&mut self, report: &CommitReport, changes: &mut PendingChangeSet) {
        for success in report.successes() {
            match success {
                CommitSuccess::Created { local_id, schedule } => {
                    let key = ScheduleRef::Pending(local_id.clone());
                    if let Some(entry) = self.get_mut(&key) {
                        entry.key = ScheduleRef::Persisted(schedule.id);
                        entry.draft = schedule.to_draft();
                        changes.forget_resolved(local_id);
                    }
                }
                CommitSuccess::Updated(schedule) => {
                    if let Some(entry) = self.get_mut(&ScheduleRef::Persisted(schedule.id)) {
                        entry.draft = schedule.to_draft();
                    }
                }
                CommitSuccess::Deleted(id) => {
                    self.take(&ScheduleRef::Persisted(*id));
                }
                CommitSuccess::Discarded { local_id } => {
                    self.take(&ScheduleRef::Pending(local_id.clone()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakSlot;
    use crate::models::{ScheduleDraft, TempSchedule};
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    /// Mon-Fri, 07:00-09:45, 45-minute periods, recess 08:30-09:00 (slot 2).
    fn grid() -> ScheduleGridModel {
        let config = ScheduleConfig::new(
            None,
            Some(t(7, 0)),
            Some(t(9, 45)),
            Some(45),
            Some(vec![BreakSlot::new(t(8, 30), t(9, 0), "Recess".into())]),
        );
        ScheduleGridModel::new(&config)
    }

    fn pending(local_id: &str, day: DayOfWeek, start: NaiveTime, end: NaiveTime) -> ScheduleEntry {
        ScheduleEntry::from(&TempSchedule {
            local_id: local_id.into(),
            draft: ScheduleDraft {
                section_id: 1,
                course_id: Some(3),
                teacher_id: Some(5),
                day_of_week: day,
                start_time: start,
                end_time: end,
                classroom: None,
            },
        })
    }

    fn persisted(id: i64, day: DayOfWeek, start: NaiveTime, end: NaiveTime) -> Schedule {
        Schedule::new(id, 1, 3, day, start, end, Some(5), None)
    }

    #[test]
    fn test_place_and_query() {
        let mut grid = grid();
        let cell = CellRef::new(1, 0);
        assert!(!grid.is_slot_full(cell));

        grid.place(cell, pending("temp-1", 1, t(7, 0), t(7, 45))).unwrap();
        assert!(grid.is_slot_full(cell));
        assert_eq!(grid.schedules_for(cell).len(), 1);
        assert_eq!(grid.locate(&ScheduleRef::Pending("temp-1".into())), Some(cell));
    }

    #[test]
    fn test_full_cell_rejects_second_placement() {
        let mut grid = grid();
        let cell = CellRef::new(1, 0);
        grid.place(cell, pending("temp-1", 1, t(7, 0), t(7, 45))).unwrap();

        let result = grid.place(cell, pending("temp-2", 1, t(7, 0), t(7, 45)));
        assert_eq!(result, Err(PlacementRejection::SlotFull(cell)));
        assert_eq!(grid.schedules_for(cell).len(), 1);
    }

    #[test]
    fn test_break_and_unknown_cells_are_ineligible() {
        let grid = grid();
        assert!(grid.is_break(CellRef::new(1, 2)));
        assert_eq!(
            grid.check_eligible(CellRef::new(1, 2)),
            Err(PlacementRejection::BreakSlot {
                label: "Recess".into()
            })
        );
        assert_eq!(
            grid.check_eligible(CellRef::new(6, 0)),
            Err(PlacementRejection::UnknownDay(6))
        );
        assert_eq!(
            grid.check_eligible(CellRef::new(1, 9)),
            Err(PlacementRejection::UnknownSlot(9))
        );
    }

    #[test]
    fn test_remove_empties_cell() {
        let mut grid = grid();
        let cell = CellRef::new(2, 1);
        let key = ScheduleRef::Pending("temp-1".into());
        grid.place(cell, pending("temp-1", 2, t(7, 45), t(8, 30))).unwrap();

        assert!(grid.remove(cell, &ScheduleRef::Persisted(1)).is_none());
        assert!(grid.remove(cell, &key).is_some());
        assert!(!grid.is_slot_full(cell));
        assert!(grid.is_empty());
    }

    #[test]
    fn test_load_maps_by_start_time_and_keeps_off_grid() {
        let mut grid = grid();
        let off_grid = grid.load(&[
            persisted(1, 1, t(7, 0), t(7, 45)),
            persisted(2, 1, t(7, 50), t(8, 30)),
            persisted(3, 1, t(8, 40), t(8, 55)),
            persisted(4, 6, t(7, 0), t(7, 45)),
        ]);

        assert_eq!(off_grid, 2);
        assert_eq!(grid.locate(&ScheduleRef::Persisted(1)), Some(CellRef::new(1, 0)));
        assert_eq!(grid.locate(&ScheduleRef::Persisted(2)), Some(CellRef::new(1, 1)));
        assert_eq!(grid.locate(&ScheduleRef::Persisted(3)), None);
        assert!(grid.get(&ScheduleRef::Persisted(3)).is_some());
        assert_eq!(grid.entries().len(), 4);
    }

    #[test]
    fn test_promote_rekeys_pending_entry() {
        let mut grid = grid();
        grid.place(CellRef::new(1, 0), pending("temp-1", 1, t(7, 0), t(7, 45)))
            .unwrap();

        assert!(grid.promote("temp-1", 42));
        assert!(grid.get(&ScheduleRef::Pending("temp-1".into())).is_none());
        assert_eq!(
            grid.locate(&ScheduleRef::Persisted(42)),
            Some(CellRef::new(1, 0))
        );
        assert!(!grid.promote("temp-1", 43));
    }

    #[test]
    fn test_update_patches_in_place() {
        let mut grid = grid();
        grid.load(&[persisted(1, 1, t(7, 0), t(7, 45))]);
        let key = ScheduleRef::Persisted(1);
        let patch = SchedulePatch {
            classroom: Some(Some("B-2".into())),
            ..SchedulePatch::default()
        };

        assert!(grid.update(&key, &patch));
        assert_eq!(grid.get(&key).unwrap().draft.classroom.as_deref(), Some("B-2"));
    }

    #[test]
    fn test_relocate_moves_between_cells() {
        let mut grid = grid();
        grid.load(&[persisted(1, 1, t(7, 0), t(7, 45))]);
        let key = ScheduleRef::Persisted(1);
        let patch = SchedulePatch::moved_to(3, t(9, 0), t(9, 45));

        let from = grid.relocate(&key, CellRef::new(3, 3), &patch).unwrap();
        assert_eq!(from, Some(CellRef::new(1, 0)));
        assert!(!grid.is_slot_full(CellRef::new(1, 0)));
        let moved = &grid.schedules_for(CellRef::new(3, 3))[0];
        assert_eq!(moved.draft.day_of_week, 3);
        assert_eq!(moved.draft.start_time, t(9, 0));
    }

    #[test]
    fn test_relocate_unknown_schedule_fails() {
        let mut grid = grid();
        let key = ScheduleRef::Persisted(1);
        let patch = SchedulePatch::moved_to(3, t(9, 0), t(9, 45));
        assert_eq!(
            grid.relocate(&key, CellRef::new(3, 3), &patch),
            Err(PlacementRejection::UnknownSchedule(key))
        );
        assert!(grid.is_empty());
    }

    #[test]
    fn test_apply_commit_releases_promoted_ids() {
        let mut grid = grid();
        let mut changes = PendingChangeSet::new();
        let local_id = changes.next_local_id();
        let entry = pending(&local_id, 1, t(7, 0), t(7, 45));
        changes.record_create(TempSchedule {
            local_id: local_id.clone(),
            draft: entry.draft.clone(),
        });
        grid.place(CellRef::new(1, 0), entry).unwrap();

        let report = changes.commit(&mut IdStore, &crate::changes::CancelFlag::new());
        assert_eq!(changes.resolved_len(), 1);
        grid.apply_commit(&report, &mut changes);

        assert_eq!(changes.resolved_len(), 0);
        assert_eq!(
            grid.locate(&ScheduleRef::Persisted(50)),
            Some(CellRef::new(1, 0))
        );
    }

    /// Store that persists every create as schedule 50.
    struct IdStore;

    impl crate::changes::SchedulePersistence for IdStore {
        fn create(
            &mut self,
            draft: &ScheduleDraft,
        ) -> Result<Schedule, crate::changes::PersistenceError> {
            Schedule::from_draft(50, draft)
                .ok_or_else(|| crate::changes::PersistenceError::new("incomplete"))
        }

        fn update(
            &mut self,
            id: i64,
            _patch: &SchedulePatch,
        ) -> Result<Schedule, crate::changes::PersistenceError> {
            Err(crate::changes::PersistenceError::new(format!("no schedule {}", id)))
        }

        fn delete(&mut self, _id: i64) -> Result<(), crate::changes::PersistenceError> {
            Ok(())
        }
    }

    #[test]
    fn test_apply_commit_promotes_and_removes() {
        use crate::changes::{CommitOutcome, PendingChange};

        let mut grid = grid();
        grid.load(&[persisted(1, 1, t(7, 0), t(7, 45))]);
        let entry = pending("temp-1", 2, t(7, 0), t(7, 45));
        let temp = TempSchedule {
            local_id: "temp-1".into(),
            draft: entry.draft.clone(),
        };
        grid.place(CellRef::new(2, 0), entry).unwrap();

        let report = CommitReport {
            outcomes: vec![
                CommitOutcome {
                    change: PendingChange::Create(temp.clone()),
                    result: Ok(CommitSuccess::Created {
                        local_id: "temp-1".into(),
                        schedule: Schedule::from_draft(77, &temp.draft).unwrap(),
                    }),
                },
                CommitOutcome {
                    change: PendingChange::Delete {
                        target: ScheduleRef::Persisted(1),
                        mode: crate::changes::DeleteMode::Deferred,
                    },
                    result: Ok(CommitSuccess::Deleted(1)),
                },
            ],
            network_calls: 2,
        };
        grid.apply_commit(&report, &mut PendingChangeSet::new());

        assert_eq!(
            grid.locate(&ScheduleRef::Persisted(77)),
            Some(CellRef::new(2, 0))
        );
        assert!(grid.get(&ScheduleRef::Persisted(1)).is_none());
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_delete_pending_entry_leaves_no_change() {
        let mut grid = grid();
        let mut changes = PendingChangeSet::new();
        let local_id = changes.next_local_id();
        let entry = pending(&local_id, 1, t(7, 0), t(7, 45));
        changes.record_create(TempSchedule {
            local_id: local_id.clone(),
            draft: entry.draft.clone(),
        });
        grid.place(CellRef::new(1, 0), entry).unwrap();

        grid.delete_entry(&ScheduleRef::Pending(local_id), &mut changes)
            .unwrap();
        assert!(grid.is_empty());
        assert!(changes.is_empty());
    }

    #[test]
    fn test_delete_unknown_entry_fails() {
        let mut grid = grid();
        let mut changes = PendingChangeSet::new();
        let result = grid.delete_entry(&ScheduleRef::Persisted(9), &mut changes);
        assert_eq!(
            result,
            Err(ChangeError::UnknownTarget(ScheduleRef::Persisted(9)))
        );
    }
}
