//! Staged schedule changes and their commit against the persistence layer.
//!
//! Changes are recorded in order while the user edits the grid. Operations
//! on schedules that only exist locally are folded into their pending create,
//! so nothing that was never persisted produces a network call.

use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Schedule, ScheduleDraft, SchedulePatch, ScheduleRef, TempSchedule};
use crate::{log_changes, log_checks, log_debug};

/// Errors raised while recording a change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChangeError {
    #[error("No schedule {0} in the working set")]
    UnknownTarget(ScheduleRef),
    #[error("Schedule {0} is already deleted")]
    AlreadyDeleted(ScheduleRef),
    #[error("Schedule {0} is not marked for deletion")]
    NotMarked(ScheduleRef),
    #[error("Schedule {0} is marked for deletion; unmark it before editing")]
    MarkedForDeletion(ScheduleRef),
}

/// Failure reported by the persistence layer for a single operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct PersistenceError {
    pub message: String,
}

impl PersistenceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Why one operation of a commit did not go through.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Pending schedule {0} has no course assigned")]
    IncompleteDraft(String),
    #[error("Pending schedule {0} has no server id yet")]
    UnresolvedTemp(String),
    #[error("Commit cancelled before this change was sent")]
    Cancelled,
}

/// External store for schedules. Every call succeeds or fails on its own.
pub trait SchedulePersistence {
    fn create(&mut self, draft: &ScheduleDraft) -> Result<Schedule, PersistenceError>;
    fn update(&mut self, id: i64, patch: &SchedulePatch) -> Result<Schedule, PersistenceError>;
    fn delete(&mut self, id: i64) -> Result<(), PersistenceError>;
}

/// Cooperative cancellation for a commit in progress.
///
/// Clones share the same flag; it is checked before each operation is sent.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteMode {
    /// Final; cannot be taken back before commit.
    Immediate,
    /// Marked only; reversible until commit.
    Deferred,
}

/// One staged operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingChange {
    Create(TempSchedule),
    Update {
        target: ScheduleRef,
        patch: SchedulePatch,
    },
    Delete {
        target: ScheduleRef,
        mode: DeleteMode,
    },
}

impl PendingChange {
    pub fn target(&self) -> ScheduleRef {
        match self {
            PendingChange::Create(temp) => ScheduleRef::Pending(temp.local_id.clone()),
            PendingChange::Update { target, .. } | PendingChange::Delete { target, .. } => {
                target.clone()
            }
        }
    }
}

/// What a successful operation did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitSuccess {
    Created { local_id: String, schedule: Schedule },
    Updated(Schedule),
    Deleted(i64),
    /// Pending create dropped without a network call (marked for deletion).
    Discarded { local_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitOutcome {
    pub change: PendingChange,
    pub result: Result<CommitSuccess, CommitError>,
}

/// Per-operation results of one commit. There is no overall verdict.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub outcomes: Vec<CommitOutcome>,
    /// Calls actually made against the persistence layer
    pub network_calls: usize,
}

impl CommitReport {
    pub fn successes(&self) -> impl Iterator<Item = &CommitSuccess> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PendingChange, &CommitError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.change, e)))
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Server id assigned to a pending schedule during this commit.
    pub fn id_for(&self, local_id: &str) -> Option<i64> {
        self.successes().find_map(|s| match s {
            CommitSuccess::Created { local_id: l, schedule } if l == local_id => Some(schedule.id),
            _ => None,
        })
    }
}

/// Batch of uncommitted creates, updates and deletes.
#[derive(Clone, Debug, Default)]
pub struct PendingChangeSet {
    changes: Vec<PendingChange>,
    next_local: u64,
    /// local id -> server id, for pending refs that outlive their create.
    /// Entries are dropped by `forget_resolved` once the owner has re-keyed them.
    resolved: FxHashMap<String, i64>,
    verbosity: u8,
}

impl PendingChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbosity(verbosity: u8) -> Self {
        Self {
            verbosity,
            ..Self::default()
        }
    }

    /// Allocate a fresh local id for a pending schedule.
    pub fn next_local_id(&mut self) -> String {
        self.next_local += 1;
        format!("temp-{}", self.next_local)
    }

    pub fn changes(&self) -> &[PendingChange] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Server id of a schedule, if it has one.
    pub fn resolve(&self, target: &ScheduleRef) -> Option<i64> {
        match target {
            ScheduleRef::Persisted(id) => Some(*id),
            ScheduleRef::Pending(local_id) => self.resolved.get(local_id).copied(),
        }
    }

    /// Drop the server id kept for a committed pending schedule.
    pub fn forget_resolved(&mut self, local_id: &str) -> Option<i64> {
        self.resolved.remove(local_id)
    }

    pub fn resolved_len(&self) -> usize {
        self.resolved.len()
    }

    fn create_index(&self, local_id: &str) -> Option<usize> {
        self.changes
            .iter()
            .position(|c| matches!(c, PendingChange::Create(temp) if temp.local_id == local_id))
    }

    /// Map a pending ref whose create was already committed onto its server id.
    fn normalize(&self, target: &ScheduleRef) -> Result<ScheduleRef, ChangeError> {
        match target {
            ScheduleRef::Pending(local_id) if self.create_index(local_id).is_none() => self
                .resolved
                .get(local_id)
                .map(|id| ScheduleRef::Persisted(*id))
                .ok_or_else(|| ChangeError::UnknownTarget(target.clone())),
            _ => Ok(target.clone()),
        }
    }

    fn delete_index(&self, target: &ScheduleRef) -> Option<usize> {
        self.changes
            .iter()
            .position(|c| matches!(c, PendingChange::Delete { target: t, .. } if t == target))
    }

    pub fn is_marked_for_deletion(&self, target: &ScheduleRef) -> bool {
        self.delete_index(target).is_some()
    }

    pub fn record_create(&mut self, temp: TempSchedule) {
        log_changes!(self.verbosity, "Staged create {}", temp.local_id);
        self.changes.push(PendingChange::Create(temp));
    }

    /// Stage an update. Updates of pending schedules fold into their create;
    /// repeated updates of one persisted schedule coalesce.
    pub fn record_update(
        &mut self,
        target: &ScheduleRef,
        patch: SchedulePatch,
    ) -> Result<(), ChangeError> {
        let target = self.normalize(target)?;

        if let ScheduleRef::Pending(local_id) = &target {
            if let Some(index) = self.create_index(local_id) {
                if let PendingChange::Create(temp) = &mut self.changes[index] {
                    patch.apply_to(&mut temp.draft);
                }
                log_debug!(self.verbosity, "Folded update into create {}", local_id);
            }
            return Ok(());
        }

        // A deleted schedule would be gone before its update is sent.
        match self.delete_index(&target).map(|i| &self.changes[i]) {
            Some(PendingChange::Delete {
                mode: DeleteMode::Immediate,
                ..
            }) => return Err(ChangeError::AlreadyDeleted(target)),
            Some(PendingChange::Delete {
                mode: DeleteMode::Deferred,
                ..
            }) => return Err(ChangeError::MarkedForDeletion(target)),
            _ => {}
        }

        let existing = self.changes.iter_mut().find_map(|c| match c {
            PendingChange::Update { target: t, patch } if *t == target => Some(patch),
            _ => None,
        });
        match existing {
            Some(staged) => staged.merge(patch),
            None => {
                log_changes!(self.verbosity, "Staged update of {}", target);
                self.changes.push(PendingChange::Update { target, patch });
            }
        }
        Ok(())
    }

    /// Stage a final deletion.
    ///
    /// A schedule that only exists as a pending create is dropped outright
    /// and never reaches the persistence layer.
    pub fn record_delete(&mut self, target: &ScheduleRef) -> Result<(), ChangeError> {
        let target = self.normalize(target)?;

        if let ScheduleRef::Pending(local_id) = &target {
            self.changes.retain(|c| c.target() != target);
            log_changes!(self.verbosity, "Dropped pending create {}", local_id);
            return Ok(());
        }

        self.changes
            .retain(|c| !matches!(c, PendingChange::Update { target: t, .. } if *t == target));
        match self.delete_index(&target) {
            Some(index) => {
                self.changes[index] = PendingChange::Delete {
                    target,
                    mode: DeleteMode::Immediate,
                };
            }
            None => {
                log_changes!(self.verbosity, "Staged delete of {}", target);
                self.changes.push(PendingChange::Delete {
                    target,
                    mode: DeleteMode::Immediate,
                });
            }
        }
        Ok(())
    }

    /// Stage a reversible deletion.
    pub fn mark_for_deletion(&mut self, target: &ScheduleRef) -> Result<(), ChangeError> {
        let target = self.normalize(target)?;
        if self.delete_index(&target).is_none() {
            log_changes!(self.verbosity, "Marked {} for deletion", target);
            self.changes.push(PendingChange::Delete {
                target,
                mode: DeleteMode::Deferred,
            });
        }
        Ok(())
    }

    /// Take back a deferred deletion.
    pub fn unmark_for_deletion(&mut self, target: &ScheduleRef) -> Result<(), ChangeError> {
        let target = self.normalize(target)?;
        let index = self
            .changes
            .iter()
            .position(|c| match c {
                PendingChange::Delete {
                    target: t,
                    mode: DeleteMode::Deferred,
                } => *t == target,
                _ => false,
            })
            .ok_or_else(|| ChangeError::NotMarked(target.clone()))?;
        self.changes.remove(index);
        log_changes!(self.verbosity, "Unmarked {} for deletion", target);
        Ok(())
    }

    /// Undo a pending create together with everything staged against it.
    pub fn discard(&mut self, local_id: &str) -> Result<TempSchedule, ChangeError> {
        let index = self
            .create_index(local_id)
            .ok_or_else(|| ChangeError::UnknownTarget(ScheduleRef::Pending(local_id.to_string())))?;
        let PendingChange::Create(temp) = self.changes.remove(index) else {
            return Err(ChangeError::UnknownTarget(ScheduleRef::Pending(
                local_id.to_string(),
            )));
        };
        let target = ScheduleRef::Pending(local_id.to_string());
        self.changes.retain(|c| c.target() != target);
        log_changes!(self.verbosity, "Discarded pending create {}", local_id);
        Ok(temp)
    }

    /// Send staged changes to the persistence layer.
    ///
    /// Creates go first so later operations can use their server ids; the
    /// rest follow in recording order. Each operation succeeds or fails on
    /// its own, nothing is rolled back, and afterwards the set holds exactly
    /// the operations that did not go through.
    pub fn commit<P>(&mut self, persistence: &mut P, cancel: &CancelFlag) -> CommitReport
    where
        P: SchedulePersistence + ?Sized,
    {
        let staged: Vec<(usize, PendingChange)> =
            std::mem::take(&mut self.changes).into_iter().enumerate().collect();

        let discarded: FxHashSet<String> = staged
            .iter()
            .filter_map(|(_, c)| match c {
                PendingChange::Delete {
                    target: ScheduleRef::Pending(local_id),
                    mode: DeleteMode::Deferred,
                } => Some(local_id.clone()),
                _ => None,
            })
            .collect();

        let (creates, others): (Vec<_>, Vec<_>) = staged
            .into_iter()
            .partition(|(_, c)| matches!(c, PendingChange::Create(_)));

        let mut report = CommitReport::default();
        let mut retained: Vec<(usize, PendingChange)> = Vec::new();

        for (index, change) in creates.into_iter().chain(others) {
            // Consumed by the discarded create.
            if let PendingChange::Delete {
                target: ScheduleRef::Pending(local_id),
                ..
            } = &change
            {
                if discarded.contains(local_id) {
                    continue;
                }
            }

            let result = match &change {
                // No network call, so cancellation does not apply.
                PendingChange::Create(temp) if discarded.contains(&temp.local_id) => {
                    Ok(CommitSuccess::Discarded {
                        local_id: temp.local_id.clone(),
                    })
                }
                _ if cancel.is_cancelled() => Err(CommitError::Cancelled),
                _ => self.send(&change, persistence, &mut report.network_calls),
            };

            match &result {
                Ok(success) => log_changes!(self.verbosity, "Committed {:?}", success),
                Err(err) => {
                    log_checks!(self.verbosity, "Change to {} failed: {}", change.target(), err);
                    retained.push((index, change.clone()));
                }
            }
            report.outcomes.push(CommitOutcome { change, result });
        }

        retained.sort_by_key(|(index, _)| *index);
        self.changes = retained.into_iter().map(|(_, c)| c).collect();
        report
    }

    fn send<P>(
        &mut self,
        change: &PendingChange,
        persistence: &mut P,
        network_calls: &mut usize,
    ) -> Result<CommitSuccess, CommitError>
    where
        P: SchedulePersistence + ?Sized,
    {
        match change {
            PendingChange::Create(temp) => {
                if !temp.draft.is_complete() {
                    return Err(CommitError::IncompleteDraft(temp.local_id.clone()));
                }
                *network_calls += 1;
                let schedule = persistence.create(&temp.draft)?;
                log_debug!(
                    self.verbosity,
                    "{} persisted as #{}",
                    temp.local_id,
                    schedule.id
                );
                self.resolved.insert(temp.local_id.clone(), schedule.id);
                Ok(CommitSuccess::Created {
                    local_id: temp.local_id.clone(),
                    schedule,
                })
            }
            PendingChange::Update { target, patch } => {
                let id = self.resolve_for_commit(target)?;
                *network_calls += 1;
                Ok(CommitSuccess::Updated(persistence.update(id, patch)?))
            }
            PendingChange::Delete { target, .. } => {
                let id = self.resolve_for_commit(target)?;
                *network_calls += 1;
                persistence.delete(id)?;
                Ok(CommitSuccess::Deleted(id))
            }
        }
    }

    fn resolve_for_commit(&self, target: &ScheduleRef) -> Result<i64, CommitError> {
        self.resolve(target)
            .ok_or_else(|| CommitError::UnresolvedTemp(target.to_string()))
    }
}
