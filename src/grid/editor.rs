use super::autosave::{AutosaveSettings, Poll, SaveBatch, SaveChange, SaveTicket, SaveTrigger, Scheduler};
use super::cell::{CellKey, Mark, Session};
use super::pending::PendingSet;
use super::reducer::{self, EditOutcome, PasteOutcome};
use super::status::SaveStatus;
use super::store::{CellStore, GridSnapshot};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EditorError {
    #[error("no attendance grid is open")]
    NoGrid,
    #[error("a save is already in flight (batch {0})")]
    SaveInFlight(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// The grid was closed or reopened since the batch was dispatched.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridIdentity {
    pub class_id: String,
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellView {
    pub student_id: String,
    pub day: u32,
    pub session: Session,
    pub value: Mark,
    pub original_value: Mark,
    pub is_modified: bool,
    pub is_saving: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTally {
    pub student_id: String,
    pub absent: u32,
    pub excused: u32,
}

/// Everything tied to one loaded class/month. Dropping it drops its timers
/// and unsaved edits with it.
#[derive(Debug)]
pub struct GridSession {
    identity: GridIdentity,
    generation: u64,
    store: CellStore,
    pending: PendingSet,
    scheduler: Scheduler,
    in_flight: Vec<SaveChange>,
}

impl GridSession {
    pub fn identity(&self) -> &GridIdentity {
        &self.identity
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn store(&self) -> &CellStore {
        &self.store
    }

    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    pub fn status(&self) -> SaveStatus {
        SaveStatus::project(
            self.scheduler.in_flight().is_some(),
            self.scheduler.showing_saved(),
            self.pending.len(),
        )
    }

    pub fn cell(&self, key: &CellKey) -> Option<CellView> {
        self.store.get(key).map(|c| CellView {
            student_id: key.student_id.clone(),
            day: key.day,
            session: key.session,
            value: c.value,
            original_value: c.original_value,
            is_modified: c.is_modified(),
            is_saving: c.is_saving,
            error: c.error.clone(),
        })
    }

    pub fn cells(&self) -> Vec<CellView> {
        self.store
            .iter()
            .filter_map(|(k, _)| self.cell(k))
            .collect()
    }

    pub fn tallies(&self) -> Vec<StudentTally> {
        let mut out: Vec<StudentTally> = self
            .store
            .roster()
            .iter()
            .map(|id| StudentTally {
                student_id: id.clone(),
                ..StudentTally::default()
            })
            .collect();
        for (key, cell) in self.store.iter() {
            let Some(idx) = self.store.roster_position(&key.student_id) else {
                continue;
            };
            match cell.value {
                Mark::Absent => out[idx].absent += 1,
                Mark::Excused => out[idx].excused += 1,
                Mark::Present => {}
            }
        }
        out
    }

    fn dispatch(&mut self, trigger: SaveTrigger) -> SaveBatch {
        let changes: Vec<SaveChange> = self
            .pending
            .iter()
            .filter_map(|key| {
                self.store.get(key).map(|c| SaveChange {
                    student_id: key.student_id.clone(),
                    day: key.day,
                    session: key.session,
                    value: c.value,
                })
            })
            .collect();
        for change in &changes {
            let key = CellKey::new(change.student_id.clone(), change.day, change.session);
            if let Some(cell) = self.store.get_mut(&key) {
                cell.is_saving = true;
            }
        }
        let ticket = self.scheduler.begin(self.generation);
        self.in_flight = changes.clone();
        debug!(
            batch = ticket.batch_id,
            changes = changes.len(),
            ?trigger,
            "dispatching attendance batch"
        );
        SaveBatch {
            ticket,
            trigger,
            changes,
        }
    }

    fn settle(&mut self, result: Result<(), String>, now: Instant) {
        let submitted = std::mem::take(&mut self.in_flight);
        let succeeded = result.is_ok();
        for change in submitted {
            let key = CellKey::new(change.student_id, change.day, change.session);
            let Some(cell) = self.store.get_mut(&key) else {
                continue;
            };
            cell.is_saving = false;
            match &result {
                Ok(()) => {
                    // A newer edit may have moved the value on; it stays pending.
                    cell.original_value = change.value;
                    cell.error = None;
                }
                Err(message) => cell.error = Some(message.clone()),
            }
            let modified = cell.is_modified();
            self.pending.track(&key, modified);
        }
        self.scheduler.finish(succeeded, !self.pending.is_empty(), now);
    }
}

/// Owner of the currently open grid, if any.
#[derive(Debug, Default)]
pub struct AttendanceEditor {
    next_generation: u64,
    session: Option<GridSession>,
}

impl AttendanceEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever grid was open. Unsaved edits of the old grid are dropped.
    pub fn open(&mut self, snapshot: &GridSnapshot, settings: AutosaveSettings) -> &GridSession {
        self.close();
        self.next_generation += 1;
        let session = GridSession {
            identity: GridIdentity {
                class_id: snapshot.class_id.clone(),
                year: snapshot.year,
                month: snapshot.month,
            },
            generation: self.next_generation,
            store: CellStore::initialize(snapshot),
            pending: PendingSet::default(),
            scheduler: Scheduler::new(settings),
            in_flight: Vec::new(),
        };
        info!(
            class_id = %snapshot.class_id,
            year = snapshot.year,
            month = snapshot.month,
            cells = session.store.len(),
            generation = session.generation,
            "attendance grid opened"
        );
        self.session.insert(session)
    }

    /// Returns how many pending edits were discarded.
    pub fn close(&mut self) -> Option<usize> {
        let mut session = self.session.take()?;
        let discarded = session.pending.clear();
        if discarded > 0 {
            warn!(
                class_id = %session.identity.class_id,
                discarded,
                "closing attendance grid with unsaved edits"
            );
        }
        Some(discarded)
    }

    pub fn session(&self) -> Option<&GridSession> {
        self.session.as_ref()
    }

    fn session_mut(&mut self) -> Result<&mut GridSession, EditorError> {
        self.session.as_mut().ok_or(EditorError::NoGrid)
    }

    pub fn status(&self) -> Option<SaveStatus> {
        self.session.as_ref().map(|s| s.status())
    }

    pub fn set_cell(
        &mut self,
        student_id: &str,
        day: u32,
        session: Session,
        raw_input: &str,
        now: Instant,
    ) -> Result<EditOutcome, EditorError> {
        let grid = self.session_mut()?;
        let outcome = reducer::set_cell(
            &mut grid.store,
            &mut grid.pending,
            student_id,
            day,
            session,
            raw_input,
        );
        if outcome.changed() {
            grid.scheduler.note_edit(now);
        }
        Ok(outcome)
    }

    pub fn paste(
        &mut self,
        anchor_student_id: &str,
        anchor_day: u32,
        session: Session,
        text: &str,
        now: Instant,
    ) -> Result<PasteOutcome, EditorError> {
        let grid = self.session_mut()?;
        let outcome = reducer::paste_block(
            &mut grid.store,
            &mut grid.pending,
            anchor_student_id,
            anchor_day,
            session,
            text,
        );
        if outcome.changed() {
            grid.scheduler.note_edit(now);
        }
        Ok(outcome)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.session.as_ref().and_then(|s| s.scheduler.next_deadline())
    }

    /// Advances timers. Returns a batch when the debounce window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<SaveBatch> {
        let grid = self.session.as_mut()?;
        match grid.scheduler.poll(now, !grid.pending.is_empty()) {
            Poll::Flush => Some(grid.dispatch(SaveTrigger::Auto)),
            Poll::Nothing => None,
        }
    }

    /// Manual save: dispatches every pending cell now, ignoring the debounce.
    pub fn flush(&mut self) -> Result<Option<SaveBatch>, EditorError> {
        let grid = self.session_mut()?;
        if let Some(ticket) = grid.scheduler.in_flight() {
            return Err(EditorError::SaveInFlight(ticket.batch_id));
        }
        if grid.pending.is_empty() {
            return Ok(None);
        }
        Ok(Some(grid.dispatch(SaveTrigger::Manual)))
    }

    pub fn complete_save(
        &mut self,
        ticket: SaveTicket,
        result: Result<(), String>,
        now: Instant,
    ) -> Completion {
        let Some(grid) = self
            .session
            .as_mut()
            .filter(|g| g.scheduler.in_flight() == Some(ticket))
        else {
            debug!(
                generation = ticket.generation,
                batch = ticket.batch_id,
                "discarding stale save completion"
            );
            return Completion::Stale;
        };
        if let Err(message) = &result {
            warn!(
                batch = ticket.batch_id,
                error = %message,
                pending = grid.pending.len(),
                "attendance save failed; cells stay pending"
            );
        }
        grid.settle(result, now);
        Completion::Applied
    }
}
