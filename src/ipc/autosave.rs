//! Bridges the editor's save batches to the workspace database.
//!
//! The main loop asks for a due job, runs it off the loop, and feeds the
//! result back with [`apply`]. Manual saves run the same job inline.

use super::types::{AppState, SharedDb};
use crate::grid::editor::GridIdentity;
use crate::grid::{Completion, SaveBatch, SaveTicket, SaveTrigger};
use crate::persist::{self, SaveOutcome};
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct SaveJob {
    batch: SaveBatch,
    grid: GridIdentity,
    db: Option<SharedDb>,
}

#[derive(Debug, Clone)]
pub struct SaveDone {
    pub ticket: SaveTicket,
    pub trigger: SaveTrigger,
    pub result: Result<SaveOutcome, String>,
}

impl SaveJob {
    pub fn new(state: &AppState, batch: SaveBatch) -> Option<Self> {
        let grid = state.editor.session()?.identity().clone();
        Some(Self {
            batch,
            grid,
            db: state.db.clone(),
        })
    }

    pub fn ticket(&self) -> SaveTicket {
        self.batch.ticket
    }

    /// Blocking: holds the database lock for the whole batch.
    pub fn run(self) -> SaveDone {
        let result = match &self.db {
            None => Err("no workspace selected".to_string()),
            Some(db) => match db.lock() {
                Err(_) => Err("database lock poisoned".to_string()),
                Ok(conn) => persist::bulk_save(
                    &conn,
                    &self.grid.class_id,
                    self.grid.month,
                    self.grid.year,
                    &self.batch.changes,
                )
                .map_err(|e| format!("{e:#}")),
            },
        };
        SaveDone {
            ticket: self.batch.ticket,
            trigger: self.batch.trigger,
            result: result.and_then(|outcome| {
                if outcome.error_count > 0 {
                    Err(format!(
                        "{} of {} changes were rejected",
                        outcome.error_count,
                        outcome.error_count + outcome.saved_count
                    ))
                } else {
                    Ok(outcome)
                }
            }),
        }
    }
}

pub fn next_deadline(state: &AppState) -> Option<Instant> {
    state.editor.next_deadline()
}

/// Advances the editor's timers; returns a job once the debounce has elapsed.
pub fn poll_due(state: &mut AppState, now: Instant) -> Option<SaveJob> {
    let batch = state.editor.poll(now)?;
    debug!(
        batch = batch.ticket.batch_id,
        changes = batch.changes.len(),
        "autosave due"
    );
    let ticket = batch.ticket;
    let job = SaveJob::new(state, batch);
    if job.is_none() {
        state
            .editor
            .complete_save(ticket, Err("grid closed".to_string()), now);
    }
    job
}

pub fn apply(state: &mut AppState, done: SaveDone, now: Instant) -> Completion {
    if let Ok(outcome) = &done.result {
        info!(
            batch = done.ticket.batch_id,
            saved = outcome.saved_count,
            trigger = ?done.trigger,
            "attendance batch saved"
        );
    }
    let result = done.result.map(|_| ());
    let completion = state.editor.complete_save(done.ticket, result, now);
    if completion == Completion::Stale {
        warn!(
            batch = done.ticket.batch_id,
            "save finished after the grid was closed; result not applied"
        );
    }
    completion
}
