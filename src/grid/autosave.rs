use super::cell::{Mark, Session};
use serde::Serialize;
use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);
pub const DEFAULT_SAVED_DISPLAY: Duration = Duration::from_millis(2000);
/// Upper bound for both intervals, from any source.
pub const MAX_INTERVAL_MS: u64 = 60_000;

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveSettings {
    pub debounce: Duration,
    pub saved_display: Duration,
}

impl AutosaveSettings {
    /// Values are clamped to `1..=MAX_INTERVAL_MS`.
    pub fn from_millis(debounce_ms: u64, saved_display_ms: u64) -> Self {
        Self {
            debounce: Duration::from_millis(debounce_ms.clamp(1, MAX_INTERVAL_MS)),
            saved_display: Duration::from_millis(saved_display_ms.clamp(1, MAX_INTERVAL_MS)),
        }
    }

    pub fn debounce_ms(&self) -> u64 {
        millis(self.debounce)
    }

    pub fn saved_display_ms(&self) -> u64 {
        millis(self.saved_display)
    }
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            saved_display: DEFAULT_SAVED_DISPLAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveTrigger {
    Auto,
    Manual,
}

/// Identifies one dispatched batch. `generation` changes every time the grid
/// is (re)initialized, so completions for an abandoned grid can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTicket {
    pub generation: u64,
    pub batch_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveChange {
    pub student_id: String,
    pub day: u32,
    pub session: Session,
    pub value: Mark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveBatch {
    pub ticket: SaveTicket,
    pub trigger: SaveTrigger,
    pub changes: Vec<SaveChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Pending changes but nothing armed, e.g. after a failed save.
    Dirty,
    Scheduled { deadline: Instant },
    Saving { ticket: SaveTicket },
    Saved { until: Instant },
}

/// What `poll` wants the owner to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    Nothing,
    /// Debounce elapsed: snapshot pending cells and dispatch.
    Flush,
}

#[derive(Debug)]
pub struct Scheduler {
    settings: AutosaveSettings,
    phase: Phase,
    next_batch_id: u64,
    edited_in_flight: bool,
}

impl Scheduler {
    pub fn new(settings: AutosaveSettings) -> Self {
        Self {
            settings,
            phase: Phase::Idle,
            next_batch_id: 1,
            edited_in_flight: false,
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn in_flight(&self) -> Option<SaveTicket> {
        match self.phase {
            Phase::Saving { ticket } => Some(ticket),
            _ => None,
        }
    }

    pub fn showing_saved(&self) -> bool {
        matches!(self.phase, Phase::Saved { .. })
    }

    /// Restarts the debounce window. Edits during a save are picked up when it settles.
    pub fn note_edit(&mut self, now: Instant) {
        match self.phase {
            Phase::Saving { .. } => self.edited_in_flight = true,
            _ => {
                self.phase = Phase::Scheduled {
                    deadline: now + self.settings.debounce,
                }
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Scheduled { deadline } => Some(deadline),
            Phase::Saved { until } => Some(until),
            _ => None,
        }
    }

    pub fn poll(&mut self, now: Instant, has_pending: bool) -> Poll {
        match self.phase {
            Phase::Scheduled { deadline } if now >= deadline => {
                if has_pending {
                    Poll::Flush
                } else {
                    self.phase = Phase::Idle;
                    Poll::Nothing
                }
            }
            Phase::Saved { until } if now >= until => {
                self.phase = if has_pending { Phase::Dirty } else { Phase::Idle };
                Poll::Nothing
            }
            _ => Poll::Nothing,
        }
    }

    /// Enters `Saving` with a fresh ticket. Caller guarantees nothing is in flight.
    pub fn begin(&mut self, generation: u64) -> SaveTicket {
        let ticket = SaveTicket {
            generation,
            batch_id: self.next_batch_id,
        };
        self.next_batch_id += 1;
        self.edited_in_flight = false;
        self.phase = Phase::Saving { ticket };
        ticket
    }

    pub fn finish(&mut self, succeeded: bool, has_pending: bool, now: Instant) {
        let edited = std::mem::take(&mut self.edited_in_flight);
        self.phase = if edited && has_pending {
            Phase::Scheduled {
                deadline: now + self.settings.debounce,
            }
        } else if succeeded {
            Phase::Saved {
                until: now + self.settings.saved_display,
            }
        } else if has_pending {
            Phase::Dirty
        } else {
            Phase::Idle
        };
    }

    /// Drops any armed deadline.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.edited_in_flight = false;
    }
}
