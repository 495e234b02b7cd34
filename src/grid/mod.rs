//! Attendance grid editing and auto-save.
//!
//! One [`AttendanceEditor`] owns at most one open class/month grid. Edits land
//! in the in-memory [`CellStore`] immediately; the scheduler hands out
//! [`SaveBatch`]es once the debounce window elapses, and the owner reports the
//! backend result back through [`AttendanceEditor::complete_save`]. Time is
//! passed in explicitly so the whole engine is driven by the caller's clock.

pub mod autosave;
pub mod cell;
pub mod editor;
pub mod pending;
pub mod reducer;
pub mod status;
pub mod store;

pub use autosave::{
    AutosaveSettings, MAX_INTERVAL_MS, SaveBatch, SaveChange, SaveTicket, SaveTrigger,
};
pub use cell::{CellKey, Mark, Session};
pub use editor::{AttendanceEditor, Completion, EditorError};
pub use store::{CellStore, GridSnapshot, SnapshotStudent};
