use super::cell::{CellKey, Mark, Session};
use super::pending::PendingSet;
use super::store::CellStore;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditOutcome {
    Changed,
    Unchanged,
    /// Input was not "", "A" or "P". Nothing was touched.
    Rejected,
    /// No such student/day in the loaded grid.
    OutOfGrid,
}

impl EditOutcome {
    pub fn changed(self) -> bool {
        matches!(self, EditOutcome::Changed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasteOutcome {
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: usize,
    pub out_of_grid: usize,
}

impl PasteOutcome {
    pub fn changed(&self) -> bool {
        self.updated > 0
    }
}

fn apply(store: &mut CellStore, pending: &mut PendingSet, key: &CellKey, mark: Mark) -> EditOutcome {
    let Some(cell) = store.get_mut(key) else {
        return EditOutcome::OutOfGrid;
    };
    if cell.value == mark {
        return EditOutcome::Unchanged;
    }
    cell.value = mark;
    pending.track(key, cell.is_modified());
    EditOutcome::Changed
}

pub fn set_cell(
    store: &mut CellStore,
    pending: &mut PendingSet,
    student_id: &str,
    day: u32,
    session: Session,
    raw_input: &str,
) -> EditOutcome {
    let Some(mark) = Mark::normalize(raw_input) else {
        return EditOutcome::Rejected;
    };
    apply(store, pending, &CellKey::new(student_id, day, session), mark)
}

/// Splits a spreadsheet clipboard payload into rows of tab-separated fragments.
fn clipboard_rows(text: &str) -> Vec<Vec<&str>> {
    let mut rows: Vec<&str> = text.split('\n').collect();
    if rows.len() > 1 && rows.last().is_some_and(|r| r.is_empty()) {
        rows.pop();
    }
    rows.into_iter()
        .map(|r| r.strip_suffix('\r').unwrap_or(r).split('\t').collect())
        .collect()
}

pub fn paste_block(
    store: &mut CellStore,
    pending: &mut PendingSet,
    anchor_student_id: &str,
    anchor_day: u32,
    session: Session,
    text: &str,
) -> PasteOutcome {
    let mut outcome = PasteOutcome::default();
    let Some(anchor_index) = store.roster_position(anchor_student_id) else {
        return outcome;
    };
    let days_in_month = store.days_in_month();

    let mut staged: Vec<(CellKey, Mark)> = Vec::new();
    for (r, columns) in clipboard_rows(text).into_iter().enumerate() {
        let Some(student_id) = store.student_at(anchor_index + r) else {
            outcome.out_of_grid += columns.len();
            continue;
        };
        for (c, fragment) in columns.into_iter().enumerate() {
            let Some(day) = u32::try_from(c)
                .ok()
                .and_then(|c| anchor_day.checked_add(c))
                .filter(|d| *d <= days_in_month)
            else {
                outcome.out_of_grid += 1;
                continue;
            };
            let Some(mark) = Mark::normalize(fragment) else {
                outcome.rejected += 1;
                continue;
            };
            staged.push((CellKey::new(student_id, day, session), mark));
        }
    }

    for (key, mark) in staged {
        match apply(store, pending, &key, mark) {
            EditOutcome::Changed => outcome.updated += 1,
            EditOutcome::Unchanged => outcome.unchanged += 1,
            EditOutcome::OutOfGrid => outcome.out_of_grid += 1,
            EditOutcome::Rejected => outcome.rejected += 1,
        }
    }
    outcome
}
