use super::cell::{Cell, CellKey, Mark, Session};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStudent {
    pub id: String,
    pub display_name: String,
    #[serde(skip)]
    pub marks: HashMap<(u32, Session), Mark>,
}

/// Roster plus existing marks for one class/month, as fetched from storage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSnapshot {
    pub class_id: String,
    pub year: i32,
    pub month: u32,
    pub days_in_month: u32,
    pub days: Vec<u32>,
    pub students: Vec<SnapshotStudent>,
}

#[derive(Debug, Default)]
pub struct CellStore {
    cells: BTreeMap<CellKey, Cell>,
    roster: Vec<String>,
    roster_index: HashMap<String, usize>,
    days_in_month: u32,
}

impl CellStore {
    /// Builds a fresh store from a snapshot. Nothing from a previous grid survives.
    pub fn initialize(snapshot: &GridSnapshot) -> Self {
        let mut cells = BTreeMap::new();
        let mut roster = Vec::with_capacity(snapshot.students.len());
        let mut roster_index = HashMap::with_capacity(snapshot.students.len());

        for student in &snapshot.students {
            roster_index.insert(student.id.clone(), roster.len());
            roster.push(student.id.clone());
            for &day in &snapshot.days {
                for session in Session::ALL {
                    let mark = student
                        .marks
                        .get(&(day, session))
                        .copied()
                        .unwrap_or_default();
                    cells.insert(CellKey::new(student.id.clone(), day, session), Cell::loaded(mark));
                }
            }
        }

        Self {
            cells,
            roster,
            roster_index,
            days_in_month: snapshot.days_in_month,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn days_in_month(&self) -> u32 {
        self.days_in_month
    }

    pub fn get(&self, key: &CellKey) -> Option<&Cell> {
        self.cells.get(key)
    }

    pub fn get_mut(&mut self, key: &CellKey) -> Option<&mut Cell> {
        self.cells.get_mut(key)
    }

    pub fn roster_position(&self, student_id: &str) -> Option<usize> {
        self.roster_index.get(student_id).copied()
    }

    pub fn student_at(&self, index: usize) -> Option<&str> {
        self.roster.get(index).map(|s| s.as_str())
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellKey, &Cell)> {
        self.cells.iter()
    }
}
