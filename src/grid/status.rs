use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SaveStatus {
    Saving,
    Saved,
    Pending { count: usize },
    Idle,
}

impl SaveStatus {
    /// Precedence: in-flight save, then success display, then pending count.
    pub fn project(is_saving: bool, save_success: bool, pending: usize) -> Self {
        if is_saving {
            SaveStatus::Saving
        } else if save_success {
            SaveStatus::Saved
        } else if pending > 0 {
            SaveStatus::Pending { count: pending }
        } else {
            SaveStatus::Idle
        }
    }

    pub fn label(&self) -> String {
        match self {
            SaveStatus::Saving => "saving".to_string(),
            SaveStatus::Saved => "saved".to_string(),
            SaveStatus::Pending { count: 1 } => "1 pending change".to_string(),
            SaveStatus::Pending { count } => format!("{count} pending changes"),
            SaveStatus::Idle => "all saved".to_string(),
        }
    }
}
