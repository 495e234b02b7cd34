use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::Config;
use crate::grid::AttendanceEditor;

pub type SharedDb = Arc<Mutex<Connection>>;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<SharedDb>,
    pub editor: AttendanceEditor,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            workspace: None,
            db: None,
            editor: AttendanceEditor::new(),
            config,
        }
    }
}
