use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Session {
    Morning,
    Afternoon,
}

impl Session {
    pub const ALL: [Session; 2] = [Session::Morning, Session::Afternoon];

    pub fn as_str(self) -> &'static str {
        match self {
            Session::Morning => "morning",
            Session::Afternoon => "afternoon",
        }
    }

    pub fn parse(raw: &str) -> Option<Session> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "morning" | "am" => Some(Session::Morning),
            "afternoon" | "pm" => Some(Session::Afternoon),
            _ => None,
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attendance mark. Present is the blank cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mark {
    #[default]
    Present,
    /// Absent without permission ("A").
    Absent,
    /// Absent with permission ("P").
    Excused,
}

impl Mark {
    pub fn code(self) -> &'static str {
        match self {
            Mark::Present => "",
            Mark::Absent => "A",
            Mark::Excused => "P",
        }
    }

    /// Trim + uppercase, then accept only "", "A" or "P".
    pub fn normalize(raw: &str) -> Option<Mark> {
        match raw.trim().to_uppercase().as_str() {
            "" => Some(Mark::Present),
            "A" => Some(Mark::Absent),
            "P" => Some(Mark::Excused),
            _ => None,
        }
    }
}

impl Serialize for Mark {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Mark {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Mark::normalize(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid attendance mark: {raw:?}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub student_id: String,
    pub day: u32,
    pub session: Session,
}

impl CellKey {
    pub fn new(student_id: impl Into<String>, day: u32, session: Session) -> Self {
        Self {
            student_id: student_id.into(),
            day,
            session,
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.student_id, self.day, self.session)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub value: Mark,
    pub original_value: Mark,
    pub is_saving: bool,
    pub error: Option<String>,
}

impl Cell {
    pub fn loaded(mark: Mark) -> Self {
        Self {
            value: mark,
            original_value: mark,
            is_saving: false,
            error: None,
        }
    }

    pub fn is_modified(&self) -> bool {
        self.value != self.original_value
    }
}
