use super::error::HandlerErr;
use super::types::{AppState, SharedDb};
use crate::grid::Session;
use rusqlite::Connection;
use std::sync::MutexGuard;

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Like `get_required_str` but an absent key yields "" (clearing a cell).
pub fn get_text(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(String::new()),
        Some(v) => v
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn get_required_u32(params: &serde_json::Value, key: &str) -> Result<u32, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_session(params: &serde_json::Value) -> Result<Session, HandlerErr> {
    let raw = get_required_str(params, "session")?;
    Session::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params("session must be morning or afternoon")
            .with_details(serde_json::json!({ "session": raw }))
    })
}

pub fn get_year_month(params: &serde_json::Value) -> Result<(i32, u32), HandlerErr> {
    let year = get_required_u32(params, "year")?;
    let month = get_required_u32(params, "month")?;
    if !(1..=12).contains(&month) {
        return Err(HandlerErr::bad_params("month must be between 1 and 12")
            .with_details(serde_json::json!({ "month": month })));
    }
    let year = i32::try_from(year).map_err(|_| HandlerErr::bad_params("year out of range"))?;
    Ok((year, month))
}

pub fn shared_db(state: &AppState) -> Result<SharedDb, HandlerErr> {
    state
        .db
        .clone()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn lock(db: &SharedDb) -> Result<MutexGuard<'_, Connection>, HandlerErr> {
    db.lock()
        .map_err(|_| HandlerErr::new("db_unavailable", "database lock poisoned"))
}
