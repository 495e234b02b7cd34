use crate::config::{self, AUTOSAVE_SETTINGS_KEY};
use crate::db;
use crate::grid::MAX_INTERVAL_MS;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{lock, shared_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn autosave_get(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let db = shared_db(state)?;
    let conn = lock(&db)?;
    let effective = config::workspace_autosave(&conn, state.config.autosave)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({
        "defaults": config::autosave_json(state.config.autosave),
        "effective": config::autosave_json(effective),
    }))
}

fn autosave_update(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut patch = serde_json::Map::new();
    for key in ["debounceMs", "savedDisplayMs"] {
        match params.get(key) {
            None | Some(serde_json::Value::Null) => {}
            Some(v) => {
                let Some(ms) = v.as_u64().filter(|ms| (1..=MAX_INTERVAL_MS).contains(ms)) else {
                    return Err(HandlerErr::bad_params(format!(
                        "{key} must be an integer between 1 and {MAX_INTERVAL_MS}"
                    )));
                };
                patch.insert(key.to_string(), json!(ms));
            }
        }
    }
    if patch.is_empty() {
        return Err(HandlerErr::bad_params("nothing to update"));
    }

    let db = shared_db(state)?;
    {
        let conn = lock(&db)?;
        let mut stored = db::settings_get_json(&conn, AUTOSAVE_SETTINGS_KEY)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?
            .filter(|v| v.is_object())
            .unwrap_or_else(|| json!({}));
        for (k, v) in patch {
            stored[k] = v;
        }
        db::settings_set_json(&conn, AUTOSAVE_SETTINGS_KEY, &stored)
            .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }
    autosave_get(state)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.autosave.get" => Some(respond(&req.id, autosave_get(state))),
        "settings.autosave.update" => Some(respond(&req.id, autosave_update(state, &req.params))),
        _ => None,
    }
}
