use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{lock, shared_db};
use crate::ipc::types::{AppState, Request};
use crate::persist;
use serde_json::json;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(db) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };
    let conn = match lock(db) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    match persist::list_classes(&conn) {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn classes_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let db = shared_db(state)?;
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params("missing name"))?;
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let conn = lock(&db)?;
    let class_id = persist::create_class(&conn, &name).map_err(|e| {
        HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "classes" }))
    })?;
    Ok(json!({ "classId": class_id, "name": name }))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    match classes_create(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        _ => None,
    }
}
