use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_required_str, lock, shared_db};
use crate::ipc::types::{AppState, Request};
use crate::persist;
use serde_json::json;

fn required_class(
    conn: &rusqlite::Connection,
    params: &serde_json::Value,
) -> Result<String, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let exists = persist::class_exists(conn, &class_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if !exists {
        return Err(HandlerErr::new("not_found", "class not found")
            .with_details(json!({ "classId": class_id })));
    }
    Ok(class_id)
}

fn students_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let db = shared_db(state)?;
    let conn = lock(&db)?;
    let class_id = required_class(&conn, params)?;
    let students =
        persist::list_students(&conn, &class_id).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "students": students }))
}

fn students_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let db = shared_db(state)?;
    let conn = lock(&db)?;
    let class_id = required_class(&conn, params)?;
    let last_name = get_required_str(params, "lastName")?;
    let first_name = get_required_str(params, "firstName")?;
    let active = params.get("active").and_then(|v| v.as_bool()).unwrap_or(true);
    if last_name.trim().is_empty() && first_name.trim().is_empty() {
        return Err(HandlerErr::bad_params("student name must not be empty"));
    }
    let (student_id, sort_order) = persist::create_student(
        &conn,
        &class_id,
        last_name.trim(),
        first_name.trim(),
        active,
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "students" })))?;
    Ok(json!({ "studentId": student_id, "sortOrder": sort_order }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(respond(&req.id, students_list(state, &req.params))),
        "students.create" => Some(respond(&req.id, students_create(state, &req.params))),
        _ => None,
    }
}
