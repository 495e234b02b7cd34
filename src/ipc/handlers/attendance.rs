use crate::config;
use crate::grid::editor::GridSession;
use crate::grid::reducer::EditOutcome;
use crate::grid::{CellKey, EditorError, Mark};
use crate::ipc::autosave::{self, SaveJob};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    get_required_str, get_required_u32, get_session, get_text, get_year_month, lock, shared_db,
};
use crate::ipc::types::{AppState, Request};
use crate::persist;
use serde_json::json;
use std::time::Instant;

impl From<EditorError> for HandlerErr {
    fn from(e: EditorError) -> Self {
        match e {
            EditorError::NoGrid => HandlerErr::new("no_grid", e.to_string()),
            EditorError::SaveInFlight(batch) => HandlerErr::new("save_in_flight", e.to_string())
                .with_details(json!({ "batchId": batch })),
        }
    }
}

fn open_session(state: &AppState) -> Result<&GridSession, HandlerErr> {
    state
        .editor
        .session()
        .ok_or_else(|| HandlerErr::from(EditorError::NoGrid))
}

fn status_json(session: &GridSession) -> serde_json::Value {
    let status = session.status();
    json!({
        "status": status,
        "label": status.label(),
        "pendingCount": session.pending().len(),
        "generation": session.generation(),
    })
}

fn attendance_grid_open(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let (year, month) = get_year_month(params)?;
    let db = shared_db(state)?;
    let (snapshot, settings) = {
        let conn = lock(&db)?;
        let snapshot = persist::fetch_grid(&conn, &class_id, month, year)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?
            .ok_or_else(|| {
                HandlerErr::new("not_found", "class not found")
                    .with_details(json!({ "classId": class_id }))
            })?;
        let settings = config::workspace_autosave(&conn, state.config.autosave)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        (snapshot, settings)
    };

    let session = state.editor.open(&snapshot, settings);
    let marks: Vec<_> = session
        .cells()
        .into_iter()
        .filter(|c| c.value != Mark::Present)
        .collect();
    Ok(json!({
        "grid": snapshot,
        "cellCount": session.store().len(),
        "marks": marks,
        "autosave": config::autosave_json(settings),
        "saveState": status_json(session),
    }))
}

fn attendance_set_cell(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let day = get_required_u32(params, "day")?;
    let session = get_session(params)?;
    let raw = get_text(params, "value")?;

    let outcome = state
        .editor
        .set_cell(&student_id, day, session, &raw, Instant::now())?;
    let grid = open_session(state)?;
    let mut result = json!({
        "applied": outcome.changed(),
        "outcome": outcome,
        "cell": grid.cell(&CellKey::new(student_id, day, session)),
        "saveState": status_json(grid),
    });
    // Not an error: the keystroke is simply not accepted.
    match outcome {
        EditOutcome::Rejected => result["reason"] = json!("invalid_mark"),
        EditOutcome::OutOfGrid => result["reason"] = json!("out_of_grid"),
        EditOutcome::Changed | EditOutcome::Unchanged => {}
    }
    Ok(result)
}

fn attendance_paste(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let day = get_required_u32(params, "day")?;
    let session = get_session(params)?;
    let text = get_text(params, "text")?;

    let outcome = state
        .editor
        .paste(&student_id, day, session, &text, Instant::now())?;
    let grid = open_session(state)?;
    Ok(json!({
        "updated": outcome.updated,
        "unchanged": outcome.unchanged,
        "rejected": outcome.rejected,
        "outOfGrid": outcome.out_of_grid,
        "saveState": status_json(grid),
    }))
}

fn attendance_cell(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let day = get_required_u32(params, "day")?;
    let session = get_session(params)?;
    let grid = open_session(state)?;
    let cell = grid
        .cell(&CellKey::new(student_id.clone(), day, session))
        .ok_or_else(|| {
            HandlerErr::new("not_found", "cell not in grid").with_details(json!({
                "studentId": student_id,
                "day": day,
                "session": session,
            }))
        })?;
    Ok(json!({ "cell": cell }))
}

fn attendance_status(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let grid = open_session(state)?;
    let mut out = status_json(grid);
    out["grid"] = json!(grid.identity());
    Ok(out)
}

fn attendance_summary(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let grid = open_session(state)?;
    Ok(json!({
        "grid": grid.identity(),
        "students": grid.tallies(),
    }))
}

/// Manual save: runs inline and reports failures to the caller.
fn attendance_save(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    shared_db(state)?;
    let Some(batch) = state.editor.flush()? else {
        let grid = open_session(state)?;
        return Ok(json!({
            "savedCount": 0,
            "errorCount": 0,
            "saveState": status_json(grid),
        }));
    };
    let submitted = batch.changes.len();
    let job = SaveJob::new(state, batch).ok_or_else(|| HandlerErr::from(EditorError::NoGrid))?;
    let done = job.run();
    let result = done.result.clone();
    autosave::apply(state, done, Instant::now());

    let grid = open_session(state)?;
    match result {
        Ok(outcome) => Ok(json!({
            "savedCount": outcome.saved_count,
            "errorCount": outcome.error_count,
            "saveState": status_json(grid),
        })),
        Err(message) => Err(HandlerErr::new("save_failed", message).with_details(json!({
            "submitted": submitted,
            "pendingCount": grid.pending().len(),
        }))),
    }
}

fn attendance_close(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let discarded = state.editor.close().ok_or(EditorError::NoGrid)?;
    Ok(json!({ "discardedPending": discarded }))
}

fn attendance_set_day_type(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let (year, month) = get_year_month(params)?;
    let day = get_required_u32(params, "day")?;
    let school_day = params
        .get("schoolDay")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params("missing schoolDay"))?;
    let days = persist::days_in_month(year, month).unwrap_or(0);
    if day == 0 || day > days {
        return Err(HandlerErr::bad_params("day out of range for month")
            .with_details(json!({ "day": day, "daysInMonth": days })));
    }
    let db = shared_db(state)?;
    let conn = lock(&db)?;
    let exists =
        persist::class_exists(&conn, &class_id).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if !exists {
        return Err(HandlerErr::new("not_found", "class not found"));
    }
    persist::set_school_day(&conn, &class_id, year, month, day, school_day).map_err(|e| {
        HandlerErr::db("db_update_failed", e).with_details(json!({ "table": "attendance_days" }))
    })?;
    // Takes effect on the next gridOpen; the open grid keeps its day list.
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "attendance.gridOpen" => attendance_grid_open(state, p),
        "attendance.setCell" => attendance_set_cell(state, p),
        "attendance.paste" => attendance_paste(state, p),
        "attendance.cell" => attendance_cell(state, p),
        "attendance.status" => attendance_status(state),
        "attendance.summary" => attendance_summary(state),
        "attendance.save" => attendance_save(state),
        "attendance.close" => attendance_close(state),
        "attendance.setDayType" => attendance_set_day_type(state, p),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
