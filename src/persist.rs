use crate::grid::{GridSnapshot, Mark, SaveChange, Session, SnapshotStudent};
use anyhow::{anyhow, Context};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRow {
    pub id: String,
    pub name: String,
    pub student_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: String,
    pub display_name: String,
    pub sort_order: i64,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub saved_count: usize,
    pub error_count: usize,
}

pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    u32::try_from(next.signed_duration_since(first).num_days()).ok()
}

pub fn class_exists(conn: &Connection, class_id: &str) -> anyhow::Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

pub fn create_class(conn: &Connection, name: &str) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute("INSERT INTO classes(id, name) VALUES(?, ?)", (&id, name))?;
    Ok(id)
}

pub fn list_classes(conn: &Connection) -> anyhow::Result<Vec<ClassRow>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id)
         FROM classes c
         ORDER BY c.name, c.rowid",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassRow {
                id: r.get(0)?,
                name: r.get(1)?,
                student_count: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn create_student(
    conn: &Connection,
    class_id: &str,
    last_name: &str,
    first_name: &str,
    active: bool,
) -> anyhow::Result<(String, i64)> {
    let sort_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, last_name, first_name, active, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            class_id,
            last_name,
            first_name,
            active as i64,
            sort_order,
            Utc::now().to_rfc3339(),
        ),
    )?;
    Ok((id, sort_order))
}

pub fn list_students(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<StudentRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, last_name, first_name, sort_order, active
         FROM students
         WHERE class_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            Ok(StudentRow {
                id: r.get(0)?,
                display_name: format!("{}, {}", last, first),
                sort_order: r.get(3)?,
                active: r.get::<_, i64>(4)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_school_day(
    conn: &Connection,
    class_id: &str,
    year: i32,
    month: u32,
    day: u32,
    school_day: bool,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO attendance_days(class_id, year, month, day, school_day)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(class_id, year, month, day) DO UPDATE SET
           school_day = excluded.school_day",
        (class_id, year, month, day, school_day as i64),
    )?;
    Ok(())
}

/// Loads the roster and stored marks for one class/month. `None` when the class does not exist.
pub fn fetch_grid(
    conn: &Connection,
    class_id: &str,
    month: u32,
    year: i32,
) -> anyhow::Result<Option<GridSnapshot>> {
    let days_in_month =
        days_in_month(year, month).ok_or_else(|| anyhow!("invalid month {year}-{month:02}"))?;
    if !class_exists(conn, class_id)? {
        return Ok(None);
    }

    let mut stmt = conn.prepare(
        "SELECT day FROM attendance_days
         WHERE class_id = ? AND year = ? AND month = ? AND school_day = 0",
    )?;
    let closed: HashSet<u32> = stmt
        .query_map((class_id, year, month), |r| r.get::<_, u32>(0))?
        .collect::<Result<_, _>>()?;
    let days: Vec<u32> = (1..=days_in_month).filter(|d| !closed.contains(d)).collect();

    let mut marks: HashMap<String, HashMap<(u32, Session), Mark>> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT student_id, day, session, mark FROM attendance_marks
         WHERE class_id = ? AND year = ? AND month = ?",
    )?;
    let rows = stmt
        .query_map((class_id, year, month), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, u32>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (student_id, day, session_raw, mark_raw) in rows {
        // Rows this build cannot interpret load as present rather than failing the grid.
        let (Some(session), Some(mark)) = (Session::parse(&session_raw), Mark::normalize(&mark_raw))
        else {
            tracing::warn!(%student_id, day, session = %session_raw, mark = %mark_raw, "skipping unreadable attendance row");
            continue;
        };
        marks.entry(student_id).or_default().insert((day, session), mark);
    }

    let students = list_students(conn, class_id)?
        .into_iter()
        .filter(|s| s.active)
        .map(|s| SnapshotStudent {
            marks: marks.remove(&s.id).unwrap_or_default(),
            id: s.id,
            display_name: s.display_name,
        })
        .collect();

    Ok(Some(GridSnapshot {
        class_id: class_id.to_string(),
        year,
        month,
        days_in_month,
        days,
        students,
    }))
}

/// Writes a batch in one transaction. Changes for students outside the class
/// or days outside the month are counted as errors, not written.
pub fn bulk_save(
    conn: &Connection,
    class_id: &str,
    month: u32,
    year: i32,
    changes: &[SaveChange],
) -> anyhow::Result<SaveOutcome> {
    let days_in_month =
        days_in_month(year, month).ok_or_else(|| anyhow!("invalid month {year}-{month:02}"))?;
    let now = Utc::now().to_rfc3339();
    let mut outcome = SaveOutcome::default();

    let tx = conn
        .unchecked_transaction()
        .context("failed to begin attendance save")?;
    for change in changes {
        let known = tx
            .query_row(
                "SELECT 1 FROM students WHERE class_id = ? AND id = ?",
                (class_id, &change.student_id),
                |r| r.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        if !known || change.day == 0 || change.day > days_in_month {
            outcome.error_count += 1;
            continue;
        }
        match change.value {
            Mark::Present => {
                tx.execute(
                    "DELETE FROM attendance_marks
                     WHERE class_id = ? AND student_id = ? AND year = ? AND month = ? AND day = ? AND session = ?",
                    (
                        class_id,
                        &change.student_id,
                        year,
                        month,
                        change.day,
                        change.session.as_str(),
                    ),
                )?;
            }
            mark => {
                tx.execute(
                    "INSERT INTO attendance_marks(class_id, student_id, year, month, day, session, mark, updated_at)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(class_id, student_id, year, month, day, session) DO UPDATE SET
                       mark = excluded.mark,
                       updated_at = excluded.updated_at",
                    (
                        class_id,
                        &change.student_id,
                        year,
                        month,
                        change.day,
                        change.session.as_str(),
                        mark.code(),
                        &now,
                    ),
                )?;
            }
        }
        outcome.saved_count += 1;
    }
    tx.commit().context("failed to commit attendance save")?;
    Ok(outcome)
}
