use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar(envs: &[(&str, &str)]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut cmd = Command::new(exe);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let mut child = cmd.spawn().expect("spawn attendanced");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

/// Creates a class with the given students; returns (classId, studentIds).
fn seed_class(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
    students: &[(&str, &str)],
) -> (String, Vec<String>) {
    let _ = request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(stdin, reader, "seed-class", "classes.create", json!({ "name": "Grade 7A" }));
    let class_id = class
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();
    let mut ids = Vec::new();
    for (i, (last, first)) in students.iter().enumerate() {
        let s = request_ok(
            stdin,
            reader,
            &format!("seed-student-{i}"),
            "students.create",
            json!({ "classId": class_id, "lastName": last, "firstName": first }),
        );
        ids.push(
            s.get("studentId")
                .and_then(|v| v.as_str())
                .expect("studentId")
                .to_string(),
        );
    }
    (class_id, ids)
}

fn marks_of(grid: &serde_json::Value) -> Vec<(String, u64, String, String)> {
    let mut out: Vec<_> = grid
        .get("marks")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|m| {
            (
                m["studentId"].as_str().unwrap_or_default().to_string(),
                m["day"].as_u64().unwrap_or_default(),
                m["session"].as_str().unwrap_or_default().to_string(),
                m["value"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    out.sort();
    out
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("attendanced-router-smoke");
    let (mut child, mut stdin, mut reader) =
        spawn_sidecar(&[("ATTENDANCED_AUTOSAVE_DEBOUNCE_MS", "60000")]);

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert_eq!(health.get("gridOpen").and_then(|v| v.as_bool()), Some(false));

    let no_ws = request(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.gridOpen",
        json!({ "classId": "x", "year": 2025, "month": 3 }),
    );
    assert_eq!(error_code(&no_ws), Some("no_workspace"));

    let (class_id, students) = seed_class(
        &mut stdin,
        &mut reader,
        &workspace,
        &[("Sok", "Dara"), ("Chan", "Vanna")],
    );

    let classes = request_ok(&mut stdin, &mut reader, "3", "classes.list", json!({}));
    assert_eq!(
        classes["classes"][0]["studentCount"].as_i64(),
        Some(2),
        "{classes}"
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.list",
        json!({ "classId": class_id }),
    );
    assert_eq!(listed["students"][1]["displayName"], "Chan, Vanna");

    let no_grid = request(&mut stdin, &mut reader, "5", "attendance.status", json!({}));
    assert_eq!(error_code(&no_grid), Some("no_grid"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.setDayType",
        json!({ "classId": class_id, "year": 2025, "month": 3, "day": 9, "schoolDay": false }),
    );
    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.gridOpen",
        json!({ "classId": class_id, "year": 2025, "month": 3 }),
    );
    assert_eq!(grid["grid"]["daysInMonth"].as_u64(), Some(31));
    assert_eq!(grid["cellCount"].as_u64(), Some(2 * 30 * 2));
    assert_eq!(grid["saveState"]["label"], "all saved");

    let set = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.setCell",
        json!({ "studentId": students[0], "day": 3, "session": "morning", "value": "a" }),
    );
    assert_eq!(set["applied"], true);
    assert_eq!(set["cell"]["value"], "A");
    assert_eq!(set["cell"]["isModified"], true);

    let paste = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.paste",
        json!({ "studentId": students[0], "day": 1, "session": "afternoon", "text": "P\tA" }),
    );
    assert_eq!(paste["updated"].as_u64(), Some(2));

    let cell = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.cell",
        json!({ "studentId": students[0], "day": 2, "session": "afternoon" }),
    );
    assert_eq!(cell["cell"]["value"], "A");

    let status = request_ok(&mut stdin, &mut reader, "11", "attendance.status", json!({}));
    assert_eq!(status["pendingCount"].as_u64(), Some(3));
    assert_eq!(status["label"], "3 pending changes");

    let summary = request_ok(&mut stdin, &mut reader, "12", "attendance.summary", json!({}));
    assert_eq!(summary["students"][0]["absent"].as_u64(), Some(2));
    assert_eq!(summary["students"][0]["excused"].as_u64(), Some(1));

    let saved = request_ok(&mut stdin, &mut reader, "13", "attendance.save", json!({}));
    assert_eq!(saved["savedCount"].as_u64(), Some(3));

    let settings = request_ok(&mut stdin, &mut reader, "14", "settings.autosave.get", json!({}));
    assert_eq!(settings["effective"]["debounceMs"].as_u64(), Some(60000));

    let closed = request_ok(&mut stdin, &mut reader, "15", "attendance.close", json!({}));
    assert_eq!(closed["discardedPending"].as_u64(), Some(0));

    let unknown = request(&mut stdin, &mut reader, "16", "attendance.teleport", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
}
