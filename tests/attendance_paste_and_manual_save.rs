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
fn paste_block_fills_rows_and_truncates_at_month_end() {
    let workspace = temp_dir("attendanced-paste");
    let (mut child, mut stdin, mut reader) =
        spawn_sidecar(&[("ATTENDANCED_AUTOSAVE_DEBOUNCE_MS", "60000")]);
    let (class_id, students) = seed_class(
        &mut stdin,
        &mut reader,
        &workspace,
        &[("Sok", "Dara"), ("Chan", "Vanna"), ("Keo", "Sophea")],
    );
    // April has 30 days.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "attendance.gridOpen",
        json!({ "classId": class_id, "year": 2025, "month": 4 }),
    );

    let paste = request_ok(
        &mut stdin,
        &mut reader,
        "paste",
        "attendance.paste",
        json!({
            "studentId": students[1],
            "day": 29,
            "session": "afternoon",
            "text": "A\tP\tA\nP\tx\tP\nA\n"
        }),
    );
    assert_eq!(paste["updated"].as_u64(), Some(3), "{paste}");
    assert_eq!(paste["rejected"].as_u64(), Some(1));
    assert_eq!(paste["outOfGrid"].as_u64(), Some(3));
    assert_eq!(paste["saveState"]["pendingCount"].as_u64(), Some(3));

    let saved = request_ok(&mut stdin, &mut reader, "save", "attendance.save", json!({}));
    assert_eq!(saved["savedCount"].as_u64(), Some(3));
    assert_eq!(saved["saveState"]["label"], "saved");

    let reopened = request_ok(
        &mut stdin,
        &mut reader,
        "reopen",
        "attendance.gridOpen",
        json!({ "classId": class_id, "year": 2025, "month": 4 }),
    );
    let mut expected = vec![
        (students[1].clone(), 29, "afternoon".to_string(), "A".to_string()),
        (students[1].clone(), 30, "afternoon".to_string(), "P".to_string()),
        (students[2].clone(), 29, "afternoon".to_string(), "P".to_string()),
    ];
    expected.sort();
    assert_eq!(marks_of(&reopened), expected);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn manual_save_with_nothing_pending_is_a_no_op() {
    let workspace = temp_dir("attendanced-manual-empty");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[]);
    let (class_id, _) = seed_class(&mut stdin, &mut reader, &workspace, &[("Sok", "Dara")]);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "attendance.gridOpen",
        json!({ "classId": class_id, "year": 2024, "month": 2 }),
    );
    let saved = request_ok(&mut stdin, &mut reader, "save", "attendance.save", json!({}));
    assert_eq!(saved["savedCount"].as_u64(), Some(0));
    assert_eq!(saved["saveState"]["label"], "all saved");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn clearing_a_mark_removes_it_from_storage() {
    let workspace = temp_dir("attendanced-manual-clear");
    let (mut child, mut stdin, mut reader) =
        spawn_sidecar(&[("ATTENDANCED_AUTOSAVE_DEBOUNCE_MS", "60000")]);
    let (class_id, students) = seed_class(&mut stdin, &mut reader, &workspace, &[("Sok", "Dara")]);
    let open = json!({ "classId": class_id, "year": 2025, "month": 1 });
    let _ = request_ok(&mut stdin, &mut reader, "open-1", "attendance.gridOpen", open.clone());
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "set-1",
        "attendance.setCell",
        json!({ "studentId": students[0], "day": 15, "session": "morning", "value": "P" }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "save-1", "attendance.save", json!({}));

    let grid = request_ok(&mut stdin, &mut reader, "open-2", "attendance.gridOpen", open.clone());
    assert_eq!(marks_of(&grid).len(), 1);

    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "set-2",
        "attendance.setCell",
        json!({ "studentId": students[0], "day": 15, "session": "morning", "value": null }),
    );
    assert_eq!(cleared["cell"]["value"], "");
    assert_eq!(cleared["cell"]["isModified"], true);
    let _ = request_ok(&mut stdin, &mut reader, "save-2", "attendance.save", json!({}));

    let grid = request_ok(&mut stdin, &mut reader, "open-3", "attendance.gridOpen", open);
    assert!(marks_of(&grid).is_empty());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn workspace_autosave_override_applies_on_next_open() {
    let workspace = temp_dir("attendanced-settings");
    let (mut child, mut stdin, mut reader) =
        spawn_sidecar(&[("ATTENDANCED_AUTOSAVE_DEBOUNCE_MS", "1500")]);
    let (class_id, _) = seed_class(&mut stdin, &mut reader, &workspace, &[("Sok", "Dara")]);

    let bad = request(
        &mut stdin,
        &mut reader,
        "bad",
        "settings.autosave.update",
        json!({ "debounceMs": 0 }),
    );
    assert_eq!(error_code(&bad), Some("bad_params"));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "update",
        "settings.autosave.update",
        json!({ "debounceMs": 250 }),
    );
    assert_eq!(updated["defaults"]["debounceMs"].as_u64(), Some(1500));
    assert_eq!(updated["effective"]["debounceMs"].as_u64(), Some(250));
    assert_eq!(updated["effective"]["savedDisplayMs"].as_u64(), Some(2000));

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "attendance.gridOpen",
        json!({ "classId": class_id, "year": 2025, "month": 6 }),
    );
    assert_eq!(grid["autosave"]["debounceMs"].as_u64(), Some(250));

    drop(stdin);
    let _ = child.wait();
}
