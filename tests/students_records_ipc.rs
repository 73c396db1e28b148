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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_registrard");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn registrard");
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

#[test]
fn student_records_crud_and_soft_delete() {
    let workspace = temp_dir("registrar-students-crud");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({
            "studentNo": "2021-00001",
            "lastName": "Cruz",
            "firstName": "Juan",
            "program": "BSIT",
            "major": "Web Development",
            "yearLevel": "SECOND",
        }),
    );
    let student_id = created["studentId"].as_str().expect("student id").to_string();

    // Same student number cannot be registered twice.
    let dup = request(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "studentNo": "2021-00001",
            "lastName": "Dela Cruz",
            "firstName": "Juana",
            "program": "BSIT",
            "yearLevel": "FIRST",
        }),
    );
    assert_eq!(dup["ok"].as_bool(), Some(false));
    assert_eq!(dup["error"]["code"].as_str(), Some("conflict"));

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.get",
        json!({ "studentId": student_id }),
    );
    assert_eq!(fetched["student"]["lastName"].as_str(), Some("Cruz"));
    assert_eq!(fetched["student"]["yearLevel"].as_str(), Some("SECOND"));
    assert_eq!(fetched["student"]["active"].as_bool(), Some(true));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.update",
        json!({ "studentId": student_id, "yearLevel": "THIRD", "major": "Networking" }),
    );
    assert_eq!(updated["student"]["yearLevel"].as_str(), Some("THIRD"));
    assert_eq!(updated["student"]["major"].as_str(), Some("Networking"));

    let by_search = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.list",
        json!({ "search": "2021-000" }),
    );
    assert_eq!(
        by_search["students"].as_array().map(|a| a.len()),
        Some(1),
        "{}",
        by_search
    );

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    assert_eq!(deleted["active"].as_bool(), Some(false));

    // Soft-deleted students drop out of the default listing but stay fetchable.
    let listed = request_ok(&mut stdin, &mut reader, "8", "students.list", json!({}));
    assert_eq!(listed["students"].as_array().map(|a| a.len()), Some(0));
    let listed_all = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "students.list",
        json!({ "includeInactive": true }),
    );
    assert_eq!(listed_all["students"].as_array().map(|a| a.len()), Some(1));
    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.get",
        json!({ "studentId": student_id }),
    );
    assert_eq!(fetched["student"]["active"].as_bool(), Some(false));
}

#[test]
fn unknown_year_level_is_rejected() {
    let workspace = temp_dir("registrar-students-badlevel");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let bad = request(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({
            "lastName": "Cruz",
            "firstName": "Juan",
            "program": "BSIT",
            "yearLevel": "FIFTH",
        }),
    );
    assert_eq!(bad["ok"].as_bool(), Some(false));
    assert_eq!(bad["error"]["code"].as_str(), Some("bad_params"));
}
