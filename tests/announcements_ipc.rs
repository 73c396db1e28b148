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
fn announcements_create_list_delete() {
    let workspace = temp_dir("registrar-announcements");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "announcements.create",
        json!({
            "title": "Enrollment opens",
            "body": "Enrollment for AY 2025-2026 opens on June 1.",
        }),
    );
    let first_id = first["announcementId"].as_str().expect("id").to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "announcements.create",
        json!({
            "title": "Grade viewing",
            "body": "Second semester grades are now viewable.",
            "audience": "STUDENTS",
        }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "4", "announcements.list", json!({}));
    let items = listed["announcements"].as_array().expect("announcements");
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|a| a["postedAt"].is_string()));
    assert!(items
        .iter()
        .any(|a| a["audience"].as_str() == Some("STUDENTS")));

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "announcements.delete",
        json!({ "announcementId": first_id }),
    );
    assert_eq!(deleted["deleted"].as_u64(), Some(1));

    let again = request(
        &mut stdin,
        &mut reader,
        "6",
        "announcements.delete",
        json!({ "announcementId": first_id }),
    );
    assert_eq!(again["ok"].as_bool(), Some(false));
    assert_eq!(again["error"]["code"].as_str(), Some("not_found"));

    let listed = request_ok(&mut stdin, &mut reader, "7", "announcements.list", json!({}));
    assert_eq!(
        listed["announcements"].as_array().map(|a| a.len()),
        Some(1)
    );
}
