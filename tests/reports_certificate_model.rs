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

fn request_ok(
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn certificate_model_groups_subjects_into_term_sections() {
    let workspace = temp_dir("registrar-certificate");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    for (i, (code, year, sem, lec, lab)) in [
        ("IT101", "FIRST", "FIRST", 3.0, 0.0),
        ("IT102", "FIRST", "FIRST", 2.0, 1.0),
        ("IT201", "SECOND", "FIRST", 3.0, 0.0),
    ]
    .iter()
    .enumerate()
    {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "curriculum.upsert",
            json!({
                "program": "BSIT",
                "courseCode": code,
                "courseTitle": format!("{} title", code),
                "yearLevel": year,
                "semester": sem,
                "creditLec": lec,
                "creditLab": lab,
            }),
        );
    }

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({
            "studentNo": "2019-00077",
            "lastName": "Torres",
            "firstName": "Liza",
            "program": "BSIT",
            "yearLevel": "SECOND",
        }),
    );
    let student_id = created["studentId"].as_str().expect("student id").to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.upsert",
        json!({
            "studentId": student_id,
            "courseCode": "IT101",
            "grade": "1.50",
            "remarks": "PASSED",
            "academicYear": "AY_2023_2024",
            "semester": "FIRST",
        }),
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reports.certificate",
        json!({ "studentId": student_id }),
    );

    assert_eq!(report["student"]["studentNo"].as_str(), Some("2019-00077"));
    assert!(report["generatedAt"].is_string());

    let sections = report["sections"].as_array().expect("sections");
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0]["yearLevel"].as_str(), Some("FIRST"));
    assert_eq!(sections[0]["semester"].as_str(), Some("FIRST"));
    assert_eq!(sections[0]["sectionCredits"].as_f64(), Some(6.0));
    assert_eq!(
        sections[0]["subjects"].as_array().map(|a| a.len()),
        Some(2)
    );
    assert_eq!(sections[1]["yearLevel"].as_str(), Some("SECOND"));
    assert_eq!(
        sections[1]["subjects"].as_array().map(|a| a.len()),
        Some(1)
    );

    let summary = &report["summary"];
    assert_eq!(summary["creditsCompleted"].as_f64(), Some(3.0));
    assert_eq!(summary["totalCreditsRequired"].as_f64(), Some(9.0));
    assert_eq!(summary["completionRate"].as_i64(), Some(33));
    assert_eq!(summary["currentGpa"].as_f64(), Some(1.5));
    assert_eq!(summary["subjectsRemaining"].as_u64(), Some(2));
}
