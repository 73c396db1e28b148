use crate::db;
use crate::ingest;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_student, now_rfc3339, opt_str_param, require_db, semester_param, str_param, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{self, GradeRecord, Semester};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const UPLOAD_MAX_ROWS: usize = 5000;

struct GradeWrite {
    student_id: String,
    course_code: String,
    course_title: Option<String>,
    credit_unit: Option<f64>,
    grade: String,
    re_exam: Option<String>,
    remarks: Option<String>,
    instructor: Option<String>,
    academic_year: String,
    semester: Semester,
}

enum WriteOutcome {
    Created(String),
    Updated(String),
    KeptExisting(String),
}

/// Insert or update one grade row. An existing strictly-better grade for the
/// same (student, course, term) is never overwritten; real writes leave an
/// audit trail.
fn apply_grade_write(
    conn: &Connection,
    actor: &str,
    w: &GradeWrite,
) -> Result<WriteOutcome, HandlerErr> {
    let existing: Option<(String, String)> = conn
        .query_row(
            "SELECT id, grade FROM grade_records
             WHERE student_id = ? AND course_code = ? AND academic_year = ? AND semester = ?",
            (
                &w.student_id,
                &w.course_code,
                &w.academic_year,
                w.semester.as_str(),
            ),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(HandlerErr::db)?;

    match existing {
        Some((id, stored_grade)) => {
            if ingest::keep_existing(&stored_grade, &w.grade) {
                return Ok(WriteOutcome::KeptExisting(id));
            }
            conn.execute(
                "UPDATE grade_records
                 SET grade = ?, re_exam = ?,
                     course_title = COALESCE(?, course_title),
                     credit_unit = COALESCE(?, credit_unit),
                     remarks = COALESCE(?, remarks),
                     instructor = COALESCE(?, instructor),
                     updated_at = ?
                 WHERE id = ?",
                (
                    &w.grade,
                    &w.re_exam,
                    &w.course_title,
                    w.credit_unit,
                    &w.remarks,
                    &w.instructor,
                    now_rfc3339(),
                    &id,
                ),
            )
            .map_err(HandlerErr::db)?;
            db::audit(
                conn,
                actor,
                "UPDATED",
                "grade_record",
                &id,
                Some(&format!(
                    "{} {} {}: {} -> {}",
                    w.course_code,
                    w.academic_year,
                    w.semester.as_str(),
                    stored_grade,
                    w.grade
                )),
            )
            .map_err(HandlerErr::db)?;
            Ok(WriteOutcome::Updated(id))
        }
        None => {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO grade_records(id, student_id, course_code, course_title, credit_unit,
                     grade, re_exam, remarks, instructor, academic_year, semester, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &w.student_id,
                    &w.course_code,
                    w.course_title.as_deref().unwrap_or(""),
                    w.credit_unit,
                    &w.grade,
                    &w.re_exam,
                    w.remarks.as_deref().unwrap_or(""),
                    w.instructor.as_deref().unwrap_or(""),
                    &w.academic_year,
                    w.semester.as_str(),
                    now_rfc3339(),
                ),
            )
            .map_err(HandlerErr::db)?;
            db::audit(
                conn,
                actor,
                "CREATED",
                "grade_record",
                &id,
                Some(&format!(
                    "{} {} {}: {}",
                    w.course_code,
                    w.academic_year,
                    w.semester.as_str(),
                    w.grade
                )),
            )
            .map_err(HandlerErr::db)?;
            Ok(WriteOutcome::Created(id))
        }
    }
}

fn standardize_re_exam(raw: Option<String>) -> Result<Option<String>, HandlerErr> {
    match raw {
        None => Ok(None),
        Some(v) => ingest::standardize_grade(&v)
            .map(Some)
            .ok_or_else(|| {
                HandlerErr::bad_params("params.reExam is not a recognized grade value")
                    .with_details(json!({ "reExam": v }))
            }),
    }
}

fn list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = str_param(params, "studentId")?;
    let _ = get_student(conn, &student_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT course_code, course_title, credit_unit, grade, re_exam,
                    remarks, instructor, academic_year, semester
             FROM grade_records
             WHERE student_id = ?
             ORDER BY rowid",
        )
        .map_err(HandlerErr::db)?;
    let rows = stmt
        .query_map([&student_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<f64>>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, String>(6)?,
                r.get::<_, String>(7)?,
                r.get::<_, String>(8)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    // Group per course in first-seen order, then rank attempts per course.
    let mut order: Vec<String> = Vec::new();
    let mut titles: std::collections::HashMap<String, (String, Option<f64>)> =
        std::collections::HashMap::new();
    let mut by_course: std::collections::HashMap<String, Vec<GradeRecord>> =
        std::collections::HashMap::new();
    for (code, title, credit, grade, re_exam, remarks, instructor, ay, sem_raw) in rows {
        let semester = Semester::parse(&sem_raw).ok_or_else(|| {
            HandlerErr::new("invalid_row", "grade record has unknown semester")
                .with_details(json!({ "courseCode": code, "semester": sem_raw }))
        })?;
        if !by_course.contains_key(&code) {
            order.push(code.clone());
            titles.insert(code.clone(), (title, credit));
        }
        by_course.entry(code.clone()).or_default().push(GradeRecord {
            course_code: code,
            grade,
            re_exam,
            remarks,
            academic_year: ay,
            semester,
            instructor,
        });
    }

    let mut courses = Vec::with_capacity(order.len());
    for code in order {
        let records = &by_course[&code];
        let attempts = reconcile::order_attempts(records);
        let (title, credit) = titles[&code].clone();
        let effective_grade = attempts
            .last()
            .map(|a| a.effective_grade.clone())
            .unwrap_or_else(|| "-".to_string());
        courses.push(json!({
            "courseCode": code,
            "courseTitle": title,
            "creditUnit": credit,
            "effectiveGrade": effective_grade,
            "retakeCount": attempts.len().saturating_sub(1),
            "attempts": serde_json::to_value(&attempts)
                .map_err(|e| HandlerErr::new("serialize_failed", e.to_string()))?,
        }));
    }

    Ok(json!({ "studentId": student_id, "courses": courses }))
}

fn upsert(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = str_param(params, "studentId")?;
    let _ = get_student(conn, &student_id)?;
    let course_code = str_param(params, "courseCode")?;
    let raw_grade = str_param(params, "grade")?;
    let grade = ingest::standardize_grade(&raw_grade).ok_or_else(|| {
        HandlerErr::bad_params("params.grade is not a recognized grade value")
            .with_details(json!({ "grade": raw_grade }))
    })?;
    let re_exam = standardize_re_exam(opt_str_param(params, "reExam"))?;
    let academic_year = str_param(params, "academicYear")?;
    let semester = semester_param(params, "semester")?;
    let actor = opt_str_param(params, "actor").unwrap_or_else(|| "registrar".to_string());

    let credit_unit = match params.get("creditUnit") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => Some(v.as_f64().ok_or_else(|| {
            HandlerErr::bad_params("params.creditUnit must be a number")
        })?),
    };

    let write = GradeWrite {
        student_id,
        course_code,
        course_title: opt_str_param(params, "courseTitle"),
        credit_unit,
        grade,
        re_exam,
        remarks: opt_str_param(params, "remarks"),
        instructor: opt_str_param(params, "instructor"),
        academic_year,
        semester,
    };

    let (status, grade_id) = match apply_grade_write(conn, &actor, &write)? {
        WriteOutcome::Created(id) => ("created", id),
        WriteOutcome::Updated(id) => ("updated", id),
        WriteOutcome::KeptExisting(id) => ("keptExisting", id),
    };
    Ok(json!({ "status": status, "gradeId": grade_id }))
}

enum StudentResolution {
    One(String),
    NotFound,
    Ambiguous(Vec<serde_json::Value>),
}

fn resolve_upload_student(
    conn: &Connection,
    row: &serde_json::Value,
) -> Result<StudentResolution, HandlerErr> {
    if let Some(no) = opt_str_param(row, "studentNumber") {
        let id: Option<String> = conn
            .query_row("SELECT id FROM students WHERE student_no = ?", [&no], |r| {
                r.get(0)
            })
            .optional()
            .map_err(HandlerErr::db)?;
        return Ok(match id {
            Some(id) => StudentResolution::One(id),
            None => StudentResolution::NotFound,
        });
    }

    let first = opt_str_param(row, "firstName");
    let last = opt_str_param(row, "lastName");
    let (Some(first), Some(last)) = (first, last) else {
        return Err(HandlerErr::bad_params(
            "row needs studentNumber or firstName+lastName",
        ));
    };

    let mut stmt = conn
        .prepare(
            "SELECT id, student_no, last_name, first_name, program
             FROM students
             WHERE last_name = ? COLLATE NOCASE AND first_name = ? COLLATE NOCASE",
        )
        .map_err(HandlerErr::db)?;
    let matches = stmt
        .query_map((&last, &first), |r| {
            Ok(json!({
                "studentId": r.get::<_, String>(0)?,
                "studentNo": r.get::<_, Option<String>>(1)?,
                "lastName": r.get::<_, String>(2)?,
                "firstName": r.get::<_, String>(3)?,
                "program": r.get::<_, String>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    Ok(match matches.len() {
        0 => StudentResolution::NotFound,
        1 => StudentResolution::One(
            matches[0]["studentId"].as_str().unwrap_or_default().to_string(),
        ),
        _ => StudentResolution::Ambiguous(matches),
    })
}

fn upload_identifier(row: &serde_json::Value) -> String {
    if let Some(no) = opt_str_param(row, "studentNumber") {
        return no;
    }
    let last = opt_str_param(row, "lastName").unwrap_or_default();
    let first = opt_str_param(row, "firstName").unwrap_or_default();
    format!("{}, {}", last, first)
}

/// One result object per incoming row; a bad row never aborts the batch.
fn upload_row_outcome(
    conn: &Connection,
    actor: &str,
    row: &serde_json::Value,
) -> serde_json::Value {
    let identifier = upload_identifier(row);
    let course_code = opt_str_param(row, "courseCode").unwrap_or_default();
    let base = |status: &str| {
        json!({
            "identifier": identifier,
            "courseCode": course_code,
            "status": status,
        })
    };

    if course_code.is_empty() {
        return base("error: missing course code");
    }

    let student_id = match resolve_upload_student(conn, row) {
        Err(e) => return base(&format!("error: {}", e.message)),
        Ok(StudentResolution::One(id)) => id,
        Ok(StudentResolution::NotFound) => return base("error: student not found"),
        Ok(StudentResolution::Ambiguous(matches)) => {
            let mut out = base("error: ambiguous student match");
            out["possibleMatches"] = serde_json::Value::Array(matches);
            return out;
        }
    };

    let Some(raw_grade) = opt_str_param(row, "grade") else {
        return base("error: missing grade");
    };
    let Some(grade) = ingest::standardize_grade(&raw_grade) else {
        return base(&format!("error: unrecognized grade '{}'", raw_grade));
    };
    let re_exam = match opt_str_param(row, "reExam") {
        None => None,
        Some(v) => match ingest::standardize_grade(&v) {
            Some(canon) => Some(canon),
            None => return base(&format!("error: unrecognized re-exam '{}'", v)),
        },
    };
    let Some(academic_year) = opt_str_param(row, "academicYear") else {
        return base("error: missing academic year");
    };
    let Some(semester) = opt_str_param(row, "semester").and_then(|s| Semester::parse(&s)) else {
        return base("error: missing or invalid semester");
    };
    let credit_unit = row.get("creditUnit").and_then(|v| v.as_f64());

    let write = GradeWrite {
        student_id,
        course_code: course_code.clone(),
        course_title: opt_str_param(row, "courseTitle"),
        credit_unit,
        grade,
        re_exam,
        remarks: opt_str_param(row, "remarks"),
        instructor: opt_str_param(row, "instructor"),
        academic_year,
        semester,
    };

    match apply_grade_write(conn, actor, &write) {
        Ok(WriteOutcome::Created(_)) => base("created"),
        Ok(WriteOutcome::Updated(_)) => base("updated"),
        Ok(WriteOutcome::KeptExisting(_)) => base("kept existing"),
        Err(e) => base(&format!("error: {}", e.message)),
    }
}

fn upload_bulk(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let rows = params
        .get("rows")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing params.rows array"))?;
    if rows.len() > UPLOAD_MAX_ROWS {
        return Err(HandlerErr::bad_params(format!(
            "too many rows: {} (max {})",
            rows.len(),
            UPLOAD_MAX_ROWS
        ))
        .with_details(json!({ "max": UPLOAD_MAX_ROWS })));
    }
    let actor = opt_str_param(params, "actor").unwrap_or_else(|| "bulk-upload".to_string());

    let results: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| upload_row_outcome(conn, &actor, row))
        .collect();

    let count_of = |needle: &str| {
        results
            .iter()
            .filter(|r| r["status"].as_str() == Some(needle))
            .count()
    };
    let errors = results
        .iter()
        .filter(|r| {
            r["status"]
                .as_str()
                .map(|s| s.starts_with("error"))
                .unwrap_or(false)
        })
        .count();

    Ok(json!({
        "results": results,
        "created": count_of("created"),
        "updated": count_of("updated"),
        "keptExisting": count_of("kept existing"),
        "errors": errors,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "grades.list" => list(state, &req.params),
        "grades.upsert" => upsert(state, &req.params),
        "grades.uploadBulk" => upload_bulk(state, &req.params),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
