use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use crate::ipc::error::err;
use crate::ipc::types::AppState;
use crate::reconcile::{CurriculumItem, GradeRecord, Semester, YearLevel};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn db(e: impl std::fmt::Display) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "no workspace selected"))
}

pub fn str_param(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(HandlerErr::bad_params(format!("missing params.{}", key))),
    }
}

pub fn opt_str_param(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn f64_param_or(
    params: &serde_json::Value,
    key: &str,
    default: f64,
) -> Result<f64, HandlerErr> {
    match params.get(key) {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| HandlerErr::bad_params(format!("params.{} must be a number", key))),
    }
}

pub fn semester_param(params: &serde_json::Value, key: &str) -> Result<Semester, HandlerErr> {
    let raw = str_param(params, key)?;
    Semester::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params(format!("params.{} must be FIRST, SECOND or MIDYEAR", key))
    })
}

pub fn year_level_param(params: &serde_json::Value, key: &str) -> Result<YearLevel, HandlerErr> {
    let raw = str_param(params, key)?;
    YearLevel::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params(format!(
            "params.{} must be FIRST, SECOND, THIRD or FOURTH",
            key
        ))
    })
}

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub id: String,
    pub student_no: Option<String>,
    pub last_name: String,
    pub first_name: String,
    pub program: String,
    pub major: String,
    pub year_level: String,
    pub active: bool,
}

impl StudentRow {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "studentId": self.id,
            "studentNo": self.student_no,
            "lastName": self.last_name,
            "firstName": self.first_name,
            "program": self.program,
            "major": self.major,
            "yearLevel": self.year_level,
            "active": self.active,
        })
    }
}

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        student_no: r.get(1)?,
        last_name: r.get(2)?,
        first_name: r.get(3)?,
        program: r.get(4)?,
        major: r.get(5)?,
        year_level: r.get(6)?,
        active: r.get::<_, i64>(7)? != 0,
    })
}

pub const STUDENT_COLUMNS: &str =
    "id, student_no, last_name, first_name, program, major, year_level, active";

pub fn get_student(conn: &Connection, student_id: &str) -> Result<StudentRow, HandlerErr> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
            [student_id],
            |r| student_from_row(r),
        )
        .optional()
        .map_err(HandlerErr::db)?;
    row.ok_or_else(|| {
        HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id }))
    })
}

/// Checklist slots for one program/major, ordered by year level, semester,
/// then course code.
pub fn load_curriculum(
    conn: &Connection,
    program: &str,
    major: &str,
) -> Result<Vec<CurriculumItem>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT course_code, course_title, year_level, semester,
                    credit_lec, credit_lab, pre_requisite
             FROM curriculum_items
             WHERE program = ? AND major = ?",
        )
        .map_err(HandlerErr::db)?;
    let rows = stmt
        .query_map((program, major), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, f64>(4)?,
                r.get::<_, f64>(5)?,
                r.get::<_, Option<String>>(6)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    let mut items = Vec::with_capacity(rows.len());
    for (code, title, year_raw, sem_raw, lec, lab, prereq) in rows {
        let year_level = YearLevel::parse(&year_raw).ok_or_else(|| {
            HandlerErr::new("invalid_row", "curriculum item has unknown year level")
                .with_details(json!({ "courseCode": code, "yearLevel": year_raw }))
        })?;
        let semester = Semester::parse(&sem_raw).ok_or_else(|| {
            HandlerErr::new("invalid_row", "curriculum item has unknown semester")
                .with_details(json!({ "courseCode": code, "semester": sem_raw }))
        })?;
        items.push(CurriculumItem {
            course_code: code,
            course_title: title,
            year_level,
            semester,
            credit_lec: lec,
            credit_lab: lab,
            pre_requisite: prereq,
        });
    }
    items.sort_by(|a, b| {
        (a.year_level, a.semester, a.course_code.as_str()).cmp(&(
            b.year_level,
            b.semester,
            b.course_code.as_str(),
        ))
    });
    Ok(items)
}

/// All grade rows for one student, in insertion order. Rows whose semester
/// label no longer parses are surfaced as errors rather than silently
/// dropped from the reconciliation.
pub fn load_grades(conn: &Connection, student_id: &str) -> Result<Vec<GradeRecord>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT course_code, grade, re_exam, remarks, instructor, academic_year, semester
             FROM grade_records
             WHERE student_id = ?
             ORDER BY rowid",
        )
        .map_err(HandlerErr::db)?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, String>(6)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    let mut records = Vec::with_capacity(rows.len());
    for (code, grade, re_exam, remarks, instructor, ay, sem_raw) in rows {
        let semester = Semester::parse(&sem_raw).ok_or_else(|| {
            HandlerErr::new("invalid_row", "grade record has unknown semester")
                .with_details(json!({ "courseCode": code, "semester": sem_raw }))
        })?;
        records.push(GradeRecord {
            course_code: code,
            grade,
            re_exam,
            remarks,
            academic_year: ay,
            semester,
            instructor,
        });
    }
    Ok(records)
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
