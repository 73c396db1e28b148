use crate::ipc::error::ok;
use crate::ipc::helpers::{
    f64_param_or, get_student, load_curriculum, load_grades, opt_str_param, require_db, str_param,
    semester_param, year_level_param, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::reconcile;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn to_value(v: impl serde::Serialize) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(v).map_err(|e| HandlerErr::new("serialize_failed", e.to_string()))
}

fn list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let program = str_param(params, "program")?;
    let major = opt_str_param(params, "major").unwrap_or_default();
    let items = load_curriculum(conn, &program, &major)?;
    Ok(json!({
        "program": program,
        "major": major,
        "items": to_value(items)?,
    }))
}

fn upsert(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let program = str_param(params, "program")?;
    let major = opt_str_param(params, "major").unwrap_or_default();
    let course_code = str_param(params, "courseCode")?;
    let course_title = str_param(params, "courseTitle")?;
    let year_level = year_level_param(params, "yearLevel")?;
    let semester = semester_param(params, "semester")?;
    let credit_lec = f64_param_or(params, "creditLec", 0.0)?;
    let credit_lab = f64_param_or(params, "creditLab", 0.0)?;
    let pre_requisite = opt_str_param(params, "preRequisite");
    if credit_lec < 0.0 || credit_lab < 0.0 {
        return Err(HandlerErr::bad_params("credits must not be negative"));
    }

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM curriculum_items WHERE program = ? AND major = ? AND course_code = ?",
            (&program, &major, &course_code),
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db)?;

    let (item_id, created) = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE curriculum_items
                 SET course_title = ?, year_level = ?, semester = ?,
                     credit_lec = ?, credit_lab = ?, pre_requisite = ?
                 WHERE id = ?",
                (
                    &course_title,
                    year_level.as_str(),
                    semester.as_str(),
                    credit_lec,
                    credit_lab,
                    &pre_requisite,
                    &id,
                ),
            )
            .map_err(HandlerErr::db)?;
            (id, false)
        }
        None => {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO curriculum_items(id, program, major, course_code, course_title,
                     year_level, semester, credit_lec, credit_lab, pre_requisite)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &program,
                    &major,
                    &course_code,
                    &course_title,
                    year_level.as_str(),
                    semester.as_str(),
                    credit_lec,
                    credit_lab,
                    &pre_requisite,
                ),
            )
            .map_err(HandlerErr::db)?;
            (id, true)
        }
    };

    Ok(json!({ "itemId": item_id, "created": created }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let program = str_param(params, "program")?;
    let major = opt_str_param(params, "major").unwrap_or_default();
    let course_code = str_param(params, "courseCode")?;
    let n = conn
        .execute(
            "DELETE FROM curriculum_items WHERE program = ? AND major = ? AND course_code = ?",
            (&program, &major, &course_code),
        )
        .map_err(HandlerErr::db)?;
    if n == 0 {
        return Err(HandlerErr::new("not_found", "curriculum item not found")
            .with_details(json!({ "courseCode": course_code })));
    }
    Ok(json!({ "deleted": n }))
}

/// The registrar checklist view: the student's curriculum merged with their
/// grade history through the reconciliation engine.
fn checklist(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = str_param(params, "studentId")?;
    let student = get_student(conn, &student_id)?;
    let curriculum = load_curriculum(conn, &student.program, &student.major)?;
    let grades = load_grades(conn, &student_id)?;
    let out = reconcile::reconcile(&curriculum, &grades);
    Ok(json!({
        "student": student.to_json(),
        "subjects": to_value(out.subjects)?,
        "summary": to_value(out.summary)?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "curriculum.list" => list(state, &req.params),
        "curriculum.upsert" => upsert(state, &req.params),
        "curriculum.delete" => delete(state, &req.params),
        "curriculum.checklist" => checklist(state, &req.params),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
