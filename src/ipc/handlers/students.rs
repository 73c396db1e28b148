use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_student, now_rfc3339, opt_str_param, require_db, str_param, year_level_param, HandlerErr,
    STUDENT_COLUMNS,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let program = opt_str_param(params, "program");
    let major = opt_str_param(params, "major");
    let search = opt_str_param(params, "search");
    let include_inactive = params
        .get("includeInactive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let mut sql = format!("SELECT {} FROM students WHERE 1=1", STUDENT_COLUMNS);
    let mut binds: Vec<Value> = Vec::new();
    if !include_inactive {
        sql.push_str(" AND active = 1");
    }
    if let Some(p) = program {
        sql.push_str(" AND program = ?");
        binds.push(Value::Text(p));
    }
    if let Some(m) = major {
        sql.push_str(" AND major = ?");
        binds.push(Value::Text(m));
    }
    if let Some(s) = search {
        sql.push_str(" AND (last_name LIKE ? OR first_name LIKE ? OR student_no LIKE ?)");
        let pat = format!("%{}%", s);
        binds.push(Value::Text(pat.clone()));
        binds.push(Value::Text(pat.clone()));
        binds.push(Value::Text(pat));
    }
    sql.push_str(" ORDER BY last_name, first_name");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::db)?;
    let students = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok(json!({
                "studentId": r.get::<_, String>(0)?,
                "studentNo": r.get::<_, Option<String>>(1)?,
                "lastName": r.get::<_, String>(2)?,
                "firstName": r.get::<_, String>(3)?,
                "program": r.get::<_, String>(4)?,
                "major": r.get::<_, String>(5)?,
                "yearLevel": r.get::<_, String>(6)?,
                "active": r.get::<_, i64>(7)? != 0,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    Ok(json!({ "students": students }))
}

fn get(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = str_param(params, "studentId")?;
    let student = get_student(conn, &student_id)?;
    Ok(json!({ "student": student.to_json() }))
}

fn create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let last_name = str_param(params, "lastName")?;
    let first_name = str_param(params, "firstName")?;
    let program = str_param(params, "program")?;
    let major = opt_str_param(params, "major").unwrap_or_default();
    let year_level = year_level_param(params, "yearLevel")?;
    let student_no = opt_str_param(params, "studentNo");

    if let Some(no) = &student_no {
        let existing: Option<String> = conn
            .query_row("SELECT id FROM students WHERE student_no = ?", [no], |r| {
                r.get(0)
            })
            .optional()
            .map_err(HandlerErr::db)?;
        if let Some(id) = existing {
            return Err(HandlerErr::new("conflict", "student number already in use")
                .with_details(json!({ "studentId": id, "studentNo": no })));
        }
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, student_no, last_name, first_name, program, major, year_level, active, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)",
        (
            &id,
            &student_no,
            &last_name,
            &first_name,
            &program,
            &major,
            year_level.as_str(),
            now_rfc3339(),
        ),
    )
    .map_err(HandlerErr::db)?;

    Ok(json!({ "studentId": id }))
}

fn update(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = str_param(params, "studentId")?;
    let _ = get_student(conn, &student_id)?;

    let mut sets: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    if let Some(v) = opt_str_param(params, "studentNo") {
        sets.push("student_no = ?");
        binds.push(Value::Text(v));
    }
    if let Some(v) = opt_str_param(params, "lastName") {
        sets.push("last_name = ?");
        binds.push(Value::Text(v));
    }
    if let Some(v) = opt_str_param(params, "firstName") {
        sets.push("first_name = ?");
        binds.push(Value::Text(v));
    }
    if let Some(v) = opt_str_param(params, "program") {
        sets.push("program = ?");
        binds.push(Value::Text(v));
    }
    if let Some(v) = opt_str_param(params, "major") {
        sets.push("major = ?");
        binds.push(Value::Text(v));
    }
    if params.get("yearLevel").is_some() {
        let level = year_level_param(params, "yearLevel")?;
        sets.push("year_level = ?");
        binds.push(Value::Text(level.as_str().to_string()));
    }
    if let Some(v) = params.get("active").and_then(|v| v.as_bool()) {
        sets.push("active = ?");
        binds.push(Value::Integer(if v { 1 } else { 0 }));
    }
    if sets.is_empty() {
        return Err(HandlerErr::bad_params("no fields to update"));
    }
    sets.push("updated_at = ?");
    binds.push(Value::Text(now_rfc3339()));
    binds.push(Value::Text(student_id.clone()));

    let sql = format!("UPDATE students SET {} WHERE id = ?", sets.join(", "));
    conn.execute(&sql, params_from_iter(binds))
        .map_err(HandlerErr::db)?;

    let student = get_student(conn, &student_id)?;
    Ok(json!({ "student": student.to_json() }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = str_param(params, "studentId")?;
    let _ = get_student(conn, &student_id)?;

    // Soft delete: grade history stays queryable for transcripts.
    conn.execute(
        "UPDATE students SET active = 0, updated_at = ? WHERE id = ?",
        (now_rfc3339(), &student_id),
    )
    .map_err(HandlerErr::db)?;
    Ok(json!({ "studentId": student_id, "active": false }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "students.list" => list(state, &req.params),
        "students.get" => get(state, &req.params),
        "students.create" => create(state, &req.params),
        "students.update" => update(state, &req.params),
        "students.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
