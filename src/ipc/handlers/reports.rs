use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_student, load_curriculum, load_grades, now_rfc3339, require_db, str_param, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{self, ReconciledSubject};
use serde_json::json;

fn subject_json(s: &ReconciledSubject) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(s).map_err(|e| HandlerErr::new("serialize_failed", e.to_string()))
}

/// Report model for a certificate of grades: the reconciled checklist grouped
/// into year-level/semester sections, plus the progress summary. Layout and
/// rendering belong to the caller.
fn certificate(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = str_param(params, "studentId")?;
    let student = get_student(conn, &student_id)?;
    let curriculum = load_curriculum(conn, &student.program, &student.major)?;
    let grades = load_grades(conn, &student_id)?;
    let out = reconcile::reconcile(&curriculum, &grades);

    // Subjects arrive sorted by (year level, semester); sections are the
    // contiguous runs of that key.
    let mut sections: Vec<serde_json::Value> = Vec::new();
    let mut current_key = None;
    let mut current: Vec<serde_json::Value> = Vec::new();
    let mut current_credits = 0.0_f64;
    for s in &out.subjects {
        let key = (s.year_level, s.semester);
        if current_key != Some(key) {
            if let Some((yl, sem)) = current_key {
                sections.push(json!({
                    "yearLevel": yl.as_str(),
                    "semester": sem.as_str(),
                    "sectionCredits": current_credits,
                    "subjects": std::mem::take(&mut current),
                }));
            }
            current_key = Some(key);
            current_credits = 0.0;
        }
        current_credits += s.credit_lec + s.credit_lab;
        current.push(subject_json(s)?);
    }
    if let Some((yl, sem)) = current_key {
        sections.push(json!({
            "yearLevel": yl.as_str(),
            "semester": sem.as_str(),
            "sectionCredits": current_credits,
            "subjects": current,
        }));
    }

    Ok(json!({
        "student": student.to_json(),
        "generatedAt": now_rfc3339(),
        "sections": sections,
        "summary": serde_json::to_value(&out.summary)
            .map_err(|e| HandlerErr::new("serialize_failed", e.to_string()))?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "reports.certificate" => certificate(state, &req.params),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
