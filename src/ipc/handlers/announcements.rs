use crate::ipc::error::ok;
use crate::ipc::helpers::{now_rfc3339, opt_str_param, require_db, str_param, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn list(state: &AppState, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut stmt = conn
        .prepare(
            "SELECT id, title, body, audience, posted_at
             FROM announcements
             ORDER BY posted_at DESC",
        )
        .map_err(HandlerErr::db)?;
    let announcements = stmt
        .query_map([], |r| {
            Ok(json!({
                "announcementId": r.get::<_, String>(0)?,
                "title": r.get::<_, String>(1)?,
                "body": r.get::<_, String>(2)?,
                "audience": r.get::<_, String>(3)?,
                "postedAt": r.get::<_, String>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;
    Ok(json!({ "announcements": announcements }))
}

fn create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let title = str_param(params, "title")?;
    let body = str_param(params, "body")?;
    let audience = opt_str_param(params, "audience").unwrap_or_else(|| "ALL".to_string());

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO announcements(id, title, body, audience, posted_at)
         VALUES (?, ?, ?, ?, ?)",
        (&id, &title, &body, &audience, now_rfc3339()),
    )
    .map_err(HandlerErr::db)?;
    Ok(json!({ "announcementId": id }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = str_param(params, "announcementId")?;
    let n = conn
        .execute("DELETE FROM announcements WHERE id = ?", [&id])
        .map_err(HandlerErr::db)?;
    if n == 0 {
        return Err(HandlerErr::new("not_found", "announcement not found"));
    }
    Ok(json!({ "deleted": n }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "announcements.list" => list(state, &req.params),
        "announcements.create" => create(state, &req.params),
        "announcements.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
