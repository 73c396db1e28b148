use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("registrar.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_no TEXT,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            program TEXT NOT NULL,
            major TEXT NOT NULL DEFAULT '',
            year_level TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_students_student_no
         ON students(student_no) WHERE student_no IS NOT NULL",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_name ON students(last_name, first_name)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_program ON students(program, major)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS curriculum_items(
            id TEXT PRIMARY KEY,
            program TEXT NOT NULL,
            major TEXT NOT NULL DEFAULT '',
            course_code TEXT NOT NULL,
            course_title TEXT NOT NULL,
            year_level TEXT NOT NULL,
            semester TEXT NOT NULL,
            credit_lec REAL NOT NULL DEFAULT 0,
            credit_lab REAL NOT NULL DEFAULT 0,
            pre_requisite TEXT,
            UNIQUE(program, major, course_code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_curriculum_program ON curriculum_items(program, major)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            course_code TEXT NOT NULL,
            course_title TEXT NOT NULL DEFAULT '',
            credit_unit REAL,
            grade TEXT NOT NULL,
            re_exam TEXT,
            remarks TEXT NOT NULL DEFAULT '',
            instructor TEXT NOT NULL DEFAULT '',
            academic_year TEXT NOT NULL,
            semester TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, course_code, academic_year, semester)
        )",
        [],
    )?;

    // Early workspaces stored only the original grade; re-exam came later.
    ensure_grade_records_re_exam(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_records_student ON grade_records(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_records_course
         ON grade_records(student_id, course_code)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS announcements(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            audience TEXT NOT NULL DEFAULT 'ALL',
            posted_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log(
            id TEXT PRIMARY KEY,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            entity TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            detail TEXT,
            at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_log_entity ON audit_log(entity, entity_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_grade_records_re_exam(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "grade_records", "re_exam")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE grade_records ADD COLUMN re_exam TEXT", [])?;
    Ok(())
}

pub fn audit(
    conn: &Connection,
    actor: &str,
    action: &str,
    entity: &str,
    entity_id: &str,
    detail: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO audit_log(id, actor, action, entity, entity_id, detail, at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        (
            uuid::Uuid::new_v4().to_string(),
            actor,
            action,
            entity,
            entity_id,
            detail,
            chrono::Utc::now().to_rfc3339(),
        ),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
