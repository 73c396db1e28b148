/// Pure rules for ingesting externally-sourced grade rows: value
/// standardization and the "don't overwrite a better grade" guard.
///
/// Fixed total order over grade values, best first. Index position is the
/// comparison key; numeric grades are inverted (1.00 best) and sentinels
/// rank below every numeric value.
pub const GRADE_ORDER: [&str; 15] = [
    "1.00", "1.25", "1.50", "1.75", "2.00", "2.25", "2.50", "2.75", "3.00", "4.00", "5.00",
    "DRP", "INC", "S", "US",
];

/// Position of a grade value in the fixed order; lower is better.
/// Unknown values have no rank.
pub fn grade_rank(value: &str) -> Option<usize> {
    let t = value.trim();
    GRADE_ORDER.iter().position(|g| g.eq_ignore_ascii_case(t))
}

/// Canonical form of an incoming grade string. Exact (case-insensitive)
/// matches against the fixed values keep the canonical spelling; anything
/// else must parse as a float and is reformatted to two decimals. None
/// means the row should be rejected.
pub fn standardize_grade(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    if let Some(pos) = GRADE_ORDER.iter().position(|g| g.eq_ignore_ascii_case(t)) {
        return Some(GRADE_ORDER[pos].to_string());
    }
    let v = t.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(format!("{:.2}", v))
}

/// True when a stored grade is strictly better than the incoming one and
/// must be kept. Values outside the fixed order never block an overwrite.
pub fn keep_existing(existing: &str, incoming: &str) -> bool {
    match (grade_rank(existing), grade_rank(incoming)) {
        (Some(e), Some(n)) => e < n,
        _ => false,
    }
}
