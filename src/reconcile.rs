use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Semester within an academic year. The derived order (First < Second <
/// Midyear) is the chronological order used for attempt ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Semester {
    First,
    Second,
    Midyear,
}

impl Semester {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIRST" => Some(Self::First),
            "SECOND" => Some(Self::Second),
            "MIDYEAR" => Some(Self::Midyear),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::First => "FIRST",
            Self::Second => "SECOND",
            Self::Midyear => "MIDYEAR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum YearLevel {
    First,
    Second,
    Third,
    Fourth,
}

impl YearLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIRST" => Some(Self::First),
            "SECOND" => Some(Self::Second),
            "THIRD" => Some(Self::Third),
            "FOURTH" => Some(Self::Fourth),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::First => "FIRST",
            Self::Second => "SECOND",
            Self::Third => "THIRD",
            Self::Fourth => "FOURTH",
        }
    }
}

/// One required course slot in a program's checklist.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumItem {
    pub course_code: String,
    pub course_title: String,
    pub year_level: YearLevel,
    pub semester: Semester,
    pub credit_lec: f64,
    pub credit_lab: f64,
    pub pre_requisite: Option<String>,
}

/// One stored grade row for a student. A course may have several of these
/// (retakes across terms); `re_exam` is a supplementary grade for the same
/// attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    pub course_code: String,
    pub grade: String,
    pub re_exam: Option<String>,
    pub remarks: String,
    pub academic_year: String,
    pub semester: Semester,
    pub instructor: String,
}

/// A grade record ranked within its course's history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub grade: String,
    pub re_exam: Option<String>,
    pub effective_grade: String,
    pub remarks: String,
    pub academic_year: String,
    pub semester: Semester,
    pub instructor: String,
    pub attempt_number: usize,
    pub is_retaken: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompletionStatus {
    #[serde(rename = "Not Taken")]
    NotTaken,
    Incomplete,
    Failed,
    Unsatisfactory,
    #[serde(rename = "Con. Failure")]
    ConFailure,
    Dropped,
    Completed,
}

/// A curriculum slot annotated with the student's grade history for it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledSubject {
    pub course_code: String,
    pub course_title: String,
    pub year_level: YearLevel,
    pub semester: Semester,
    pub credit_lec: f64,
    pub credit_lab: f64,
    pub pre_requisite: Option<String>,
    pub effective_grade: String,
    pub completion_status: CompletionStatus,
    pub attempts: Vec<Attempt>,
    pub retake_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub credits_completed: f64,
    pub total_credits_required: f64,
    pub completion_rate: i64,
    pub current_gpa: f64,
    pub subjects_completed: usize,
    pub subjects_remaining: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub subjects: Vec<ReconciledSubject>,
    pub summary: ProgressSummary,
}

/// Plain half-up rounding to 2 decimals, for display values.
pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Start year of an `AY_<start>_<end>` label. Malformed labels yield None
/// and sort before well-formed ones.
pub fn academic_year_start(label: &str) -> Option<i64> {
    let mut parts = label.trim().split('_');
    if !parts.next()?.eq_ignore_ascii_case("AY") {
        return None;
    }
    parts.next()?.parse::<i64>().ok()
}

fn parse_numeric(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Better of an original grade and its re-exam, on the inverted scale
/// (numerically lower is better). Sentinels (INC, DRP, S, US) fail the
/// numeric parse; between two sentinels the original grade wins by position.
/// Returns "-" when both are blank. Total: malformed strings are simply
/// not numeric.
pub fn better_grade(grade: &str, re_exam: Option<&str>) -> String {
    let g = grade.trim();
    let r = re_exam.unwrap_or("").trim();
    match (parse_numeric(g), parse_numeric(r)) {
        (Some(gv), Some(rv)) => {
            if rv < gv {
                r.to_string()
            } else {
                g.to_string()
            }
        }
        (Some(_), None) => g.to_string(),
        (None, Some(_)) => r.to_string(),
        (None, None) => {
            if !g.is_empty() {
                g.to_string()
            } else if !r.is_empty() {
                r.to_string()
            } else {
                "-".to_string()
            }
        }
    }
}

/// Rank one course's grade rows chronologically and annotate them.
/// Ordering is (academic year start, semester), stable on ties so duplicate
/// terms keep insertion order instead of failing.
pub fn order_attempts(records: &[GradeRecord]) -> Vec<Attempt> {
    let mut indexed: Vec<(usize, &GradeRecord)> = records.iter().enumerate().collect();
    if indexed.len() > 1 {
        indexed.sort_by(|(ai, a), (bi, b)| {
            let a_key = (academic_year_start(&a.academic_year), a.semester);
            let b_key = (academic_year_start(&b.academic_year), b.semester);
            a_key.cmp(&b_key).then(ai.cmp(bi))
        });
    }

    indexed
        .into_iter()
        .enumerate()
        .map(|(rank, (_, rec))| Attempt {
            grade: rec.grade.clone(),
            re_exam: rec.re_exam.clone(),
            effective_grade: better_grade(&rec.grade, rec.re_exam.as_deref()),
            remarks: rec.remarks.clone(),
            academic_year: rec.academic_year.clone(),
            semester: rec.semester,
            instructor: rec.instructor.clone(),
            attempt_number: rank + 1,
            is_retaken: rank > 0,
        })
        .collect()
}

/// Completion status from the latest attempt only. Earlier attempts are kept
/// for display but never change the classification. Rules apply in priority
/// order; the effective grade (post re-exam selection) feeds the INC check.
pub fn classify(latest: Option<&Attempt>) -> CompletionStatus {
    let Some(a) = latest else {
        return CompletionStatus::NotTaken;
    };
    let remarks = a.remarks.to_ascii_uppercase();
    if a.effective_grade.trim().eq_ignore_ascii_case("INC") || remarks.contains("LACK OF REQ.") {
        CompletionStatus::Incomplete
    } else if remarks.contains("FAILED") {
        CompletionStatus::Failed
    } else if remarks.contains("UNSATISFACTORY") {
        CompletionStatus::Unsatisfactory
    } else if remarks.contains("CON. FAILURE") {
        CompletionStatus::ConFailure
    } else if remarks.contains("DROPPED") {
        CompletionStatus::Dropped
    } else {
        CompletionStatus::Completed
    }
}

/// Merge a student's grade history against a curriculum checklist.
///
/// Left-outer-join semantics: every curriculum item yields exactly one
/// subject, unmatched ones as Not Taken. Grade rows for courses outside the
/// checklist are ignored here (they still appear in the raw grade list).
/// Pure: same inputs always produce the same output.
pub fn reconcile(curriculum: &[CurriculumItem], grades: &[GradeRecord]) -> Reconciliation {
    let mut by_course: HashMap<&str, Vec<GradeRecord>> = HashMap::new();
    for g in grades {
        by_course.entry(g.course_code.as_str()).or_default().push(g.clone());
    }

    let subjects: Vec<ReconciledSubject> = curriculum
        .iter()
        .map(|item| {
            let attempts = by_course
                .get(item.course_code.as_str())
                .map(|recs| order_attempts(recs))
                .unwrap_or_default();
            let latest = attempts.last();
            let completion_status = classify(latest);
            let effective_grade = latest
                .map(|a| a.effective_grade.clone())
                .unwrap_or_else(|| "-".to_string());
            let retake_count = attempts.len().saturating_sub(1);
            ReconciledSubject {
                course_code: item.course_code.clone(),
                course_title: item.course_title.clone(),
                year_level: item.year_level,
                semester: item.semester,
                credit_lec: item.credit_lec,
                credit_lab: item.credit_lab,
                pre_requisite: item.pre_requisite.clone(),
                effective_grade,
                completion_status,
                attempts,
                retake_count,
            }
        })
        .collect();

    let total_credits_required: f64 = curriculum
        .iter()
        .map(|i| i.credit_lec + i.credit_lab)
        .sum();

    let mut credits_completed = 0.0_f64;
    let mut subjects_completed = 0_usize;
    let mut gpa_weighted_sum = 0.0_f64;
    let mut gpa_credit_sum = 0.0_f64;
    for s in &subjects {
        if s.completion_status != CompletionStatus::Completed {
            continue;
        }
        let credits = s.credit_lec + s.credit_lab;
        credits_completed += credits;
        subjects_completed += 1;
        // Inverted scale: 1.00 is best. The weighted mean stays on that
        // scale; do not convert to a 4.0-style GPA.
        if let Some(v) = parse_numeric(&s.effective_grade) {
            gpa_weighted_sum += v * credits;
            gpa_credit_sum += credits;
        }
    }

    let current_gpa = if gpa_credit_sum > 0.0 {
        round_2_decimals(gpa_weighted_sum / gpa_credit_sum)
    } else {
        0.0
    };
    let completion_rate = if total_credits_required > 0.0 {
        (credits_completed / total_credits_required * 100.0).round() as i64
    } else {
        0
    };

    let summary = ProgressSummary {
        credits_completed,
        total_credits_required,
        completion_rate,
        current_gpa,
        subjects_completed,
        subjects_remaining: subjects.len() - subjects_completed,
    };

    Reconciliation { subjects, summary }
}
