//! Coercion of loosely-typed payload fields into validated records.
//!
//! Every normalizer works record by record: a malformed candidate is dropped
//! and counted, never force-fit and never allowed to fail the batch.

use serde_json::Value;
use tracing::warn;

use crate::model::{Difficulty, FormulaRecord, NumericalSet, QuizRecord, RoadmapStep};

/// Records that survived normalization plus a count of those dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub items: Vec<T>,
    pub dropped: usize,
}

impl<T> Normalized<T> {
    fn from_candidates<'a>(
        value: Option<&'a Value>,
        label: &str,
        mut f: impl FnMut(usize, &'a Value) -> Option<T>,
    ) -> Self {
        let Some(candidates) = value.and_then(Value::as_array) else {
            if value.is_some_and(|v| !v.is_null()) {
                warn!(field = label, "expected an array, ignoring field");
            }
            return Self {
                items: Vec::new(),
                dropped: 0,
            };
        };

        let items: Vec<T> = candidates
            .iter()
            .enumerate()
            .filter_map(|(i, c)| f(i, c))
            .collect();
        let dropped = candidates.len() - items.len();
        if dropped > 0 {
            warn!(field = label, dropped, kept = items.len(), "dropped malformed records");
        }
        Self { items, dropped }
    }
}

// ---------------------------------------------------------------------------
// Quiz records
// ---------------------------------------------------------------------------

/// Normalize a sequence of candidate quiz records.
///
/// A non-array input yields no records.
pub fn normalize_quiz(value: Option<&Value>) -> Normalized<QuizRecord> {
    Normalized::from_candidates(value, "quiz", |_, c| normalize_quiz_record(c))
}

/// Normalize one candidate, or `None` if it is structurally invalid.
pub fn normalize_quiz_record(candidate: &Value) -> Option<QuizRecord> {
    let question = candidate.get("question").and_then(Value::as_str)?.trim();
    if question.is_empty() {
        return None;
    }

    let options = candidate
        .get("options")
        .and_then(Value::as_array)?
        .iter()
        .map(scalar_text)
        .collect::<Option<Vec<_>>>()?
        .into_iter()
        .filter(|o| !o.is_empty())
        .collect::<Vec<_>>();
    if options.is_empty() {
        return None;
    }

    let raw_answer = ["correctAnswer", "correct_answer", "answer"]
        .iter()
        .find_map(|key| candidate.get(*key).and_then(scalar_text))
        .unwrap_or_default();
    let correct = resolve_answer(&options, &raw_answer).to_string();

    let explanation = candidate
        .get("explanation")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    let difficulty = candidate
        .get("difficulty")
        .and_then(Value::as_str)
        .and_then(|d| d.parse().ok())
        .unwrap_or(Difficulty::Medium);

    QuizRecord::new(question, options, correct, explanation, difficulty)
}

/// Pick the option the raw answer designates.
///
/// Priority: an option equal to the answer, then a letter A-D mapped to its
/// index (out of range means the first option), then a case-insensitive
/// exact match, then the first option containing the answer, then the first
/// option. Checking verbatim equality first keeps re-normalization a no-op.
pub fn resolve_answer<'a>(options: &'a [String], raw_answer: &str) -> &'a str {
    let answer = raw_answer.trim();

    if let Some(exact) = options.iter().find(|o| o.as_str() == answer) {
        return exact;
    }

    let answer = match letter_index(answer) {
        Some(index) => options.get(index).unwrap_or(&options[0]).as_str(),
        None => answer,
    };

    let lowered = answer.to_lowercase();
    options
        .iter()
        .find(|o| o.to_lowercase() == lowered)
        .or_else(|| options.iter().find(|o| o.to_lowercase().contains(&lowered)))
        .unwrap_or(&options[0])
}

fn letter_index(answer: &str) -> Option<usize> {
    let mut chars = answer.chars();
    match (chars.next(), chars.next()) {
        (Some(c @ ('A'..='D' | 'a'..='d')), None) => {
            Some((c.to_ascii_uppercase() as u8 - b'A') as usize)
        }
        _ => None,
    }
}

/// Strings, numbers and booleans as trimmed text; anything else is `None`.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Numerical sets
// ---------------------------------------------------------------------------

/// Normalize formula-grouped problem sets, preserving input order.
///
/// A set is kept only if its formula is non-blank and at least one of its
/// problems survives quiz normalization.
pub fn normalize_numericals(value: Option<&Value>) -> Normalized<NumericalSet> {
    Normalized::from_candidates(value, "numericals", |i, candidate| {
        let formula = candidate.get("relatedFormula").and_then(Value::as_str)?.trim();
        let problems = normalize_quiz(candidate.get("problems"));
        if problems.dropped > 0 {
            warn!(set = i, formula, dropped = problems.dropped, "dropped malformed problems");
        }
        NumericalSet::new(formula, problems.items)
    })
}

// ---------------------------------------------------------------------------
// Auxiliary fields
// ---------------------------------------------------------------------------

/// Trimmed summary text, empty when absent.
pub fn normalize_summary(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Non-blank string tags.
pub fn normalize_patterns(value: Option<&Value>) -> Normalized<String> {
    Normalized::from_candidates(value, "patterns", |_, c| {
        c.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

pub fn normalize_formulas(value: Option<&Value>) -> Normalized<FormulaRecord> {
    Normalized::from_candidates(value, "formulas", |_, c| {
        let expression = c.get("expression").and_then(Value::as_str)?.trim();
        if expression.is_empty() {
            return None;
        }
        Some(FormulaRecord {
            expression: expression.to_string(),
            description: text_field(c, "description"),
        })
    })
}

/// Roadmap steps; `step` falls back to the 1-based position.
pub fn normalize_roadmap(value: Option<&Value>) -> Normalized<RoadmapStep> {
    Normalized::from_candidates(value, "roadmap", |i, c| {
        let title = text_field(c, "title");
        let description = text_field(c, "description");
        if title.is_empty() && description.is_empty() {
            return None;
        }
        let step = c
            .get("step")
            .and_then(Value::as_u64)
            .and_then(|s| u32::try_from(s).ok())
            .unwrap_or(i as u32 + 1);
        Some(RoadmapStep {
            step,
            title,
            description,
        })
    })
}

/// Optional diagram source, absent when blank.
pub fn normalize_diagram(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn text_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
