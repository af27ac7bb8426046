//! Core data model types for palace.
//!
//! These are the normalized study records the pipeline produces. Every type
//! here is built once and never mutated; `QuizRecord` and `NumericalSet` keep
//! their fields private so their invariants hold by construction, including
//! when they are read back from a persistence collaborator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Difficulty tag attached to every quiz record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// One multiple-choice question.
///
/// `correct_answer` is always one of `options`, verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "QuizRecordRepr")]
pub struct QuizRecord {
    question: String,
    options: Vec<String>,
    correct_answer: String,
    explanation: String,
    difficulty: Difficulty,
}

impl QuizRecord {
    /// Build a record, returning `None` if the options are empty or the
    /// answer is not one of them.
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        correct_answer: impl Into<String>,
        explanation: impl Into<String>,
        difficulty: Difficulty,
    ) -> Option<Self> {
        let question = question.into();
        let correct_answer = correct_answer.into();
        if question.is_empty() || options.is_empty() || !options.contains(&correct_answer) {
            return None;
        }
        Some(Self {
            question,
            options,
            correct_answer,
            explanation: explanation.into(),
            difficulty,
        })
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn correct_answer(&self) -> &str {
        &self.correct_answer
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuizRecordRepr {
    question: String,
    options: Vec<String>,
    correct_answer: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    difficulty: Difficulty,
}

impl TryFrom<QuizRecordRepr> for QuizRecord {
    type Error = String;

    fn try_from(r: QuizRecordRepr) -> Result<Self, Self::Error> {
        let question = r.question.clone();
        QuizRecord::new(
            r.question,
            r.options,
            r.correct_answer,
            r.explanation,
            r.difficulty,
        )
        .ok_or_else(|| format!("quiz record '{question}' has no options or an answer outside them"))
    }
}

/// Quiz records grouped under one formula. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "NumericalSetRepr")]
pub struct NumericalSet {
    related_formula: String,
    problems: Vec<QuizRecord>,
}

impl NumericalSet {
    /// Returns `None` when the formula is blank or there are no problems.
    pub fn new(related_formula: impl Into<String>, problems: Vec<QuizRecord>) -> Option<Self> {
        let related_formula = related_formula.into();
        if related_formula.trim().is_empty() || problems.is_empty() {
            return None;
        }
        Some(Self {
            related_formula,
            problems,
        })
    }

    pub fn related_formula(&self) -> &str {
        &self.related_formula
    }

    pub fn problems(&self) -> &[QuizRecord] {
        &self.problems
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NumericalSetRepr {
    related_formula: String,
    problems: Vec<QuizRecord>,
}

impl TryFrom<NumericalSetRepr> for NumericalSet {
    type Error = String;

    fn try_from(r: NumericalSetRepr) -> Result<Self, Self::Error> {
        NumericalSet::new(r.related_formula, r.problems)
            .ok_or_else(|| "numerical set needs a formula and at least one problem".to_string())
    }
}

/// A formula surfaced from the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaRecord {
    /// The expression itself (e.g. "E = mc^2").
    pub expression: String,
    /// What the formula describes.
    #[serde(default)]
    pub description: String,
}

/// One step of a learning roadmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadmapStep {
    pub step: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// The pipeline's sole output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default)]
    pub summary: String,
    /// Key concepts or keywords.
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub formulas: Vec<FormulaRecord>,
    /// Conceptual questions.
    #[serde(default)]
    pub quiz: Vec<QuizRecord>,
    /// Numerical problems grouped by formula.
    #[serde(default)]
    pub numericals: Vec<NumericalSet>,
    #[serde(default)]
    pub roadmap: Vec<RoadmapStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram: Option<String>,
}

impl AnalysisResult {
    /// Total number of quiz records, conceptual and numerical.
    pub fn question_count(&self) -> usize {
        self.quiz.len()
            + self
                .numericals
                .iter()
                .map(|s| s.problems().len())
                .sum::<usize>()
    }
}
