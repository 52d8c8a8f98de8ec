//! Answer quality metrics.
//!
//! Gold answers are free text, so a doc id counts as correct when the gold answer contains it.
//! - Accuracy: share of questions whose predicted doc id is in the gold answer
//! - Top-k hits: questions with any rescored candidate in the gold answer
//! - MRR: mean of 1/rank of the first such candidate, 0 when there is none

use crate::engine::Prediction;
use crate::questions::Question;
use crate::ScoredResult;
use std::fmt;

/// Per-question result, kept for inspecting right and wrong answers.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionOutcome {
    pub question: Question,
    pub predicted: String,
    pub correct: bool,
    /// 1-based rank of the first rescored candidate found in the gold answer.
    pub first_match: Option<usize>,
    /// Whether any first-pass candidate was found in the gold answer.
    pub first_pass_hit: bool,
}

impl QuestionOutcome {
    pub fn reciprocal_rank(&self) -> f64 {
        self.first_match.map(|r| 1.0 / r as f64).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub top_k_hits: usize,
    pub first_pass_hits: usize,
    pub mrr: f64,
    pub outcomes: Vec<QuestionOutcome>,
}

impl Evaluation {
    pub fn correct_questions(&self) -> impl Iterator<Item = &QuestionOutcome> {
        self.outcomes.iter().filter(|o| o.correct)
    }

    pub fn incorrect_questions(&self) -> impl Iterator<Item = &QuestionOutcome> {
        self.outcomes.iter().filter(|o| !o.correct)
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "correct: {}", self.correct)?;
        writeln!(f, "questions: {}", self.total)?;
        writeln!(f, "accuracy: {:.4}", self.accuracy)?;
        writeln!(f, "top-k hits: {}", self.top_k_hits)?;
        writeln!(f, "first-pass hits: {}", self.first_pass_hits)?;
        write!(f, "MRR: {:.4}", self.mrr)
    }
}

/// An empty doc id (no answer) never matches.
pub fn answer_matches(gold: &str, doc_id: &str) -> bool {
    !doc_id.is_empty() && gold.contains(doc_id)
}

/// 1-based position of the first candidate contained in `gold`.
pub fn first_match(gold: &str, candidates: &[ScoredResult]) -> Option<usize> {
    candidates.iter().position(|c| answer_matches(gold, &c.doc_id)).map(|i| i + 1)
}

pub fn outcome(question: &Question, prediction: &Prediction) -> QuestionOutcome {
    let predicted = prediction.answer.doc_id().to_string();
    QuestionOutcome {
        correct: answer_matches(&question.answer, &predicted),
        first_match: first_match(&question.answer, &prediction.rescored),
        first_pass_hit: first_match(&question.answer, &prediction.first_pass).is_some(),
        question: question.clone(),
        predicted,
    }
}

/// Scores predictions against their questions, pairwise in order.
pub fn evaluate(questions: &[Question], predictions: &[Prediction]) -> Evaluation {
    if questions.len() != predictions.len() {
        tracing::warn!(questions = questions.len(), predictions = predictions.len(), "evaluating the shorter of two unequal lists");
    }
    let outcomes: Vec<QuestionOutcome> = questions.iter().zip(predictions).map(|(q, p)| outcome(q, p)).collect();
    let total = outcomes.len();
    let correct = outcomes.iter().filter(|o| o.correct).count();
    let top_k_hits = outcomes.iter().filter(|o| o.first_match.is_some()).count();
    let first_pass_hits = outcomes.iter().filter(|o| o.first_pass_hit).count();
    let rr_sum: f64 = outcomes.iter().map(QuestionOutcome::reciprocal_rank).sum();
    let (accuracy, mrr) = if total == 0 { (0.0, 0.0) } else { (correct as f64 / total as f64, rr_sum / total as f64) };
    Evaluation { total, correct, accuracy, top_k_hits, first_pass_hits, mrr, outcomes }
}
