//! Answer selection.
//!
//! A question is answered in two passes. The first pass requires the question text to match the
//! `summary` or `text` field and lets a fuzzy category match lift candidates. The second pass
//! re-ranks those candidates by a strict, boosted category match.

use crate::config::EngineConfig;
use crate::index::{Index, IndexBuilder};
use crate::lemma::{Lemmatizer, SentenceLemmatizer};
use crate::query::{Occur, Query, Searcher};
use crate::questions::Question;
use crate::similarity::{Similarity, TfIdfSimilarity};
use crate::tokenizer::analyze;
use crate::{Document, Field, ScoredResult};
use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

const BOILERPLATE_PHRASES: &[&str] = &[
    "(alex:",
    "we'll give you the",
    "you give us the",
    "in which it is located",
    "where it is located",
    "where it's located",
];

const QUESTION_FIELDS: [Field; 2] = [Field::Summary, Field::Text];

lazy_static! {
    static ref BOILERPLATE: Regex = {
        let alternation = BOILERPLATE_PHRASES.iter().map(|p| regex::escape(p)).collect::<Vec<_>>().join("|");
        RegexBuilder::new(&alternation).case_insensitive(true).build().expect("valid regex")
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Found(String),
    NotFound,
}

impl Answer {
    /// The predicted doc id, or `""` when nothing matched.
    pub fn doc_id(&self) -> &str {
        match self {
            Answer::Found(id) => id,
            Answer::NotFound => "",
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Answer::Found(_))
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.doc_id())
    }
}

#[derive(Debug, Clone)]
pub struct Prediction {
    pub answer: Answer,
    pub first_pass: Vec<ScoredResult>,
    pub rescored: Vec<ScoredResult>,
}

/// The two queries issued for one question.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub first_pass: Query,
    pub rescore: Query,
}

pub struct QueryEngine {
    index: Arc<Index>,
    similarity: Arc<dyn Similarity>,
    lemmatizer: Arc<dyn Lemmatizer>,
    config: EngineConfig,
}

/// Removes boilerplate phrasing from a category hint, then one trailing `)`. Whitespace is collapsed.
pub fn strip_boilerplate(hint: &str) -> String {
    let cleaned = BOILERPLATE.replace_all(hint, " ");
    let trimmed = cleaned.trim();
    let trimmed = trimmed.strip_suffix(')').unwrap_or(trimmed);
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn dedup(terms: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

impl QueryEngine {
    pub fn new(index: Arc<Index>, config: EngineConfig) -> Self {
        Self {
            index,
            similarity: Arc::new(TfIdfSimilarity),
            lemmatizer: Arc::new(SentenceLemmatizer),
            config,
        }
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_lemmatizer(mut self, lemmatizer: Arc<dyn Lemmatizer>) -> Self {
        self.lemmatizer = lemmatizer;
        self
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn normalize_category(&self, hint: &str) -> Vec<String> {
        let stripped = strip_boilerplate(hint);
        dedup(analyze(&self.lemmatizer.first_sentence(&stripped)))
    }

    pub fn normalize_question(&self, text: &str) -> Vec<String> {
        dedup(analyze(&self.lemmatizer.first_sentence(text)))
    }

    pub fn plan(&self, category_terms: &[String], question_terms: &[String]) -> QueryPlan {
        let fuzzy_category = Query::Boolean(
            category_terms
                .iter()
                .map(|t| (Occur::Should, Query::fuzzy(Field::Cat, t.as_str(), self.config.fuzzy_similarity)))
                .collect(),
        );
        let mut clauses = Vec::new();
        if !question_terms.is_empty() {
            clauses.push((Occur::Must, Query::any_term(&QUESTION_FIELDS, question_terms)));
        }
        if let (Some(slop), true) = (self.config.phrase_slop, question_terms.len() > 1) {
            clauses.push((Occur::Should, Query::Phrase { field: Field::Text, terms: question_terms.to_vec(), slop }));
        }
        if !fuzzy_category.is_empty() {
            clauses.push((Occur::Should, fuzzy_category));
        }
        let rescore = Query::any_term(&[Field::Cat], category_terms).boost(self.config.rescore_weight);
        QueryPlan { first_pass: Query::Boolean(clauses), rescore }
    }

    pub fn answer(&self, category: &str, question: &str) -> Prediction {
        let category_terms = self.normalize_category(category);
        let question_terms = self.normalize_question(question);
        let plan = self.plan(&category_terms, &question_terms);
        let searcher = Searcher::new(&self.index, self.similarity.as_ref());

        let first_pass = searcher.search(&plan.first_pass, self.config.first_pass_k);
        tracing::debug!(query = %plan.first_pass, hits = first_pass.len(), "first pass");
        if first_pass.is_empty() {
            return Prediction { answer: Answer::NotFound, first_pass, rescored: Vec::new() };
        }

        let rescored = self.rescore(&searcher, &plan.rescore, &first_pass);
        tracing::debug!(query = %plan.rescore, top = %rescored[0].doc_id, "rescored");
        let top = if self.config.summary_rerank {
            self.best_by_summary(question, &rescored)
        } else {
            None
        };
        let answer = Answer::Found(top.unwrap_or_else(|| rescored[0].doc_id.clone()));
        Prediction { answer, first_pass, rescored }
    }

    /// Adds the category score to each first-pass score and re-ranks. Ties keep first-pass order.
    fn rescore(&self, searcher: &Searcher<'_>, query: &Query, first_pass: &[ScoredResult]) -> Vec<ScoredResult> {
        let category_scores = searcher.score_candidates(query, first_pass);
        let mut rescored: Vec<ScoredResult> = first_pass
            .iter()
            .zip(category_scores)
            .map(|(c, s)| ScoredResult { doc_id: c.doc_id.clone(), score: c.score + s, rank: 0 })
            .collect();
        rescored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        rescored.truncate(self.config.rescore_k.clamp(1, self.config.first_pass_k.max(1)));
        for (i, r) in rescored.iter_mut().enumerate() {
            r.rank = i + 1;
        }
        rescored
    }

    /// Answers every question. Questions are independent, so they run in parallel.
    pub fn answer_all(&self, questions: &[Question]) -> Vec<Prediction> {
        questions.par_iter().map(|q| self.answer(&q.category, &q.question)).collect()
    }

    /// Picks the candidate whose lead section best matches the question, using a throwaway
    /// index over the candidates' summaries only.
    pub fn best_by_summary(&self, question: &str, candidates: &[ScoredResult]) -> Option<String> {
        let mut builder = IndexBuilder::new(self.similarity.clone());
        for c in candidates {
            let Some(doc) = self.index.lookup(&c.doc_id) else { continue };
            let mut lead = Document::new(doc.doc_id.clone());
            lead.summary = doc.summary.clone();
            if let Err(err) = builder.add_document(lead) {
                tracing::warn!(error = %err, "skipping candidate");
            }
        }
        let scratch = builder.finish();
        let terms = self.normalize_question(question);
        let searcher = Searcher::new(&scratch, self.similarity.as_ref());
        searcher
            .search(&Query::any_term(&[Field::Summary], &terms), 1)
            .into_iter()
            .next()
            .map(|r| r.doc_id)
    }
}
