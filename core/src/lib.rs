pub mod config;
pub mod corpus;
pub mod engine;
pub mod eval;
pub mod index;
pub mod lemma;
pub mod persist;
pub mod query;
pub mod questions;
pub mod similarity;
pub mod tokenizer;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Internal document number, assigned when a document is appended to the index.
pub type DocId = u32;

/// Named projection of a document's text. Each field keeps its own term statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    Text,
    Summary,
    Cat,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Text, Field::Summary, Field::Cat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Text => "text",
            Field::Summary => "summary",
            Field::Cat => "cat",
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            Field::Text => 0,
            Field::Summary => 1,
            Field::Cat => 2,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One article of the corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    /// Lead section, everything before the first `==` heading.
    pub summary: String,
    pub body: String,
    pub categories: BTreeSet<String>,
}

impl Document {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self { doc_id: doc_id.into(), ..Self::default() }
    }

    /// Raw text indexed under `field`. `text` is the whole article: summary then body.
    pub fn field_text(&self, field: Field) -> String {
        match field {
            Field::Text => match (self.summary.is_empty(), self.body.is_empty()) {
                (_, true) => self.summary.clone(),
                (true, false) => self.body.clone(),
                (false, false) => format!("{}\n{}", self.summary, self.body),
            },
            Field::Summary => self.summary.clone(),
            Field::Cat => self.categories.iter().map(String::as_str).collect::<Vec<_>>().join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc: DocId,
    pub tf: u32,
    /// Token positions of the term inside the field, ascending.
    pub positions: Vec<u32>,
}

/// One ranked hit of a query. `rank` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredResult {
    pub doc_id: String,
    pub score: f32,
    pub rank: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_field_joins_summary_and_body() {
        let mut doc = Document::new("Paris");
        doc.summary = "Lead".into();
        assert_eq!(doc.field_text(Field::Text), "Lead");
        doc.body = "Body".into();
        assert_eq!(doc.field_text(Field::Text), "Lead\nBody");
        doc.summary.clear();
        assert_eq!(doc.field_text(Field::Text), "Body");
    }

    #[test]
    fn cat_field_lists_categories() {
        let mut doc = Document::new("Paris");
        doc.categories.insert("Capitals".into());
        doc.categories.insert("Cities in France".into());
        assert_eq!(doc.field_text(Field::Cat), "Capitals\nCities in France");
    }
}
