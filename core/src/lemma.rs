//! Sentence splitting and lemmatization.
//!
//! The query engine only needs `lemmatize(text)` as an ordered list of sentences, each an
//! ordered list of lemmas. [`SentenceLemmatizer`] is the built-in implementation; an external
//! NLP service can be plugged in through the [`Lemmatizer`] trait.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?;]+(\s+|$)").expect("valid regex");
    static ref WORD: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_'\-]*").expect("valid regex");
    static ref ABBREVIATIONS: HashSet<&'static str> = [
        "mr", "mrs", "ms", "dr", "st", "jr", "sr", "vs", "etc", "mt", "ft", "gen", "col", "lt", "prof",
    ]
    .into_iter()
    .collect();
}

/// Splits `text` at sentence punctuation. A period after a single letter ("U.S.") or a
/// known abbreviation ("Dr.") does not end the sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        if m.as_str().trim_end() == "." && is_abbreviation(&text[..m.start()]) {
            continue;
        }
        sentences.push(&text[start..m.start()]);
        start = m.end();
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

fn is_abbreviation(before: &str) -> bool {
    let word = before.rsplit(|c: char| !c.is_alphanumeric()).next().unwrap_or("");
    let mut chars = word.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => c.is_alphabetic(),
        (Some(_), Some(_)) => ABBREVIATIONS.contains(word.to_lowercase().as_str()),
        _ => false,
    }
}

pub trait Lemmatizer: Send + Sync {
    fn lemmatize(&self, text: &str) -> Vec<Vec<String>>;

    /// Lemmas of the first non-empty sentence, joined by single spaces.
    fn first_sentence(&self, text: &str) -> String {
        self.lemmatize(text)
            .into_iter()
            .find(|s| !s.is_empty())
            .map(|s| s.join(" "))
            .unwrap_or_default()
    }
}

/// Rule-based lemmatizer: punctuation sentence boundaries, lowercase surface forms as lemmas.
#[derive(Debug, Default, Clone, Copy)]
pub struct SentenceLemmatizer;

impl Lemmatizer for SentenceLemmatizer {
    fn lemmatize(&self, text: &str) -> Vec<Vec<String>> {
        split_sentences(text)
            .into_iter()
            .map(|sentence| {
                WORD.find_iter(sentence)
                    .map(|m| m.as_str().to_lowercase())
                    .collect::<Vec<_>>()
            })
            .filter(|lemmas| !lemmas.is_empty())
            .collect()
    }
}
