//! Boolean query model and its evaluation against an [`Index`].
//!
//! Queries are built from analyzed terms, never parsed from user text. `Display` renders them
//! in the familiar `+field:term~0.7` syntax, with terms escaped, for logs and diagnostics.

use crate::index::{FieldIndex, Index};
use crate::similarity::Similarity;
use crate::{DocId, Field, Posting, ScoredResult};
use lazy_static::lazy_static;
use levenshtein_automata::{Distance, LevenshteinAutomatonBuilder};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Fuzzy expansion stops after this many dictionary terms (closest first).
pub const MAX_EXPANSIONS: usize = 50;
const MAX_EDITS: u8 = 2;

lazy_static! {
    static ref LEV: [LevenshteinAutomatonBuilder; 2] =
        [LevenshteinAutomatonBuilder::new(1, true), LevenshteinAutomatonBuilder::new(2, true)];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Must,
    Should,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Term { field: Field, term: String },
    /// Matches dictionary terms whose edit distance to `term` fits the `similarity` threshold.
    Fuzzy { field: Field, term: String, similarity: f32 },
    /// Terms in order, each allowed to sit up to `slop` positions away from its expected place.
    Phrase { field: Field, terms: Vec<String>, slop: u32 },
    Boolean(Vec<(Occur, Query)>),
    Boost(Box<Query>, f32),
}

impl Query {
    pub fn term(field: Field, term: impl Into<String>) -> Self {
        Query::Term { field, term: term.into() }
    }

    pub fn fuzzy(field: Field, term: impl Into<String>, similarity: f32) -> Self {
        Query::Fuzzy { field, term: term.into(), similarity }
    }

    pub fn boost(self, factor: f32) -> Self {
        Query::Boost(Box::new(self), factor)
    }

    /// Any-of over `terms` in every field of `fields`.
    pub fn any_term(fields: &[Field], terms: &[String]) -> Self {
        let clauses = terms
            .iter()
            .flat_map(|t| fields.iter().map(move |&f| (Occur::Should, Query::term(f, t.as_str()))))
            .collect();
        Query::Boolean(clauses)
    }

    /// True for a boolean without clauses, which matches nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Query::Boolean(clauses) => clauses.is_empty(),
            Query::Phrase { terms, .. } => terms.is_empty(),
            Query::Boost(inner, _) => inner.is_empty(),
            _ => false,
        }
    }
}

const SPECIAL: &[char] = &['+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\', '/', ' '];

/// Backslash-escapes characters that carry meaning in query syntax.
pub fn escape(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if SPECIAL.contains(&c) { out.push('\\'); }
        out.push(c);
    }
    out
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term { field, term } => write!(f, "{field}:{}", escape(term)),
            Query::Fuzzy { field, term, similarity } => write!(f, "{field}:{}~{similarity}", escape(term)),
            Query::Phrase { field, terms, slop } => {
                let joined = terms.iter().map(|t| escape(t)).collect::<Vec<_>>().join(" ");
                write!(f, "{field}:\"{joined}\"~{slop}")
            }
            Query::Boolean(clauses) => {
                f.write_str("(")?;
                for (i, (occur, clause)) in clauses.iter().enumerate() {
                    if i > 0 { f.write_str(" ")?; }
                    if *occur == Occur::Must { f.write_str("+")?; }
                    write!(f, "{clause}")?;
                }
                f.write_str(")")
            }
            Query::Boost(inner, factor) => write!(f, "{inner}^{factor}"),
        }
    }
}

/// Edit budget for a similarity threshold: `min(2, floor((1 - similarity) * len))`.
pub fn max_edits(similarity: f32, term_len: usize) -> u8 {
    if similarity >= 1.0 { return 0; }
    ((1.0 - similarity) * term_len as f32).floor().clamp(0.0, MAX_EDITS as f32) as u8
}

/// Dictionary terms of `field` within the edit budget of `term`, with their edit distance.
pub fn expand_fuzzy<'f>(field: &'f FieldIndex, term: &str, similarity: f32) -> Vec<(&'f str, u8)> {
    let edits = max_edits(similarity, term.chars().count());
    let mut found: Vec<(&str, u8)> = if edits == 0 {
        field.dictionary.get_key_value(term).map(|(t, _)| (t.as_str(), 0)).into_iter().collect()
    } else {
        let dfa = LEV[edits as usize - 1].build_dfa(term);
        field
            .terms()
            .filter_map(|cand| match dfa.eval(cand) {
                Distance::Exact(d) => Some((cand, d)),
                Distance::AtLeast(_) => None,
            })
            .collect()
    };
    found.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| field.doc_freq(b.0).cmp(&field.doc_freq(a.0))).then_with(|| a.0.cmp(b.0)));
    found.truncate(MAX_EXPANSIONS);
    found
}

/// Evaluates queries against a read-only index with an injected similarity.
pub struct Searcher<'a> {
    index: &'a Index,
    similarity: &'a dyn Similarity,
}

impl<'a> Searcher<'a> {
    pub fn new(index: &'a Index, similarity: &'a dyn Similarity) -> Self {
        Self { index, similarity }
    }

    pub fn index(&self) -> &'a Index {
        self.index
    }

    /// Top `k` matches, score descending, ties broken by doc id.
    pub fn search(&self, query: &Query, k: usize) -> Vec<ScoredResult> {
        let mut scored: Vec<(DocId, f32)> = self.scores(query).into_iter().collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.index.doc_id(a.0).cmp(self.index.doc_id(b.0)))
        });
        scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(i, (doc, score))| ScoredResult { doc_id: self.index.doc_id(doc).to_string(), score, rank: i + 1 })
            .collect()
    }

    /// Scores of `query` for each candidate, in candidate order; 0 where it does not match.
    pub fn score_candidates(&self, query: &Query, candidates: &[ScoredResult]) -> Vec<f32> {
        let scores = self.scores(query);
        candidates
            .iter()
            .map(|c| {
                self.index
                    .internal_id(&c.doc_id)
                    .and_then(|d| scores.get(&d).copied())
                    .unwrap_or(0.0)
            })
            .collect()
    }

    /// Every matching document with its score. A match may score 0 (e.g. a term present in all docs).
    pub fn scores(&self, query: &Query) -> HashMap<DocId, f32> {
        match query {
            Query::Term { field, term } => {
                let mut out = HashMap::new();
                self.add_term(&mut out, *field, term, 1.0);
                out
            }
            Query::Fuzzy { field, term, similarity } => {
                let fi = self.index.field(*field);
                let mut out = HashMap::new();
                let len = term.chars().count();
                for (cand, distance) in expand_fuzzy(fi, term, *similarity) {
                    let shortest = len.min(cand.chars().count()).max(1);
                    let weight = (1.0 - distance as f32 / shortest as f32).max(0.0);
                    self.add_term(&mut out, *field, cand, weight);
                }
                out
            }
            Query::Phrase { field, terms, slop } => self.phrase_scores(*field, terms, *slop),
            Query::Boolean(clauses) => {
                let mut acc: HashMap<DocId, f32> = HashMap::new();
                let mut required: Option<HashSet<DocId>> = None;
                for (occur, clause) in clauses {
                    let scores = self.scores(clause);
                    if *occur == Occur::Must {
                        required = Some(match required {
                            None => scores.keys().copied().collect(),
                            Some(r) => r.into_iter().filter(|d| scores.contains_key(d)).collect(),
                        });
                    }
                    for (doc, s) in scores {
                        *acc.entry(doc).or_insert(0.0) += s;
                    }
                }
                if let Some(required) = required {
                    acc.retain(|d, _| required.contains(d));
                }
                acc
            }
            Query::Boost(inner, factor) => {
                let mut scores = self.scores(inner);
                for s in scores.values_mut() { *s *= factor; }
                scores
            }
        }
    }

    fn idf(&self, postings: &[Posting]) -> f32 {
        self.similarity.doc_freq_weight(postings.len() as u32, self.index.num_docs())
    }

    fn add_term(&self, out: &mut HashMap<DocId, f32>, field: Field, term: &str, weight: f32) {
        let fi = self.index.field(field);
        let postings = fi.postings(term);
        let idf = self.idf(postings);
        for p in postings {
            let s = self.similarity.term_weight(p.tf as f32) * idf * fi.norm(p.doc) * weight;
            *out.entry(p.doc).or_insert(0.0) += s;
        }
    }

    fn phrase_scores(&self, field: Field, terms: &[String], slop: u32) -> HashMap<DocId, f32> {
        let mut out = HashMap::new();
        match terms {
            [] => return out,
            [single] => {
                self.add_term(&mut out, field, single, 1.0);
                return out;
            }
            _ => {}
        }
        let fi = self.index.field(field);
        let lists: Vec<&[Posting]> = terms.iter().map(|t| fi.postings(t)).collect();
        if lists.iter().any(|l| l.is_empty()) {
            return out;
        }
        let idf_sum: f32 = lists.iter().map(|l| self.idf(l)).sum();
        let by_doc: Vec<HashMap<DocId, &Posting>> =
            lists[1..].iter().map(|l| l.iter().map(|p| (p.doc, p)).collect()).collect();
        for first in lists[0] {
            let mut positions: Vec<&[u32]> = vec![first.positions.as_slice()];
            for m in &by_doc {
                match m.get(&first.doc) {
                    Some(p) => positions.push(p.positions.as_slice()),
                    None => break,
                }
            }
            if positions.len() != terms.len() {
                continue;
            }
            let freq = self.sloppy_freq(&positions, slop);
            if freq > 0.0 {
                let s = (self.similarity.term_weight(freq) * idf_sum * fi.norm(first.doc)).max(0.0);
                out.insert(first.doc, s);
            }
        }
        out
    }

    /// Sums `proximity_weight` over every placement of the phrase that fits within `slop`.
    fn sloppy_freq(&self, positions: &[&[u32]], slop: u32) -> f32 {
        let mut freq = 0.0;
        for &start in positions[0] {
            let mut distance = 0u32;
            let mut fits = true;
            for (offset, list) in positions.iter().enumerate().skip(1) {
                let expected = start as i64 + offset as i64;
                let nearest = list.iter().map(|&p| (p as i64 - expected).unsigned_abs()).min();
                match nearest {
                    Some(d) if distance as u64 + d <= slop as u64 => distance += d as u32,
                    _ => {
                        fits = false;
                        break;
                    }
                }
            }
            if fits {
                freq += self.similarity.proximity_weight(distance);
            }
        }
        freq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use crate::similarity::TfIdfSimilarity;
    use crate::Document;
    use std::sync::Arc;

    fn index() -> Index {
        let mut b = IndexBuilder::new(Arc::new(TfIdfSimilarity));
        for (id, summary, cat) in [
            ("Paris", "Paris is the capital of France. Paris has museums.", "Capitals"),
            ("Lyon", "Lyon is a large city in France.", "Cities"),
            ("Berlin", "Berlin is the capital of Germany.", "Capitals"),
            ("Danube", "The Danube is a river in Europe.", "Rivers"),
        ] {
            let mut d = Document::new(id);
            d.summary = summary.into();
            d.categories.insert(cat.into());
            b.add_document(d).unwrap();
        }
        b.finish()
    }

    const SIM: TfIdfSimilarity = TfIdfSimilarity;

    fn ids(results: &[ScoredResult]) -> Vec<&str> {
        results.iter().map(|r| r.doc_id.as_str()).collect()
    }

    #[test]
    fn term_query_scores_tf_idf() {
        let idx = index();
        let s = Searcher::new(&idx, &SIM);
        let hits = s.search(&Query::term(Field::Summary, "pari"), 10);
        assert_eq!(ids(&hits), vec!["Paris"]);
        let expected = (1.0 + 2f32.log10()) * 4f32.log10();
        assert!((hits[0].score - expected).abs() < 1e-5);
        assert_eq!(hits[0].rank, 1);
    }

    #[test]
    fn must_clause_is_required() {
        let idx = index();
        let s = Searcher::new(&idx, &SIM);
        let q = Query::Boolean(vec![
            (Occur::Must, Query::term(Field::Summary, "capit")),
            (Occur::Should, Query::term(Field::Summary, "franc")),
        ]);
        let hits = s.search(&q, 10);
        assert_eq!(ids(&hits), vec!["Paris", "Berlin"]);
    }

    #[test]
    fn should_only_needs_one_match() {
        let idx = index();
        let s = Searcher::new(&idx, &SIM);
        let q = Query::any_term(&[Field::Summary], &["danub".to_string(), "germani".to_string()]);
        let mut got = ids(&s.search(&q, 10)).into_iter().map(String::from).collect::<Vec<_>>();
        got.sort();
        assert_eq!(got, vec!["Berlin", "Danube"]);
        assert!(s.search(&Query::Boolean(vec![]), 10).is_empty());
    }

    #[test]
    fn fuzzy_budget_follows_similarity() {
        assert_eq!(max_edits(0.7, 3), 0);
        assert_eq!(max_edits(0.7, 5), 1);
        assert_eq!(max_edits(0.7, 12), 2);
        assert_eq!(max_edits(1.0, 12), 0);
    }

    #[test]
    fn fuzzy_matches_close_terms_only() {
        let idx = index();
        let s = Searcher::new(&idx, &SIM);
        let hits = s.search(&Query::fuzzy(Field::Cat, "capitol", 0.7), 10);
        assert_eq!(ids(&hits), vec!["Berlin", "Paris"]);
        assert!(s.search(&Query::fuzzy(Field::Cat, "xyzzyq", 0.7), 10).is_empty());
        let exact = s.scores(&Query::term(Field::Cat, "capit"));
        let fuzzy = s.scores(&Query::fuzzy(Field::Cat, "capot", 0.7));
        for (doc, score) in fuzzy {
            assert!(score < exact[&doc]);
        }
    }

    #[test]
    fn boost_scales_scores() {
        let idx = index();
        let s = Searcher::new(&idx, &SIM);
        let plain = s.scores(&Query::term(Field::Summary, "capit"));
        let boosted = s.scores(&Query::term(Field::Summary, "capit").boost(2.0));
        for (doc, score) in plain {
            assert!((boosted[&doc] - 2.0 * score).abs() < 1e-6);
        }
    }

    #[test]
    fn phrase_respects_slop() {
        let idx = index();
        let s = Searcher::new(&idx, &SIM);
        let terms = vec!["capit".to_string(), "franc".to_string()];
        let strict = Query::Phrase { field: Field::Summary, terms: terms.clone(), slop: 0 };
        assert!(s.search(&strict, 10).is_empty());
        let loose = Query::Phrase { field: Field::Summary, terms, slop: 1 };
        assert_eq!(ids(&s.search(&loose, 10)), vec!["Paris"]);
    }

    #[test]
    fn candidate_scores_align_with_candidates() {
        let idx = index();
        let s = Searcher::new(&idx, &SIM);
        let candidates = s.search(&Query::term(Field::Summary, "franc"), 10);
        let scores = s.score_candidates(&Query::term(Field::Cat, "capit"), &candidates);
        assert_eq!(scores.len(), candidates.len());
        for (c, score) in candidates.iter().zip(scores) {
            if c.doc_id == "Paris" { assert!(score > 0.0); } else { assert_eq!(score, 0.0); }
        }
    }

    #[test]
    fn display_escapes_terms() {
        let q = Query::Boolean(vec![
            (Occur::Must, Query::term(Field::Text, "c++")),
            (Occur::Should, Query::fuzzy(Field::Cat, "a:b", 0.7)),
        ]);
        assert_eq!(q.to_string(), r"(+text:c\+\+ cat:a\:b~0.7)");
        assert_eq!(escape("(x)"), r"\(x\)");
    }
}
