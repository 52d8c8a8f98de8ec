//! Field-structured inverted index.
//!
//! Construction and reading are separate types: workers append into an [`IndexBuilder`] and
//! [`IndexBuilder::finish`] freezes it into an immutable [`Index`]. Nothing can search a builder,
//! and nothing can write to an `Index`.

use crate::similarity::Similarity;
use crate::tokenizer::tokenize;
use crate::{DocId, Document, Field, Posting};
use anyhow::{bail, ensure, Context, Result};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type TermId = u32;

/// Postings and statistics of a single field.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FieldIndex {
    pub dictionary: HashMap<String, TermId>,
    /// Term text by id, for dictionary scans (fuzzy expansion).
    pub terms: Vec<String>,
    /// Postings by term id, sorted by doc.
    pub postings: Vec<Vec<Posting>>,
    /// Token count of the field, by doc.
    pub lengths: Vec<u32>,
    /// Length normalization computed at index time, by doc.
    pub norms: Vec<f32>,
}

impl FieldIndex {
    pub fn postings(&self, term: &str) -> &[Posting] {
        match self.dictionary.get(term) {
            Some(&tid) => &self.postings[tid as usize],
            None => &[],
        }
    }

    pub fn doc_freq(&self, term: &str) -> u32 {
        self.postings(term).len() as u32
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> + '_ {
        self.terms.iter().map(String::as_str)
    }

    pub fn norm(&self, doc: DocId) -> f32 {
        self.norms.get(doc as usize).copied().unwrap_or(1.0)
    }

    fn append(&mut self, doc: DocId, tokens: &[(String, usize)], norm: f32) {
        debug_assert_eq!(self.lengths.len(), doc as usize);
        let mut grouped: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
        for (term, pos) in tokens {
            grouped.entry(term.as_str()).or_default().push(*pos as u32);
        }
        for (term, positions) in grouped {
            let tid = match self.dictionary.get(term) {
                Some(&tid) => tid,
                None => {
                    let tid = self.terms.len() as TermId;
                    self.dictionary.insert(term.to_string(), tid);
                    self.terms.push(term.to_string());
                    self.postings.push(Vec::new());
                    tid
                }
            };
            self.postings[tid as usize].push(Posting { doc, tf: positions.len() as u32, positions });
        }
        self.lengths.push(tokens.len() as u32);
        self.norms.push(norm);
    }
}

/// Read-only index. Safe to share between any number of reader threads.
#[derive(Debug)]
pub struct Index {
    fields: [FieldIndex; 3],
    docs: Vec<Document>,
    by_id: HashMap<String, DocId>,
}

impl Index {
    /// Reassembles an index from persisted parts.
    pub fn from_parts(docs: Vec<Document>, fields: [FieldIndex; 3]) -> Result<Self> {
        for (field, fi) in Field::ALL.iter().zip(fields.iter()) {
            ensure!(
                fi.lengths.len() == docs.len() && fi.norms.len() == docs.len(),
                "field {field} covers {} docs, expected {}",
                fi.lengths.len(),
                docs.len()
            );
        }
        let by_id = docs.iter().enumerate().map(|(i, d)| (d.doc_id.clone(), i as DocId)).collect();
        Ok(Self { fields, docs, by_id })
    }

    pub fn num_docs(&self) -> u32 {
        self.docs.len() as u32
    }

    pub fn field(&self, field: Field) -> &FieldIndex {
        &self.fields[field.slot()]
    }

    pub fn fields(&self) -> &[FieldIndex; 3] {
        &self.fields
    }

    pub fn doc_freq(&self, field: Field, term: &str) -> u32 {
        self.field(field).doc_freq(term)
    }

    pub fn document(&self, doc: DocId) -> Option<&Document> {
        self.docs.get(doc as usize)
    }

    pub fn documents(&self) -> &[Document] {
        &self.docs
    }

    pub fn lookup(&self, doc_id: &str) -> Option<&Document> {
        self.internal_id(doc_id).and_then(|d| self.document(d))
    }

    pub fn internal_id(&self, doc_id: &str) -> Option<DocId> {
        self.by_id.get(doc_id).copied()
    }

    /// External identifier of an internal doc number.
    pub fn doc_id(&self, doc: DocId) -> &str {
        self.docs.get(doc as usize).map(|d| d.doc_id.as_str()).unwrap_or("")
    }
}

/// Write side of the index. Only reachable during construction.
pub struct IndexBuilder {
    similarity: Arc<dyn Similarity>,
    fields: [FieldIndex; 3],
    docs: Vec<Document>,
    by_id: HashMap<String, DocId>,
}

/// A document already split into per-field tokens, ready to append.
struct AnalyzedDoc {
    doc: Document,
    tokens: [Vec<(String, usize)>; 3],
}

impl AnalyzedDoc {
    fn analyze(doc: Document) -> Self {
        let tokens = Field::ALL.map(|f| tokenize(&doc.field_text(f)));
        Self { doc, tokens }
    }
}

impl IndexBuilder {
    pub fn new(similarity: Arc<dyn Similarity>) -> Self {
        Self { similarity, fields: Default::default(), docs: Vec::new(), by_id: HashMap::new() }
    }

    /// Analyzes and appends one document on the calling thread.
    pub fn add_document(&mut self, doc: Document) -> Result<DocId> {
        self.append(AnalyzedDoc::analyze(doc))
    }

    fn append(&mut self, analyzed: AnalyzedDoc) -> Result<DocId> {
        let AnalyzedDoc { doc, tokens } = analyzed;
        ensure!(!doc.doc_id.is_empty(), "document without an id");
        if self.by_id.contains_key(&doc.doc_id) {
            bail!("duplicate document id {:?}", doc.doc_id);
        }
        let id = self.docs.len() as DocId;
        for (field, toks) in self.fields.iter_mut().zip(tokens.iter()) {
            let norm = self.similarity.length_norm(toks.len() as u32);
            field.append(id, toks, norm);
        }
        self.by_id.insert(doc.doc_id.clone(), id);
        self.docs.push(doc);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Closes the index for writing.
    pub fn finish(self) -> Index {
        Index { fields: self.fields, docs: self.docs, by_id: self.by_id }
    }
}

/// Cooperative cancellation flag, checked once per document.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self { Self::default() }
    pub fn cancel(&self) { self.0.store(true, Ordering::Relaxed); }
    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::Relaxed) }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShardStats {
    pub shard: usize,
    pub indexed: usize,
    pub dropped: usize,
}

/// Writer handle owned by one worker. Analysis happens outside the lock; only the append is serialized.
pub struct ShardWriter<'a> {
    target: &'a Mutex<IndexBuilder>,
    stats: ShardStats,
}

impl<'a> ShardWriter<'a> {
    pub fn new(shard: usize, target: &'a Mutex<IndexBuilder>) -> Self {
        Self { target, stats: ShardStats { shard, ..Default::default() } }
    }

    pub fn add_document(&mut self, doc: Document) {
        let analyzed = AnalyzedDoc::analyze(doc);
        let result = self.target.lock().append(analyzed);
        match result {
            Ok(_) => self.stats.indexed += 1,
            Err(err) => {
                self.stats.dropped += 1;
                tracing::warn!(shard = self.stats.shard, error = %err, "dropping document");
            }
        }
    }

    pub fn finish(self) -> ShardStats {
        self.stats
    }
}

/// Drops documents without an id and repeated ids (first occurrence wins), before any sharding.
fn dedupe(docs: Vec<Document>) -> Vec<Document> {
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter(|d| {
            if d.doc_id.is_empty() {
                tracing::warn!("dropping document without an id");
                return false;
            }
            if !seen.insert(d.doc_id.clone()) {
                tracing::warn!(doc_id = %d.doc_id, "dropping duplicate document");
                return false;
            }
            true
        })
        .collect()
}

/// Splits `docs` into at most `workers` contiguous, disjoint shards of near-equal size.
pub fn partition(docs: Vec<Document>, workers: usize) -> Vec<Vec<Document>> {
    let p = workers.clamp(1, docs.len().max(1));
    let chunk = docs.len().div_ceil(p);
    let mut shards = Vec::with_capacity(p);
    let mut iter = docs.into_iter();
    loop {
        let shard: Vec<Document> = iter.by_ref().take(chunk).collect();
        if shard.is_empty() { break; }
        shards.push(shard);
    }
    shards
}

/// Builds the index on a pool of `workers` threads and returns once every shard is written.
pub fn build(docs: Vec<Document>, similarity: Arc<dyn Similarity>, workers: usize, cancel: &CancelToken) -> Result<Index> {
    let docs = dedupe(docs);
    let total = docs.len();
    let shards = partition(docs, workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(shards.len().max(1))
        .thread_name(|i| format!("index-worker-{i}"))
        .build()
        .context("starting index workers")?;

    let shared = Mutex::new(IndexBuilder::new(similarity));
    let stats: Vec<ShardStats> = pool.install(|| {
        shards
            .into_par_iter()
            .enumerate()
            .map(|(shard, docs)| {
                let mut writer = ShardWriter::new(shard, &shared);
                for doc in docs {
                    if cancel.is_cancelled() { break; }
                    writer.add_document(doc);
                }
                writer.finish()
            })
            .collect()
    });
    if cancel.is_cancelled() {
        bail!("index build cancelled");
    }
    for s in &stats {
        tracing::debug!(shard = s.shard, indexed = s.indexed, dropped = s.dropped, "shard done");
    }

    let index = shared.into_inner().finish();
    let dropped: usize = stats.iter().map(|s| s.dropped).sum();
    tracing::info!(
        num_docs = index.num_docs(),
        input = total,
        dropped,
        shards = stats.len(),
        text_terms = index.field(Field::Text).terms.len(),
        "index built"
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::TfIdfSimilarity;

    fn doc(id: &str, summary: &str, cats: &[&str]) -> Document {
        let mut d = Document::new(id);
        d.summary = summary.to_string();
        d.categories = cats.iter().map(|c| c.to_string()).collect();
        d
    }

    fn corpus() -> Vec<Document> {
        vec![
            doc("Paris", "Paris is the capital of France.", &["Capitals"]),
            doc("Lyon", "Lyon is a city in France.", &["Cities in France"]),
            doc("Berlin", "Berlin is the capital of Germany.", &["Capitals"]),
            doc("Rhine", "The Rhine flows through Germany.", &["Rivers"]),
            doc("Seine", "The Seine flows through Paris.", &["Rivers"]),
        ]
    }

    fn sim() -> Arc<dyn Similarity> {
        Arc::new(TfIdfSimilarity)
    }

    #[test]
    fn counts_documents_and_frequencies() {
        let index = build(corpus(), sim(), 2, &CancelToken::new()).unwrap();
        assert_eq!(index.num_docs(), 5);
        assert_eq!(index.doc_freq(Field::Text, "capit"), 2);
        assert_eq!(index.doc_freq(Field::Text, "franc"), 2);
        assert_eq!(index.doc_freq(Field::Cat, "river"), 2);
        assert_eq!(index.doc_freq(Field::Summary, "nowher"), 0);
        assert_eq!(index.lookup("Seine").unwrap().categories.len(), 1);
    }

    #[test]
    fn frequencies_do_not_depend_on_worker_count() {
        let reference = build(corpus(), sim(), 1, &CancelToken::new()).unwrap();
        for workers in [2, 3, 8] {
            let index = build(corpus(), sim(), workers, &CancelToken::new()).unwrap();
            for field in Field::ALL {
                for term in reference.field(field).terms() {
                    assert_eq!(index.doc_freq(field, term), reference.doc_freq(field, term), "{field}:{term} with {workers} workers");
                }
                assert_eq!(index.field(field).terms.len(), reference.field(field).terms.len());
            }
        }
    }

    #[test]
    fn postings_carry_tf_and_positions() {
        let mut builder = IndexBuilder::new(sim());
        builder.add_document(doc("Echo", "echo echo and echo", &[])).unwrap();
        let index = builder.finish();
        let postings = index.field(Field::Summary).postings("echo");
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].tf, 3);
        assert_eq!(postings[0].positions, vec![0, 1, 3]);
    }

    #[test]
    fn duplicate_ids_are_dropped_not_fatal() {
        let mut docs = corpus();
        docs.push(doc("Paris", "A second Paris article", &[]));
        docs.push(Document::new(""));
        let index = build(docs, sim(), 2, &CancelToken::new()).unwrap();
        assert_eq!(index.num_docs(), 5);
        assert_eq!(index.lookup("Paris").unwrap().summary, "Paris is the capital of France.");
    }

    #[test]
    fn builder_rejects_duplicate() {
        let mut builder = IndexBuilder::new(sim());
        builder.add_document(doc("A", "x y z", &[])).unwrap();
        assert!(builder.add_document(doc("A", "x y z", &[])).is_err());
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn partitions_are_contiguous_and_disjoint() {
        let shards = partition(corpus(), 2);
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].len(), 3);
        assert_eq!(shards[1].len(), 2);
        assert_eq!(shards[1][0].doc_id, "Rhine");
        assert_eq!(partition(corpus(), 10).len(), 5);
        assert!(partition(Vec::new(), 2).is_empty());
    }

    #[test]
    fn empty_corpus_builds_empty_index() {
        let index = build(Vec::new(), sim(), 2, &CancelToken::new()).unwrap();
        assert_eq!(index.num_docs(), 0);
    }

    #[test]
    fn cancelled_build_fails() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(build(corpus(), sim(), 2, &cancel).is_err());
    }
}
