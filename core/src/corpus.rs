//! Reader for line-oriented wiki dumps.
//!
//! ```text
//! [[Document Title]]
//! Lead paragraph line
//! ==Section Heading==
//! Body line
//! CATEGORIES: Cat1, Cat2
//! ```

use crate::Document;
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const MEDIA_PREFIX: &str = "[[File:";
const HEADING_PREFIX: &str = "==";
const CATEGORIES_MARKER: &str = "CATEGORIES:";
const REDIRECT_MARKER: &str = "#REDIRECT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    Body,
}

/// Lazily yields the documents of one shard, in file order. Single pass.
pub struct DocumentReader<R> {
    lines: Lines<R>,
    source: String,
    line_no: usize,
    current: Option<(Document, Section)>,
}

impl<R: BufRead> DocumentReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_source(reader, "<memory>")
    }

    /// `source` names the stream in log records.
    pub fn with_source(reader: R, source: impl Into<String>) -> Self {
        Self { lines: reader.lines(), source: source.into(), line_no: 0, current: None }
    }

    /// Consumes one line; returns the previous document when `line` opens a new one.
    fn feed(&mut self, line: &str) -> Option<Document> {
        if line.starts_with(MEDIA_PREFIX) {
            return None;
        }
        if let Some(title) = title_of(line) {
            return self
                .current
                .replace((Document::new(title), Section::Summary))
                .map(|(doc, _)| doc);
        }
        let (doc, section) = self.current.as_mut()?;
        if line.starts_with(HEADING_PREFIX) {
            *section = Section::Body;
            return None;
        }
        if line.contains(CATEGORIES_MARKER) {
            let rest = line.replacen(CATEGORIES_MARKER, "", 1);
            let label = rest.trim();
            if !label.is_empty() {
                doc.categories.insert(label.to_string());
            }
            return None;
        }
        if line.chars().count() <= 2 {
            return None;
        }
        match section {
            Section::Summary => append_line(&mut doc.summary, line.replace(REDIRECT_MARKER, "").trim()),
            Section::Body => append_line(&mut doc.body, line),
        }
        None
    }
}

impl<R: BufRead> Iterator for DocumentReader<R> {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(err)) if err.kind() == io::ErrorKind::InvalidData => {
                    self.line_no += 1;
                    tracing::warn!(source = %self.source, line = self.line_no, error = %err, "skipping unreadable line");
                    continue;
                }
                Some(Err(err)) => {
                    tracing::warn!(source = %self.source, line = self.line_no + 1, error = %err, "read failed, flushing open document");
                    return self.current.take().map(|(doc, _)| doc);
                }
                None => return self.current.take().map(|(doc, _)| doc),
            };
            self.line_no += 1;
            if let Some(done) = self.feed(line.trim_end()) {
                return Some(done);
            }
        }
    }
}

fn title_of(line: &str) -> Option<&str> {
    if line.chars().count() > 4 && line.starts_with("[[") && line.ends_with("]]") {
        let inner = line[2..line.len() - 2].trim();
        if !inner.is_empty() {
            return Some(inner);
        }
    }
    None
}

fn append_line(buf: &mut String, line: &str) {
    if line.is_empty() { return; }
    if !buf.is_empty() { buf.push('\n'); }
    buf.push_str(line);
}

pub fn parse_file(path: &Path) -> Result<DocumentReader<BufReader<File>>> {
    let f = File::open(path).with_context(|| format!("opening corpus file {}", path.display()))?;
    Ok(DocumentReader::with_source(BufReader::new(f), path.display().to_string()))
}

/// Regular files under `dir` in path order. Hidden files are skipped.
pub fn list_corpus_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("corpus directory {} does not exist", dir.display());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(error = %err, "skipping corpus entry");
                continue;
            }
        };
        let hidden = entry.file_name().to_str().map(|n| n.starts_with('.')).unwrap_or(false);
        if entry.file_type().is_file() && !hidden {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Parses every shard under `dir`. Shards that cannot be opened are logged and skipped.
pub fn read_corpus(dir: &Path) -> Result<Vec<Document>> {
    let files = list_corpus_files(dir)?;
    let mut docs = Vec::new();
    let mut skipped = 0usize;
    for file in &files {
        match parse_file(file) {
            Ok(reader) => docs.extend(reader),
            Err(err) => {
                skipped += 1;
                tracing::warn!(error = %format!("{err:#}"), "skipping corpus file");
            }
        }
    }
    tracing::info!(files = files.len(), skipped, num_docs = docs.len(), "parsed corpus");
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<Document> {
        DocumentReader::new(text.as_bytes()).collect()
    }

    #[test]
    fn splits_summary_body_and_categories() {
        let docs = parse(
            "[[Paris]]\nParis is the capital of France.\n==History==\nFounded long ago.\nCATEGORIES: Capitals, Cities in France\n",
        );
        assert_eq!(docs.len(), 1);
        let d = &docs[0];
        assert_eq!(d.doc_id, "Paris");
        assert_eq!(d.summary, "Paris is the capital of France.");
        assert_eq!(d.body, "Founded long ago.");
        assert_eq!(d.categories.iter().collect::<Vec<_>>(), vec!["Capitals, Cities in France"]);
    }

    #[test]
    fn short_lines_are_measured_in_characters() {
        let docs = parse("[[Tokyo]]\n東京\nLead line here\n==Sights==\n塔\nBody line here\n");
        assert_eq!(docs[0].summary, "Lead line here");
        assert_eq!(docs[0].body, "Body line here");
    }

    #[test]
    fn one_character_title_opens_a_document() {
        let docs = parse("[[東]]\nEast in Japanese\n");
        assert_eq!(docs[0].doc_id, "東");
    }

    #[test]
    fn title_line_flushes_previous_document() {
        let docs = parse("[[A]]\nabout a\n[[B]]\nabout b\n");
        let ids: Vec<_> = docs.iter().map(|d| d.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(docs[1].summary, "about b");
    }

    #[test]
    fn media_lines_are_discarded() {
        let docs = parse("[[Paris]]\nLead text here\n==Art==\n[[File:image.png]]\nBody text here\nCATEGORIES: Capitals\n");
        let d = &docs[0];
        assert_eq!(d.summary, "Lead text here");
        assert_eq!(d.body, "Body text here");
        assert_eq!(d.categories.len(), 1);
    }

    #[test]
    fn media_line_never_opens_a_document() {
        let docs = parse("[[File:image.png]]\nstray line\n");
        assert!(docs.is_empty());
    }

    #[test]
    fn redirect_marker_is_stripped_from_summary() {
        let docs = parse("[[Big Apple]]\n#REDIRECT New York City\n");
        assert_eq!(docs[0].summary, "New York City");
    }

    #[test]
    fn short_and_leading_lines_are_ignored() {
        let docs = parse("orphan line before any title\n[[X]]\nok\nreal content\n");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].summary, "real content");
    }

    #[test]
    fn unterminated_title_is_content() {
        let docs = parse("[[A]]\n[[Broken title\n");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].summary, "[[Broken title");
    }

    #[test]
    fn empty_title_is_not_a_document() {
        assert!(parse("[[   ]]\n").is_empty());
    }

    #[test]
    fn missing_corpus_dir_is_an_error() {
        assert!(list_corpus_files(Path::new("/definitely/not/here")).is_err());
    }
}
