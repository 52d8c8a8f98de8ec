use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One quiz entry: category hint, question text and the free-text gold answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub category: String,
    pub question: String,
    pub answer: String,
}

/// Reads groups of four lines: category, question, answer, separator.
///
/// The separator of the last group may be missing. A group cut off before its answer is dropped.
pub fn read_questions<R: BufRead>(reader: R) -> Result<Vec<Question>> {
    let mut out = Vec::new();
    let mut group: Vec<String> = Vec::with_capacity(3);
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading questions line {}", i + 1))?;
        let line = line.trim_end_matches('\r');
        match i % 4 {
            0 | 1 => group.push(line.to_string()),
            2 => {
                let mut parts = std::mem::take(&mut group).into_iter();
                let category = parts.next().unwrap_or_default();
                let question = parts.next().unwrap_or_default();
                out.push(Question { category, question, answer: line.to_string() });
            }
            _ => {}
        }
    }
    if !group.is_empty() {
        tracing::warn!(lines = group.len(), "dropping incomplete trailing question");
    }
    Ok(out)
}

pub fn load_questions(path: &Path) -> Result<Vec<Question>> {
    let f = File::open(path).with_context(|| format!("opening questions file {}", path.display()))?;
    let questions = read_questions(BufReader::new(f))?;
    tracing::info!(path = %path.display(), count = questions.len(), "loaded questions");
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_four_line_groups() {
        let text = "CAPITALS\nCapital of France\nParis\n\nRIVERS\nLongest river\nThe Nile\n";
        let qs = read_questions(text.as_bytes()).unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0], Question { category: "CAPITALS".into(), question: "Capital of France".into(), answer: "Paris".into() });
        assert_eq!(qs[1].answer, "The Nile");
    }

    #[test]
    fn separator_content_is_ignored() {
        let qs = read_questions("A\nB\nC\n-----\nD\nE\nF\n".as_bytes()).unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[1].category, "D");
    }

    #[test]
    fn drops_truncated_group() {
        let qs = read_questions("A\nB\nC\n\nD\nE\n".as_bytes()).unwrap();
        assert_eq!(qs.len(), 1);
    }

    #[test]
    fn strips_carriage_returns() {
        let qs = read_questions("A\r\nB\r\nC\r\n\r\n".as_bytes()).unwrap();
        assert_eq!(qs[0].answer, "C");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_questions(Path::new("/no/such/questions.txt")).is_err());
    }
}
