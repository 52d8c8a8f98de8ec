use wikiqa_core::tokenizer::{analyze, tokenize};

#[test]
fn it_normalizes_and_stems() {
    let toks = tokenize("Running Runners RUN! The ｃａｐｉｔａｌ city.");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    // Stemming to "run" should appear
    assert!(words.contains(&"run".to_string()));
    // NFKC folds fullwidth letters before stemming
    assert!(words.contains(&"capit".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let toks = tokenize("The quick brown fox and the lazy dog");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
}

#[test]
fn reanalyzing_terms_is_a_no_op() {
    let samples = [
        "Paris is the capital and most populous city of France.",
        "He agreed, generously, to the abilities test; it was happiness!",
        "Apollo 11 landed on the Moon in 1969 (July 20).",
        "Running runners' relational conditional organizations",
    ];
    for text in samples {
        let once = analyze(text);
        let twice = analyze(&once.join(" "));
        assert_eq!(once, twice, "{text}");
    }
}

#[test]
fn index_and_query_text_normalize_alike() {
    assert_eq!(analyze("Capitals"), analyze("capital"));
    assert_eq!(analyze("FRANCE"), analyze("France"));
}
