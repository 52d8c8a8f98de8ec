//! Scoring primitives shared by the index builder and the searcher.

/// Weighting functions used to score a matched term.
///
/// A document's score for a term is `term_weight(tf) * doc_freq_weight(df, n) * length_norm(len)`,
/// summed over matched terms and multiplied by clause boosts.
pub trait Similarity: Send + Sync {
    fn term_weight(&self, tf: f32) -> f32;
    fn doc_freq_weight(&self, df: u32, num_docs: u32) -> f32;
    fn length_norm(&self, field_length: u32) -> f32;
    /// Contribution of one sloppy phrase match whose terms are `distance` positions out of place.
    fn proximity_weight(&self, distance: u32) -> f32;
}

/// Log-scaled tf-idf without length normalization.
///
/// Wiki leads and category lists are short, so longer fields are not penalised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TfIdfSimilarity;

impl Similarity for TfIdfSimilarity {
    fn term_weight(&self, tf: f32) -> f32 {
        if tf > 0.0 { 1.0 + tf.log10() } else { 0.0 }
    }

    fn doc_freq_weight(&self, df: u32, num_docs: u32) -> f32 {
        if df == 0 { return 0.0; }
        (num_docs as f32 / df as f32).log10()
    }

    fn length_norm(&self, _field_length: u32) -> f32 { 1.0 }

    fn proximity_weight(&self, distance: u32) -> f32 {
        1.0 / (distance as f32 + 1.0)
    }
}
