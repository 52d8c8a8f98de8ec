use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for index construction and answer selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Candidates kept by the first retrieval pass.
    pub first_pass_k: usize,
    /// Candidates kept after rescoring; never more than `first_pass_k`.
    pub rescore_k: usize,
    /// Minimum similarity for fuzzy category matching, in (0, 1].
    pub fuzzy_similarity: f32,
    /// Multiplier on the strict category score added during rescoring.
    pub rescore_weight: f32,
    /// Index builder threads.
    pub workers: usize,
    /// Adds a sloppy phrase clause over the question terms when set.
    pub phrase_slop: Option<u32>,
    /// Picks the final answer by matching the question against candidate leads only.
    pub summary_rerank: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            first_pass_k: 10,
            rescore_k: 10,
            fuzzy_similarity: 0.7,
            rescore_weight: 2.0,
            workers: 2,
            phrase_slop: None,
            summary_rerank: false,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let cfg: EngineConfig = serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()
    }

    /// Checks ranges and clamps `rescore_k` to `first_pass_k`.
    pub fn validate(mut self) -> Result<Self> {
        ensure!(self.first_pass_k > 0, "first_pass_k must be positive");
        ensure!(
            self.fuzzy_similarity > 0.0 && self.fuzzy_similarity <= 1.0,
            "fuzzy_similarity must be in (0, 1], got {}",
            self.fuzzy_similarity
        );
        ensure!(self.rescore_weight >= 0.0, "rescore_weight must not be negative");
        self.rescore_k = self.rescore_k.clamp(1, self.first_pass_k);
        self.workers = self.workers.max(1);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.first_pass_k, 10);
        assert_eq!(cfg.rescore_k, 10);
        assert_eq!(cfg.fuzzy_similarity, 0.7);
        assert_eq!(cfg.rescore_weight, 2.0);
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.phrase_slop, None);
        assert!(!cfg.summary_rerank);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"first_pass_k": 50, "phrase_slop": 2}"#).unwrap();
        assert_eq!(cfg.first_pass_k, 50);
        assert_eq!(cfg.rescore_k, 10);
        assert_eq!(cfg.phrase_slop, Some(2));
    }

    #[test]
    fn rescore_k_is_clamped() {
        let cfg = EngineConfig { first_pass_k: 5, rescore_k: 20, ..Default::default() }.validate().unwrap();
        assert_eq!(cfg.rescore_k, 5);
    }

    #[test]
    fn rejects_bad_similarity() {
        let cfg = EngineConfig { fuzzy_similarity: 1.5, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"workers": 0, "rescore_weight": 3.5}"#).unwrap();
        let cfg = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg.workers, 1);
        assert_eq!(cfg.rescore_weight, 3.5);
    }
}
