//! Solver configuration

use crate::worklist::PopOrder;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Run the structural (Hindley-Milner) half.
    pub do_hm: bool,
    /// Run the flow (constant propagation) half.
    pub do_gcp: bool,
    /// Re-probe every node after each phase and record violations.
    pub check_invariants: bool,
    /// Worklist pops before the driver gives up.
    pub max_iterations: usize,
    pub max_widen_rounds: usize,
    /// Nesting allowed for records from one allocation site.
    pub struct_depth_cutoff: usize,
    pub pop_order: PopOrder,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            do_hm: true,
            do_gcp: true,
            check_invariants: cfg!(debug_assertions),
            max_iterations: 100_000,
            max_widen_rounds: 16,
            struct_depth_cutoff: 1,
            pop_order: PopOrder::Lifo,
        }
    }
}

impl SolverConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn with_hm(mut self, on: bool) -> Self {
        self.do_hm = on;
        self
    }

    pub fn with_gcp(mut self, on: bool) -> Self {
        self.do_gcp = on;
        self
    }

    pub fn with_invariants(mut self, on: bool) -> Self {
        self.check_invariants = on;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_pop_order(mut self, order: PopOrder) -> Self {
        self.pop_order = order;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SolverConfig::default();
        assert!(config.do_hm && config.do_gcp);
        assert_eq!(config.struct_depth_cutoff, 1);
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "do_gcp": false, "max_iterations": 50 }}"#).unwrap();
        let config = SolverConfig::from_file(file.path()).unwrap();
        assert!(!config.do_gcp);
        assert!(config.do_hm);
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.max_widen_rounds, SolverConfig::default().max_widen_rounds);
        assert_eq!(config.pop_order, PopOrder::Lifo);
    }

    #[test]
    fn test_pop_order_reads_lowercase() {
        let config: SolverConfig = serde_json::from_str(r#"{ "pop_order": "fifo" }"#).unwrap();
        assert_eq!(config.pop_order, PopOrder::Fifo);
    }

    #[test]
    fn test_from_file_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = SolverConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("parsing"));
    }
}
