//! Configuration surface consumed by the core.
//!
//! The bootstrap layer that launches the traced program owns argument
//! parsing; it hands the core this struct. `Deserialize` is derived so the
//! bootstrap can read it from whatever source it owns.

use serde::Deserialize;
use std::path::PathBuf;

/// Trace output directory used when the bootstrap supplies none.
pub const DEFAULT_OUT_DIR: &str = "trace-out";

/// What the core needs to know: which units to trace, where to write.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceConfig {
    /// Ordered package-name prefixes selecting units to instrument.
    pub filters: Vec<String>,

    /// Base directory for per-thread trace files.
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
}

impl TraceConfig {
    pub fn new(filters: Vec<String>) -> Self {
        Self { filters, out_dir: None }
    }

    /// The effective output directory.
    pub fn output_dir(&self) -> PathBuf {
        self.out_dir.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full() {
        let config: TraceConfig =
            serde_json::from_str(r#"{"filters": ["com.example"], "out_dir": "/tmp/traces"}"#)
                .expect("parse");
        assert_eq!(config.filters, vec!["com.example".to_string()]);
        assert_eq!(config.output_dir(), PathBuf::from("/tmp/traces"));
    }

    #[test]
    fn test_out_dir_defaults() {
        let config: TraceConfig =
            serde_json::from_str(r#"{"filters": []}"#).expect("parse");
        assert_eq!(config.output_dir(), PathBuf::from(DEFAULT_OUT_DIR));
    }
}
