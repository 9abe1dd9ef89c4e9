//! Configuration
//!
//! Hierarchical configuration loading from:
//! - ramc.toml (default configuration)
//! - ramc.local.toml (git-ignored local overrides)
//! - Environment variables (RAMC_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # ramc.toml
//! fact-dir = "./facts"
//! output-dir = "./out"
//! engine = true
//! provenance = false
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! RAMC_FACT_DIR=/custom/facts
//! RAMC_PROVENANCE=true
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration recognized by the translator and transformer pipeline
/// (§6). `engine` and `provenance` are presence flags: in the upstream
/// system they are `Option<()>`, expressed here as booleans defaulting to
/// `false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for input `.facts` files.
    #[serde(rename = "fact-dir", default = "default_fact_dir")]
    pub fact_dir: PathBuf,

    /// Directory for `.csv`/`.facts` outputs and engine-staged files.
    #[serde(rename = "output-dir", default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Presence enables external-predecessor load/drop phases (§4.3.1 steps
    /// 3, 6, 8).
    #[serde(default)]
    pub engine: bool,

    /// Presence enables subproof subroutines and suppresses `Drop` of
    /// intermediates (§4.3.1 step 8, §4.3.5).
    #[serde(default)]
    pub provenance: bool,

    /// Presence wraps the top sequence in a `LogTimer` labeled `runtime`.
    #[serde(default)]
    pub profile: bool,

    /// If non-empty, the debug report is written to this path after
    /// translation.
    #[serde(rename = "debug-report", default)]
    pub debug_report: Option<PathBuf>,

    /// Safety bound on transformer-pipeline fixpoint iteration (§4.4.5).
    #[serde(rename = "max-transform-iterations", default = "default_max_iterations")]
    pub max_transform_iterations: usize,
}

fn default_fact_dir() -> PathBuf {
    PathBuf::from("./facts")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./out")
}

fn default_max_iterations() -> usize {
    16
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. ramc.toml (base configuration)
    /// 2. ramc.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (RAMC_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("ramc.toml"))
            .merge(Toml::file("ramc.local.toml"))
            .merge(Env::prefixed("RAMC_"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RAMC_"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fact_dir: default_fact_dir(),
            output_dir: default_output_dir(),
            engine: false,
            provenance: false,
            profile: false,
            debug_report: None,
            max_transform_iterations: default_max_iterations(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_directories() {
        let config = Config::default();
        assert_eq!(config.fact_dir, PathBuf::from("./facts"));
        assert_eq!(config.output_dir, PathBuf::from("./out"));
        assert!(!config.engine);
        assert!(!config.provenance);
        assert_eq!(config.max_transform_iterations, 16);
    }

    #[test]
    fn config_serializes_to_toml() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("fact-dir"));
        assert!(toml_str.contains("output-dir"));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let toml_str = "fact-dir = \"/data/facts\"\nengine = true\nprovenance = true\n";
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.fact_dir, PathBuf::from("/data/facts"));
        assert!(config.engine);
        assert!(config.provenance);
        assert_eq!(config.output_dir, PathBuf::from("./out"));
    }
}
