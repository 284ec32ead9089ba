//! Engine Configuration
//!
//! Hierarchical configuration loading from:
//! - provql.toml (default configuration file)
//! - Environment variables (PROVQL_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # provql.toml
//! [optimizer]
//! max_passes = 10
//! fuse_step_chains = false
//!
//! [dumps]
//! enabled = true
//! layout_width = 80
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! PROVQL_OPTIMIZER__MAX_PASSES=4
//! PROVQL_DUMPS__TRACE=true
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub dumps: DumpConfig,
}

/// Optimizer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Upper bound on baseopt fixpoint passes
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,

    /// Fuse step chains into repeat nodes (widens hop-count semantics;
    /// off unless the embedder asks for it)
    #[serde(default)]
    pub fuse_step_chains: bool,
}

/// Pipeline dump and trace settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpConfig {
    /// Record a formatted dump of the plan at each pipeline stage
    #[serde(default)]
    pub enabled: bool,

    /// Record one trace line per query run
    #[serde(default)]
    pub trace: bool,

    /// Width budget for formatted dumps
    #[serde(default = "default_layout_width")]
    pub layout_width: usize,
}

fn default_max_passes() -> usize {
    10
}

fn default_layout_width() -> usize {
    80
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            max_passes: default_max_passes(),
            fuse_step_chains: false,
        }
    }
}

impl Default for DumpConfig {
    fn default() -> Self {
        DumpConfig {
            enabled: false,
            trace: false,
            layout_width: default_layout_width(),
        }
    }
}

impl Config {
    /// Load from `provql.toml` (if present) with `PROVQL_*` environment
    /// overrides on top.
    pub fn load() -> Result<Config, figment::Error> {
        Self::from_file("provql.toml")
    }

    /// Load from a specific file path plus environment overrides.
    pub fn from_file(path: &str) -> Result<Config, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PROVQL_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert_eq!(c.optimizer.max_passes, 10);
        assert!(!c.optimizer.fuse_step_chains);
        assert!(!c.dumps.enabled);
        assert_eq!(c.dumps.layout_width, 80);
    }

    #[test]
    fn roundtrips_through_toml() {
        let c = Config::default();
        let text = toml::to_string(&c).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.optimizer.max_passes, c.optimizer.max_passes);
        assert_eq!(back.dumps.layout_width, c.dumps.layout_width);
    }
}
