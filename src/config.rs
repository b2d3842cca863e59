use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::network::curvature::CurvatureMode;
use crate::network::strategy::StrategyKind;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bionet: BionetConfig,
    #[serde(default)]
    pub explorer: ExplorerConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub visual: VisualConfig,
}

/// Bionet-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BionetConfig {
    /// SQLite file holding the biographical tables.
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Traversal limits
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default = "default_node_cap_per_level")]
    pub node_cap_per_level: usize,
    #[serde(default = "default_total_node_cap")]
    pub total_node_cap: usize,
    /// Reciprocal detection is skipped when the discovered set reaches this size.
    #[serde(default = "default_reciprocal_ceiling")]
    pub reciprocal_ceiling: usize,
    /// 0 disables the per-request deadline.
    #[serde(default)]
    pub query_timeout_ms: u64,
    /// 0 disables the person record cache.
    #[serde(default = "default_person_cache_capacity")]
    pub person_cache_capacity: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            node_cap_per_level: default_node_cap_per_level(),
            total_node_cap: default_total_node_cap(),
            reciprocal_ceiling: default_reciprocal_ceiling(),
            query_timeout_ms: 0,
            person_cache_capacity: default_person_cache_capacity(),
        }
    }
}

fn default_node_cap_per_level() -> usize {
    100
}

fn default_total_node_cap() -> usize {
    1000
}

fn default_reciprocal_ceiling() -> usize {
    500
}

fn default_person_cache_capacity() -> usize {
    5000
}

/// Strategy selection thresholds and worker bounds.
///
/// Shared process-wide through [`crate::network::strategy::SharedStrategyConfig`];
/// always replaced as a whole value, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_branching_factor")]
    pub branching_factor: f64,
    #[serde(default = "default_small_threshold")]
    pub small_threshold: f64,
    #[serde(default = "default_large_threshold")]
    pub large_threshold: f64,
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_enabled_strategies")]
    pub enabled: Vec<StrategyKind>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            branching_factor: default_branching_factor(),
            small_threshold: default_small_threshold(),
            large_threshold: default_large_threshold(),
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            enabled: default_enabled_strategies(),
        }
    }
}

impl StrategyConfig {
    /// Validate a candidate configuration before it is published.
    pub fn validate(&self) -> crate::Result<()> {
        use crate::BionetError;

        if !(self.branching_factor.is_finite() && self.branching_factor >= 1.0) {
            return Err(BionetError::Config(
                "strategy.branching_factor must be a finite number >= 1".to_string(),
            ));
        }
        if !(self.small_threshold.is_finite() && self.small_threshold > 0.0) {
            return Err(BionetError::Config(
                "strategy.small_threshold must be greater than 0".to_string(),
            ));
        }
        if self.large_threshold < self.small_threshold {
            return Err(BionetError::Config(
                "strategy.large_threshold must be >= small_threshold".to_string(),
            ));
        }
        if self.min_workers == 0 {
            return Err(BionetError::Config(
                "strategy.min_workers must be greater than 0".to_string(),
            ));
        }
        if self.max_workers < self.min_workers {
            return Err(BionetError::Config(
                "strategy.max_workers must be >= min_workers".to_string(),
            ));
        }
        if !self.enabled.contains(&StrategyKind::BatchOptimized) {
            return Err(BionetError::Config(
                "strategy.enabled must include \"optimized\" (fallback strategy)".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_branching_factor() -> f64 {
    20.0
}

fn default_small_threshold() -> f64 {
    100.0
}

fn default_large_threshold() -> f64 {
    1000.0
}

fn default_min_workers() -> usize {
    2
}

fn default_max_workers() -> usize {
    8
}

fn default_enabled_strategies() -> Vec<StrategyKind> {
    vec![
        StrategyKind::Naive,
        StrategyKind::BatchOptimized,
        StrategyKind::WorkerPool,
    ]
}

/// Visual encoding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VisualConfig {
    #[serde(default)]
    pub curvature_mode: CurvatureMode,
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,
    #[serde(default = "default_base_curvature")]
    pub base_curvature: f64,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            curvature_mode: CurvatureMode::default(),
            amplitude: default_amplitude(),
            base_curvature: default_base_curvature(),
        }
    }
}

fn default_amplitude() -> f64 {
    3.5
}

fn default_base_curvature() -> f64 {
    0.25
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[strategy]` table on its own, used when reloading a changed config file.
#[derive(Debug, Deserialize)]
struct StrategyOnly {
    #[serde(default)]
    strategy: StrategyConfig,
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in BIONET_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = Self::config_path();
        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml_str(&config_str)
    }

    /// Resolve the config file location (BIONET_CONFIG or ./config.toml)
    pub fn config_path() -> PathBuf {
        std::env::var("BIONET_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.bionet.db_path.as_os_str().is_empty() {
            anyhow::bail!("bionet.db_path must not be empty");
        }

        if self.explorer.node_cap_per_level == 0 {
            anyhow::bail!("explorer.node_cap_per_level must be greater than 0");
        }

        // The root always occupies one slot.
        if self.explorer.total_node_cap < 2 {
            anyhow::bail!("explorer.total_node_cap must be at least 2");
        }

        if self.visual.amplitude <= 0.0 {
            anyhow::bail!("visual.amplitude must be greater than 0");
        }

        self.strategy.validate()?;

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.bionet.db_path
    }
}

/// Read only the `[strategy]` table from a config file.
pub fn load_strategy_section(path: &Path) -> crate::Result<StrategyConfig> {
    let text = std::fs::read_to_string(path)?;
    let parsed: StrategyOnly = toml::from_str(&text)
        .map_err(|e| crate::BionetError::Config(format!("{}: {}", path.display(), e)))?;
    parsed.strategy.validate()?;
    Ok(parsed.strategy)
}
