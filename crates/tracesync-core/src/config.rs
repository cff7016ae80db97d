//! Alignment configuration.
//!
//! Every field has a default, so a TOML file only needs the keys it changes:
//!
//! ```toml
//! strategy = "proportional"
//! overwrite_original = true
//! concurrency = 4
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracesync_store::WriteMode;

use crate::error::{AlignError, Result};

/// Default acceptance window of the nearest-match strategy.
pub const DEFAULT_TOLERANCE_MS: u64 = 200;

/// Which alignment policy to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Closest image per sample, rejected beyond `tolerance_ms`.
    #[default]
    Nearest,
    /// Images spread over the trace by relative position; offset measured.
    Proportional,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Nearest => "nearest",
            StrategyKind::Proportional => "proportional",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = AlignError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(StrategyKind::Nearest),
            "proportional" => Ok(StrategyKind::Proportional),
            other => Err(AlignError::InvalidConfig(format!(
                "unknown strategy '{other}' (expected 'nearest' or 'proportional')"
            ))),
        }
    }
}

/// Configuration of one alignment batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlignConfig {
    /// Alignment policy
    pub strategy: StrategyKind,
    /// Nearest-match acceptance window in milliseconds (ignored by proportional)
    pub tolerance_ms: u64,
    /// Write aligned episodes over their source instead of alongside it
    pub overwrite_original: bool,
    /// Carry the last assigned image forward over unmatched samples
    pub fill_gaps: bool,
    /// Episodes aligned in flight at once
    pub concurrency: usize,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Nearest,
            tolerance_ms: DEFAULT_TOLERANCE_MS,
            overwrite_original: false,
            fill_gaps: true,
            concurrency: 1,
        }
    }
}

impl AlignConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: AlignConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AlignError::InvalidConfig(format!("cannot read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject configurations the batch runner cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(AlignError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn write_mode(&self) -> WriteMode {
        WriteMode::from_overwrite_flag(self.overwrite_original)
    }
}
