//! Process-wide copy settings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which upstream build wins when a build has several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamStrategy {
    /// Defer to `CopySettings::upstream_strategy`.
    #[default]
    UseGlobalSetting,
    UseOldest,
    UseNewest,
}

impl UpstreamStrategy {
    /// Resolve `UseGlobalSetting` against the global choice. A global choice
    /// of `UseGlobalSetting` means oldest.
    pub fn resolve(self, global: UpstreamStrategy) -> UpstreamStrategy {
        match self {
            UpstreamStrategy::UseGlobalSetting => match global {
                UpstreamStrategy::UseNewest => UpstreamStrategy::UseNewest,
                _ => UpstreamStrategy::UseOldest,
            },
            other => other,
        }
    }
}

impl FromStr for UpstreamStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oldest" | "use_oldest" => Ok(UpstreamStrategy::UseOldest),
            "newest" | "use_newest" => Ok(UpstreamStrategy::UseNewest),
            "global" | "use_global_setting" => Ok(UpstreamStrategy::UseGlobalSetting),
            other => Err(format!("unknown upstream strategy: {other}")),
        }
    }
}

impl fmt::Display for UpstreamStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpstreamStrategy::UseGlobalSetting => "global",
            UpstreamStrategy::UseOldest => "oldest",
            UpstreamStrategy::UseNewest => "newest",
        };
        f.write_str(s)
    }
}

/// Settings shared by every copy step in the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySettings {
    /// Upstream choice for triggering selectors set to `UseGlobalSetting`
    pub upstream_strategy: UpstreamStrategy,
    /// Promote debug-level step messages to info
    pub verbose: bool,
    /// Chunk size used when streaming file content
    pub buffer_size: usize,
}

pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

impl Default for CopySettings {
    fn default() -> Self {
        CopySettings {
            upstream_strategy: std::env::var("COPYART_UPSTREAM_STRATEGY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(UpstreamStrategy::UseOldest),
            verbose: std::env::var("COPYART_VERBOSE")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false),
            buffer_size: std::env::var("COPYART_BUFFER_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_BUFFER_SIZE),
        }
    }
}

impl CopySettings {
    /// Create settings from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Settings that ignore the environment
    pub fn new(upstream_strategy: UpstreamStrategy) -> Self {
        CopySettings {
            upstream_strategy,
            verbose: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse() {
        assert_eq!("newest".parse::<UpstreamStrategy>(), Ok(UpstreamStrategy::UseNewest));
        assert_eq!(" Oldest ".parse::<UpstreamStrategy>(), Ok(UpstreamStrategy::UseOldest));
        assert!("latest".parse::<UpstreamStrategy>().is_err());
    }

    #[test]
    fn test_global_setting_resolution() {
        let global = UpstreamStrategy::UseGlobalSetting;
        assert_eq!(global.resolve(UpstreamStrategy::UseNewest), UpstreamStrategy::UseNewest);
        assert_eq!(global.resolve(UpstreamStrategy::UseOldest), UpstreamStrategy::UseOldest);
        assert_eq!(global.resolve(global), UpstreamStrategy::UseOldest);
        assert_eq!(
            UpstreamStrategy::UseNewest.resolve(UpstreamStrategy::UseOldest),
            UpstreamStrategy::UseNewest
        );
    }

    #[test]
    fn test_explicit_settings() {
        let settings = CopySettings::new(UpstreamStrategy::UseNewest).with_buffer_size(0);
        assert_eq!(settings.buffer_size, 1);
        assert!(!settings.verbose);
    }
}
