//! Compiler configuration, resolved once and read-only afterwards.
//!
//! Defaults can be overridden from the environment:
//!
//! | variable              | field                      |
//! |-----------------------|----------------------------|
//! | `KEEL_CANONICALIZE`   | `canonicalize`             |
//! | `KEEL_LOWER_EXACT`    | `lower_exact_arithmetic`   |
//! | `KEEL_REWRITE_BUDGET` | `rewrite_budget_per_node`  |
//! | `KEEL_VERIFY_GRAPH`   | `verify_graph`             |
//! | `KEEL_COLLECT_TIMING` | `collect_timing`           |

use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("'{option}' requires '{required}' to be enabled")]
    RequiresOption {
        option: &'static str,
        required: &'static str,
    },
    #[error("invalid value '{value}' for '{option}': {reason}")]
    InvalidValue {
        option: &'static str,
        value: String,
        reason: &'static str,
    },
}

// =============================================================================
// Compiler Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Run the canonicalizer.
    pub canonicalize: bool,

    /// Lower exact arithmetic into explicit overflow branches.
    pub lower_exact_arithmetic: bool,

    /// Rewrites allowed per initial node before canonicalization bails out.
    pub rewrite_budget_per_node: usize,

    /// Verify the graph after every pass.
    pub verify_graph: bool,

    /// Record per-pass wall-clock time.
    pub collect_timing: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            canonicalize: true,
            lower_exact_arithmetic: true,
            rewrite_budget_per_node: 16,
            verify_graph: cfg!(debug_assertions),
            collect_timing: false,
        }
    }
}

impl CompilerConfig {
    /// Slack added to the rewrite budget for tiny graphs.
    pub const REWRITE_BUDGET_SLACK: usize = 64;

    /// Defaults overlaid with `KEEL_*` environment variables, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns, validated.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = lookup("KEEL_CANONICALIZE") {
            config.canonicalize = parse_bool("KEEL_CANONICALIZE", &v)?;
        }
        if let Some(v) = lookup("KEEL_LOWER_EXACT") {
            config.lower_exact_arithmetic = parse_bool("KEEL_LOWER_EXACT", &v)?;
        }
        if let Some(v) = lookup("KEEL_REWRITE_BUDGET") {
            config.rewrite_budget_per_node =
                v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    option: "KEEL_REWRITE_BUDGET",
                    value: v.clone(),
                    reason: "expected a non-negative integer",
                })?;
        }
        if let Some(v) = lookup("KEEL_VERIFY_GRAPH") {
            config.verify_graph = parse_bool("KEEL_VERIFY_GRAPH", &v)?;
        }
        if let Some(v) = lookup("KEEL_COLLECT_TIMING") {
            config.collect_timing = parse_bool("KEEL_COLLECT_TIMING", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the options are consistent with each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lower_exact_arithmetic && !self.canonicalize {
            return Err(ConfigError::RequiresOption {
                option: "lower_exact_arithmetic",
                required: "canonicalize",
            });
        }
        if self.rewrite_budget_per_node == 0 {
            return Err(ConfigError::InvalidValue {
                option: "rewrite_budget_per_node",
                value: "0".into(),
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Total rewrites allowed for a graph of `node_count` nodes.
    pub fn rewrite_budget(&self, node_count: usize) -> usize {
        self.rewrite_budget_per_node
            .saturating_mul(node_count)
            .saturating_add(Self::REWRITE_BUDGET_SLACK)
    }
}

fn parse_bool(option: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            option,
            value: value.to_string(),
            reason: "expected a boolean",
        }),
    }
}

// =============================================================================
// Tests
// =============================================================================
