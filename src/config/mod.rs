//! Engine configuration, read from a TOML file.
//!
//! ```toml
//! [passes]
//! simplify_constructors = true
//! compact_arrays = true
//! demote_assembles = true
//! demotion = "prefer_initial_snapshot"
//!
//! [equivalence]
//! max_depth = 5
//! float_delta = 1e-6
//! double_delta = 1e-6
//! mode = "plain"
//!
//! [types]
//! trivial_constructors = ["com.acme.Point"]
//! reliable_equals = ["java.math.BigInteger"]
//! getters = { "com.acme.Point.x" = "getX" }
//! ```
//!
//! Every table and every key is optional.


use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::TypeTable;

/// Default recursion bound of the equivalence engine.
pub const DEEP_EQUALS_MAX_DEPTH: usize = 5;

/// Absolute tolerance for floating-point equality.
pub const DEFAULT_DELTA: f64 = 1e-6;

// ─── Converter Settings ────────────────────────────────────────────

/// Which value wins when an assemble model is demoted to a composite and
/// both a replayed field-set argument and an initial-state snapshot of
/// the field exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemotionPolicy {
    /// The value observed by the concrete run.
    #[default]
    PreferInitialSnapshot,
    /// The value the field-set call would store.
    PreferReplayedArgument,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassConfig {
    pub simplify_constructors: bool,
    pub compact_arrays: bool,
    pub demote_assembles: bool,
    pub demotion: DemotionPolicy,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            simplify_constructors: true,
            compact_arrays: true,
            demote_assembles: true,
            demotion: DemotionPolicy::default(),
        }
    }
}

// ─── Equivalence Settings ──────────────────────────────────────────

/// Shape of the generated test body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    /// One test per execution.
    #[default]
    Plain,
    /// One test body shared by several executions.
    Parameterized,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquivalenceConfig {
    /// Field/element nesting at which structural comparison gives way to
    /// a single deep-equals assertion.
    pub max_depth: usize,
    pub float_delta: f64,
    pub double_delta: f64,
    pub mode: TestMode,
}

impl Default for EquivalenceConfig {
    fn default() -> Self {
        Self {
            max_depth: DEEP_EQUALS_MAX_DEPTH,
            float_delta: DEFAULT_DELTA,
            double_delta: DEFAULT_DELTA,
            mode: TestMode::Plain,
        }
    }
}

impl EquivalenceConfig {
    pub fn parameterized() -> Self {
        Self {
            mode: TestMode::Parameterized,
            ..Self::default()
        }
    }

    pub fn is_parameterized(&self) -> bool {
        self.mode == TestMode::Parameterized
    }
}

// ─── Engine Config ─────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub passes: PassConfig,
    pub equivalence: EquivalenceConfig,
    pub types: TypeTable,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// `load` when a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
