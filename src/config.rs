// Optimization Defaults
//
// Process-wide settings that decide how generated units are installed.
// Read once from the environment, then immutable.
//
//   GRAPHGEN_JIT_MODE   script | none    (default: script)
//   GRAPHGEN_OPTIMIZE   1 | true | 0 | false  (default: false)

use crate::core::error::{CodegenError, Result};
use std::fmt;
use std::str::FromStr;

pub const JIT_MODE_VAR: &str = "GRAPHGEN_JIT_MODE";
pub const OPTIMIZE_VAR: &str = "GRAPHGEN_OPTIMIZE";

/// How registered units are installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitMode {
    /// Compile every unit to native code
    #[default]
    Script,
    /// Install units in symbolic form
    None,
}

impl FromStr for JitMode {
    type Err = CodegenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "script" => Ok(JitMode::Script),
            "none" => Ok(JitMode::None),
            other => Err(CodegenError::InvalidConfig(format!(
                "unknown jit mode '{}' (expected 'script' or 'none')",
                other
            ))),
        }
    }
}

impl fmt::Display for JitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitMode::Script => write!(f, "script"),
            JitMode::None => write!(f, "none"),
        }
    }
}

fn parse_flag(s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(CodegenError::InvalidConfig(format!("not a boolean: '{}'", other))),
    }
}

/// Settings read by `register`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptimizationDefaults {
    pub jit_mode: JitMode,
    /// Run the optimizer pipeline on each unit before installing it
    pub optimize_graphs: bool,
}

impl OptimizationDefaults {
    pub fn with_jit_mode(mut self, jit_mode: JitMode) -> Self {
        self.jit_mode = jit_mode;
        self
    }

    pub fn with_optimize_graphs(mut self, optimize_graphs: bool) -> Self {
        self.optimize_graphs = optimize_graphs;
        self
    }

    /// Read from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read through an arbitrary variable lookup
    ///
    /// Unparseable values are logged and replaced by the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut defaults = Self::default();

        if let Some(raw) = lookup(JIT_MODE_VAR) {
            match raw.parse::<JitMode>() {
                Ok(mode) => defaults.jit_mode = mode,
                Err(e) => log::warn!("Ignoring {}: {}", JIT_MODE_VAR, e),
            }
        }

        if let Some(raw) = lookup(OPTIMIZE_VAR) {
            match parse_flag(&raw) {
                Ok(flag) => defaults.optimize_graphs = flag,
                Err(e) => log::warn!("Ignoring {}: {}", OPTIMIZE_VAR, e),
            }
        }

        defaults
    }
}

lazy_static::lazy_static! {
    /// Process-wide defaults, fixed on first use
    static ref DEFAULTS: OptimizationDefaults = {
        let defaults = OptimizationDefaults::from_env();
        log::debug!(
            "Optimization defaults: jit_mode={}, optimize_graphs={}",
            defaults.jit_mode,
            defaults.optimize_graphs
        );
        defaults
    };
}

/// Process-wide optimization defaults
pub fn optimization_defaults() -> &'static OptimizationDefaults {
    &DEFAULTS
}
