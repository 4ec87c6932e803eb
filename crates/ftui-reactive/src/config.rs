#![forbid(unsafe_code)]

//! Runtime policy for the propagation engine.
//!
//! A [`ReactiveConfig`] lives in a thread-local context, mirroring how the
//! rest of the reactive core is single-threaded. The base configuration is
//! detected from the environment on first use and may be replaced with
//! [`ReactiveConfig::install`] or overridden for a lexical scope with
//! [`ReactiveConfig::push_override`].
//!
//! # Environment
//!
//! | Variable | Values | Default |
//! |----------|--------|---------|
//! | `FTUI_REACTIVE_MAX_DEPTH` | positive integer | `64` |
//! | `FTUI_REACTIVE_TARGET_WRITES` | `overwrite`, `warn`, `reject` | `overwrite` |
//!
//! Unparseable values fall back to the default for that field.

use std::cell::RefCell;
use std::env;
use std::fmt;
use std::str::FromStr;

/// Environment variable for [`ReactiveConfig::max_cascade_depth`].
pub const MAX_DEPTH_ENV: &str = "FTUI_REACTIVE_MAX_DEPTH";
/// Environment variable for [`ReactiveConfig::target_writes`].
pub const TARGET_WRITES_ENV: &str = "FTUI_REACTIVE_TARGET_WRITES";

const DEFAULT_MAX_CASCADE_DEPTH: usize = 64;

thread_local! {
    static CONTEXT: RefCell<ConfigContext> = RefCell::new(ConfigContext {
        base: ReactiveConfig::from_env(),
        overrides: Vec::new(),
        next_override: 0,
    });
}

struct ConfigContext {
    base: ReactiveConfig,
    /// Active overrides tagged with their guard id; the last one wins.
    overrides: Vec<(u64, ReactiveConfig)>,
    next_override: u64,
}

/// What happens when code writes directly to the target of a one-way binding.
///
/// The write always lands locally under `Overwrite` and `Warn`; the next
/// change of the binding's source replaces it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "policy-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum TargetWritePolicy {
    /// Accept the write silently.
    #[default]
    Overwrite,
    /// Accept the write and emit a `tracing` warning.
    Warn,
    /// Refuse the write with [`ReactiveError::ReadOnlyTarget`](crate::ReactiveError::ReadOnlyTarget).
    Reject,
}

impl FromStr for TargetWritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "warn" => Ok(Self::Warn),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown target write policy: {other}")),
        }
    }
}

impl fmt::Display for TargetWritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Overwrite => "overwrite",
            Self::Warn => "warn",
            Self::Reject => "reject",
        })
    }
}

/// Propagation policy knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "policy-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ReactiveConfig {
    /// Maximum number of nested cascade frames. Each external `set` opens a
    /// frame; a listener that writes another property opens one more.
    pub max_cascade_depth: usize,
    /// Policy for direct writes to one-way binding targets.
    pub target_writes: TargetWritePolicy,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
            target_writes: TargetWritePolicy::Overwrite,
        }
    }
}

impl ReactiveConfig {
    /// Set the cascade depth limit (clamped to at least 1).
    #[must_use]
    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth.max(1);
        self
    }

    /// Set the one-way target write policy.
    #[must_use]
    pub fn with_target_writes(mut self, policy: TargetWritePolicy) -> Self {
        self.target_writes = policy;
        self
    }

    /// Build a configuration from `FTUI_REACTIVE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let max_depth = env::var(MAX_DEPTH_ENV).ok();
        let target_writes = env::var(TARGET_WRITES_ENV).ok();
        Self::from_vars(max_depth.as_deref(), target_writes.as_deref())
    }

    fn from_vars(max_depth: Option<&str>, target_writes: Option<&str>) -> Self {
        let defaults = Self::default();
        let max_cascade_depth = max_depth
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|depth| *depth > 0)
            .unwrap_or(defaults.max_cascade_depth);
        let target_writes = target_writes
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(defaults.target_writes);
        Self {
            max_cascade_depth,
            target_writes,
        }
    }

    /// Parse a configuration from a TOML policy document.
    ///
    /// Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns the TOML error when the document is malformed or a value has
    /// the wrong type.
    #[cfg(feature = "policy-config")]
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        let config: Self = toml::from_str(source)?;
        Ok(config.with_max_cascade_depth(config.max_cascade_depth))
    }

    /// The configuration in effect on this thread, honoring overrides.
    #[must_use]
    pub fn current() -> Self {
        CONTEXT.with(|ctx| {
            let ctx = ctx.borrow();
            ctx.overrides
                .last()
                .map_or(ctx.base, |(_, config)| *config)
        })
    }

    /// Replace the base configuration for this thread, returning the previous
    /// one. Active overrides keep precedence.
    pub fn install(self) -> Self {
        CONTEXT.with(|ctx| std::mem::replace(&mut ctx.borrow_mut().base, self))
    }

    /// Push a scoped override. Dropping the guard removes exactly this
    /// override; overrides pushed after it stay in effect.
    #[must_use = "dropping this guard clears the config override"]
    pub fn push_override(self) -> ConfigOverride {
        let id = CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            let id = ctx.next_override;
            ctx.next_override += 1;
            ctx.overrides.push((id, self));
            id
        });
        ConfigOverride { id }
    }
}

/// RAII guard for a scoped [`ReactiveConfig`] override.
#[must_use = "dropping this guard clears the config override"]
#[derive(Debug)]
pub struct ConfigOverride {
    id: u64,
}

impl Drop for ConfigOverride {
    fn drop(&mut self) {
        let _ = CONTEXT.try_with(|ctx| {
            ctx.borrow_mut()
                .overrides
                .retain(|(id, _)| *id != self.id);
        });
    }
}
