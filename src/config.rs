//! Bridge configuration.

use std::env;
use std::str::FromStr;

/// Per-context bridge settings.
///
/// ```ignore
/// let config = BridgeConfig::default()
///     .with_max_call_depth(64)
///     .with_strict_receiver(true);
/// let ctx = Context::with_config(config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Run the micro-task checkpoint when the outermost native-to-script
    /// call returns
    pub drain_microtasks: bool,
    /// Maximum nesting of cross-boundary calls
    pub max_call_depth: usize,
    /// Allocations after which a collection runs at the next safe point;
    /// zero disables it
    pub gc_threshold: usize,
    /// Raise an error instead of returning `undefined` when a property
    /// getter runs on an object that does not wrap the expected type
    pub strict_receiver: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            drain_microtasks: true,
            max_call_depth: 256,
            gc_threshold: 0,
            strict_receiver: false,
        }
    }
}

impl BridgeConfig {
    /// Default settings overlaid with `SCRIPTBRIDGE_*` environment variables.
    ///
    /// Recognized: `SCRIPTBRIDGE_DRAIN_MICROTASKS`, `SCRIPTBRIDGE_MAX_CALL_DEPTH`,
    /// `SCRIPTBRIDGE_GC_THRESHOLD`, `SCRIPTBRIDGE_STRICT_RECEIVER`. Values that
    /// fail to parse are ignored with a warning.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = parse_var(&lookup, "SCRIPTBRIDGE_DRAIN_MICROTASKS", parse_bool) {
            self.drain_microtasks = v;
        }
        if let Some(v) = parse_var(&lookup, "SCRIPTBRIDGE_MAX_CALL_DEPTH", |s| {
            usize::from_str(s).ok()
        }) {
            self.max_call_depth = v;
        }
        if let Some(v) = parse_var(&lookup, "SCRIPTBRIDGE_GC_THRESHOLD", |s| {
            usize::from_str(s).ok()
        }) {
            self.gc_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "SCRIPTBRIDGE_STRICT_RECEIVER", parse_bool) {
            self.strict_receiver = v;
        }
        self
    }

    /// Set whether micro-tasks drain after the outermost call.
    pub fn with_drain_microtasks(mut self, drain: bool) -> Self {
        self.drain_microtasks = drain;
        self
    }

    /// Set the maximum cross-boundary call depth.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Set the allocation count that triggers a collection.
    pub fn with_gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = threshold;
        self
    }

    /// Set strict receiver checking for property getters.
    pub fn with_strict_receiver(mut self, strict: bool) -> Self {
        self.strict_receiver = strict;
        self
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(key)?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        log::warn!("ignoring {}={:?}: not a valid value", key, raw);
    }
    parsed
}
