//! GC configuration parameters.
//!
//! The configuration is fixed when the heap is built: a collection strategy,
//! a diagnostic mode and a handful of flags. It can be written out directly
//! or read from `PRISM_GC_*` environment variables.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Smallest heap the collectors accept.
pub const MIN_HEAP_SIZE: usize = 4 * 1024;

/// Environment variable selecting the collector.
pub const ENV_COLLECTOR: &str = "PRISM_GC_COLLECTOR";
/// Environment variable selecting the diagnostic mode.
pub const ENV_MODE: &str = "PRISM_GC_MODE";
/// Environment variable enabling leak tolerance.
pub const ENV_LEAK_TOLERANT: &str = "PRISM_GC_LEAK_TOLERANT";
/// Environment variable overriding the heap size in bytes.
pub const ENV_HEAP_SIZE: &str = "PRISM_GC_HEAP_SIZE";
/// Environment variable enabling post-collection verification.
pub const ENV_VERIFY: &str = "PRISM_GC_VERIFY";

/// Collection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CollectorKind {
    /// Non-moving mark-sweep over a free list.
    #[default]
    MarkSweep,
    /// Cheney semi-space copying.
    Copying,
    /// Bump allocation, never reclaims.
    Leaky,
}

impl CollectorKind {
    /// Name as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            CollectorKind::MarkSweep => "mark_sweep",
            CollectorKind::Copying => "copying",
            CollectorKind::Leaky => "leaky",
        }
    }
}

impl FromStr for CollectorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mark_sweep" | "mark-sweep" | "marksweep" => Ok(CollectorKind::MarkSweep),
            "copying" | "semispace" | "semi_space" => Ok(CollectorKind::Copying),
            "leaky" | "none" => Ok(CollectorKind::Leaky),
            _ => Err(ConfigError::UnknownCollector(s.to_string())),
        }
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic mode layered over the collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DiagnosticMode {
    /// Collector decisions are used as-is.
    #[default]
    Normal,
    /// Collect before every allocation. Statistics are recorded too.
    Stress,
    /// Record statistics without altering any decision.
    Statistics,
}

impl DiagnosticMode {
    /// Name as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticMode::Normal => "normal",
            DiagnosticMode::Stress => "stress",
            DiagnosticMode::Statistics => "statistics",
        }
    }

    /// Whether this mode keeps statistics.
    pub fn records_stats(self) -> bool {
        matches!(self, DiagnosticMode::Stress | DiagnosticMode::Statistics)
    }
}

impl FromStr for DiagnosticMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "" => Ok(DiagnosticMode::Normal),
            "stress" => Ok(DiagnosticMode::Stress),
            "statistics" | "stats" => Ok(DiagnosticMode::Statistics),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for DiagnosticMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the heap.
///
/// # Example
///
/// ```
/// use prism_heap::{CollectorKind, GcConfig};
///
/// let config = GcConfig {
///     collector: CollectorKind::Copying,
///     heap_size: 1024 * 1024,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcConfig {
    /// Collection strategy.
    ///
    /// Default: mark-sweep
    pub collector: CollectorKind,

    /// Diagnostic mode.
    ///
    /// Default: normal
    pub mode: DiagnosticMode,

    /// Skip the shutdown leak check.
    ///
    /// Objects still reachable from global roots at shutdown are expected in
    /// processes that keep caches in globals.
    ///
    /// Default: false
    pub leak_tolerant: bool,

    /// Heap size in bytes.
    ///
    /// The copying collector splits it between its two semi-spaces.
    ///
    /// Default: 8MB
    pub heap_size: usize,

    /// Verify heap integrity after each collection.
    ///
    /// Expensive but useful for debugging GC bugs.
    ///
    /// Default: false
    pub verify_heap: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            collector: CollectorKind::MarkSweep,
            mode: DiagnosticMode::Normal,
            leak_tolerant: false,
            heap_size: 8 * 1024 * 1024, // 8MB
            verify_heap: false,
        }
    }
}

impl GcConfig {
    /// Collect on every allocation and verify after every collection.
    pub fn stress() -> Self {
        Self {
            mode: DiagnosticMode::Stress,
            verify_heap: true,
            ..Default::default()
        }
    }

    /// Default collector with statistics recording.
    pub fn statistics() -> Self {
        Self {
            mode: DiagnosticMode::Statistics,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heap_size < MIN_HEAP_SIZE {
            return Err(ConfigError::HeapTooSmall {
                size: self.heap_size,
                min: MIN_HEAP_SIZE,
            });
        }
        if self.heap_size % crate::object::OBJECT_ALIGN != 0 {
            return Err(ConfigError::MisalignedHeap(self.heap_size));
        }
        Ok(())
    }

    /// Read the configuration from the process environment.
    ///
    /// Unset variables keep their default values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_COLLECTOR) {
            config.collector = value.parse()?;
        }
        if let Some(value) = lookup(ENV_MODE) {
            config.mode = value.parse()?;
        }
        if let Some(value) = lookup(ENV_LEAK_TOLERANT) {
            config.leak_tolerant = parse_flag(ENV_LEAK_TOLERANT, &value)?;
        }
        if let Some(value) = lookup(ENV_VERIFY) {
            config.verify_heap = parse_flag(ENV_VERIFY, &value)?;
        }
        if let Some(value) = lookup(ENV_HEAP_SIZE) {
            config.heap_size = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber {
                    key: ENV_HEAP_SIZE,
                    value: value.clone(),
                })?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            key,
            value: value.to_string(),
        }),
    }
}

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Heap size is below [`MIN_HEAP_SIZE`].
    #[error("heap size {size} is below the minimum of {min} bytes")]
    HeapTooSmall {
        /// Requested size.
        size: usize,
        /// Minimum accepted size.
        min: usize,
    },
    /// Heap size is not a multiple of the object alignment.
    #[error("heap size {0} is not a multiple of 8")]
    MisalignedHeap(usize),
    /// Unrecognized collector name.
    #[error("unknown collector `{0}` (expected mark_sweep, copying or leaky)")]
    UnknownCollector(String),
    /// Unrecognized diagnostic mode.
    #[error("unknown mode `{0}` (expected normal, stress or statistics)")]
    UnknownMode(String),
    /// A numeric variable failed to parse.
    #[error("{key}: `{value}` is not a number")]
    InvalidNumber {
        /// Variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
    },
    /// A boolean variable failed to parse.
    #[error("{key}: `{value}` is not a boolean")]
    InvalidFlag {
        /// Variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
    },
    /// A process-wide heap is already installed.
    #[error("a global heap is already installed")]
    AlreadyInstalled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(GcConfig::default().validate().is_ok());
    }

    #[test]
    fn test_preset_configs_are_valid() {
        assert!(GcConfig::stress().validate().is_ok());
        assert!(GcConfig::statistics().validate().is_ok());
        assert!(GcConfig::stress().mode.records_stats());
        assert!(!DiagnosticMode::Normal.records_stats());
    }

    #[test]
    fn test_invalid_heap_size() {
        let config = GcConfig {
            heap_size: 1024,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::HeapTooSmall {
                size: 1024,
                min: MIN_HEAP_SIZE
            })
        );

        let config = GcConfig {
            heap_size: MIN_HEAP_SIZE + 3,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::MisalignedHeap(MIN_HEAP_SIZE + 3))
        );
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        assert_eq!(GcConfig::from_lookup(lookup(&[])), Ok(GcConfig::default()));
    }

    #[test]
    fn test_environment_overrides() {
        let config = GcConfig::from_lookup(lookup(&[
            (ENV_COLLECTOR, "copying"),
            (ENV_MODE, "stress"),
            (ENV_LEAK_TOLERANT, "1"),
            (ENV_HEAP_SIZE, "65536"),
            (ENV_VERIFY, "true"),
        ]))
        .unwrap();

        assert_eq!(config.collector, CollectorKind::Copying);
        assert_eq!(config.mode, DiagnosticMode::Stress);
        assert!(config.leak_tolerant);
        assert!(config.verify_heap);
        assert_eq!(config.heap_size, 65536);
    }

    #[test]
    fn test_environment_errors() {
        assert_eq!(
            GcConfig::from_lookup(lookup(&[(ENV_COLLECTOR, "refcount")])),
            Err(ConfigError::UnknownCollector("refcount".into()))
        );
        assert_eq!(
            GcConfig::from_lookup(lookup(&[(ENV_MODE, "loud")])),
            Err(ConfigError::UnknownMode("loud".into()))
        );
        assert_eq!(
            GcConfig::from_lookup(lookup(&[(ENV_HEAP_SIZE, "lots")])),
            Err(ConfigError::InvalidNumber {
                key: ENV_HEAP_SIZE,
                value: "lots".into()
            })
        );
        assert_eq!(
            GcConfig::from_lookup(lookup(&[(ENV_VERIFY, "maybe")])),
            Err(ConfigError::InvalidFlag {
                key: ENV_VERIFY,
                value: "maybe".into()
            })
        );
    }

    #[test]
    fn test_names_round_trip() {
        for kind in [
            CollectorKind::MarkSweep,
            CollectorKind::Copying,
            CollectorKind::Leaky,
        ] {
            assert_eq!(kind.as_str().parse::<CollectorKind>(), Ok(kind));
        }
        for mode in [
            DiagnosticMode::Normal,
            DiagnosticMode::Stress,
            DiagnosticMode::Statistics,
        ] {
            assert_eq!(mode.to_string().parse::<DiagnosticMode>(), Ok(mode));
        }
    }
}
