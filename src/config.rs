//! Floor-wide runtime configuration.

use std::time::Duration;

/// Tunables applied when an [`Office`](crate::exec::Office) is opened.
///
/// All fields have working defaults; construct with struct update syntax:
///
/// ```
/// use std::time::Duration;
/// use workfloor::FloorConfig;
///
/// let config = FloorConfig {
///     sweep_interval: Duration::from_millis(50),
///     ..FloorConfig::default()
/// };
/// assert_eq!(config.breakout_workers, 2);
/// ```
#[derive(Debug, Clone)]
pub struct FloorConfig {
    /// Event bus capacity; slow subscribers beyond it lose oldest events.
    pub bus_capacity: usize,
    /// How often the sweep driver checks pending deadlines.
    pub sweep_interval: Duration,
    /// Timeout applied when a blocking object access passes no explicit one.
    pub default_object_timeout: Duration,
    /// Worker count of the breakout team (delayed invocations, external
    /// object access).
    pub breakout_workers: usize,
}

impl Default for FloorConfig {
    fn default() -> Self {
        Self {
            bus_capacity: 256,
            sweep_interval: Duration::from_millis(100),
            default_object_timeout: Duration::from_secs(15),
            breakout_workers: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = FloorConfig::default();
        assert!(config.bus_capacity > 0);
        assert!(config.breakout_workers > 0);
        assert!(config.sweep_interval < config.default_object_timeout);
    }
}
