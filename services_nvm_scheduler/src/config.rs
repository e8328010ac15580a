//! Scheduler configuration
//!
//! Latencies and bounds are plain data with baked-in defaults. A host can
//! override any subset of them from JSON; missing keys keep their defaults.

use crate::SchedulerError;
use serde::{Deserialize, Serialize};

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Virtual time spent in `Reading`
    pub read_latency_ms: u64,
    /// Virtual time spent in `Writing`
    pub write_latency_ms: u64,
    /// Virtual time spent in either verify state
    pub verify_latency_ms: u64,
    /// Virtual time spent in `Completing`
    pub completion_latency_ms: u64,
    /// A write verification fails when the clock is a multiple of this
    pub retry_modulus: u64,
    /// Retry budget given to every job
    pub max_retries: u32,
    /// Trailing transitions retained per block
    pub history_depth: usize,
    /// Blocks `0..initial_blocks` get a context up front
    pub initial_blocks: u32,
    /// Maximum number of pending jobs
    pub queue_capacity: usize,
    /// Scheduler events retained for inspection
    pub event_log_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            read_latency_ms: 5,
            write_latency_ms: 10,
            verify_latency_ms: 5,
            completion_latency_ms: 5,
            retry_modulus: 17,
            max_retries: 3,
            history_depth: 5,
            initial_blocks: 4,
            queue_capacity: 32,
            event_log_capacity: 64,
        }
    }
}

impl SchedulerConfig {
    /// Parses and validates a configuration from JSON bytes
    pub fn from_json(bytes: &[u8]) -> Result<Self, SchedulerError> {
        let config: SchedulerConfig = serde_json::from_slice(bytes)
            .map_err(|e| SchedulerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, SchedulerError> {
        serde_json::to_vec_pretty(self).map_err(|e| SchedulerError::Config(e.to_string()))
    }

    /// Rejects values the scheduler can't operate with
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.retry_modulus == 0 {
            return Err(SchedulerError::Config(
                "retry_modulus must be non-zero".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(SchedulerError::Config(
                "queue_capacity must be non-zero".to_string(),
            ));
        }
        if self.history_depth == 0 {
            return Err(SchedulerError::Config(
                "history_depth must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.history_depth, 5);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SchedulerConfig::from_json(br#"{ "write_latency_ms": 20 }"#).unwrap();
        assert_eq!(config.write_latency_ms, 20);
        assert_eq!(config.read_latency_ms, 5);
        assert_eq!(config.queue_capacity, 32);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = SchedulerConfig::from_json(br#"{ "retry_modulus": 0 }"#);
        assert!(matches!(result, Err(SchedulerError::Config(_))));

        let result = SchedulerConfig::from_json(br#"{ "queue_capacity": 0 }"#);
        assert!(matches!(result, Err(SchedulerError::Config(_))));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let result = SchedulerConfig::from_json(b"not json");
        assert!(matches!(result, Err(SchedulerError::Config(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = SchedulerConfig {
            queue_capacity: 8,
            ..SchedulerConfig::default()
        };
        let bytes = config.to_json_pretty().unwrap();
        assert_eq!(SchedulerConfig::from_json(&bytes).unwrap(), config);
    }
}
