//! Pipeline configuration.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// How the composer realizes an assembly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// One task per stage, chained by single channels.
    #[default]
    Serial,
    /// Stages flagged parallelizable are replicated behind a fan-out and
    /// fan-in adapter pair.
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => f.write_str("serial"),
            Self::Parallel => f.write_str("parallel"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "serial" => Ok(Self::Serial),
            "parallel" => Ok(Self::Parallel),
            other => Err(Error::InvalidConfig(format!(
                "unknown execution mode '{other}' (expected 'serial' or 'parallel')"
            ))),
        }
    }
}

/// Configuration threaded through the composer at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Serial or parallel realization.
    pub mode: ExecutionMode,
    /// Capacity of every ordinary channel.
    pub channel_capacity: usize,
    /// Degree of parallelism for parallelizable stages that do not pin
    /// their own.
    pub parallelism: usize,
    /// Multiplier applied to the channels feeding a fan-out and leaving a
    /// fan-in.
    pub fan_capacity_factor: usize,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Serial,
            channel_capacity: 100,
            parallelism: 4,
            fan_capacity_factor: 16,
            event_capacity: 256,
        }
    }
}

impl PipelineConfig {
    /// Default configuration in parallel mode.
    pub fn parallel() -> Self {
        Self::default().with_mode(ExecutionMode::Parallel)
    }

    /// Set the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the baseline channel capacity.
    pub fn with_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity;
        self
    }

    /// Set the default degree of parallelism.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Set the capacity multiplier at fan-out/fan-in boundaries.
    pub fn with_fan_capacity_factor(mut self, factor: usize) -> Self {
        self.fan_capacity_factor = factor;
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, event_capacity: usize) -> Self {
        self.event_capacity = event_capacity;
        self
    }

    /// Check every value is in range.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("channel_capacity", self.channel_capacity),
            ("parallelism", self.parallelism),
            ("fan_capacity_factor", self.fan_capacity_factor),
            ("event_capacity", self.event_capacity),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{field} must be positive")));
            }
        }
        Ok(())
    }

    /// Capacity of a channel at a fan-out/fan-in boundary.
    pub(crate) fn fan_capacity(&self) -> usize {
        self.channel_capacity.saturating_mul(self.fan_capacity_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.mode, ExecutionMode::Serial);
        assert_eq!(config.channel_capacity, 100);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.fan_capacity(), 1600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = PipelineConfig::default().with_capacity(0).validate().unwrap_err();
        assert!(err.to_string().contains("channel_capacity"));

        let err = PipelineConfig::parallel().with_parallelism(0).validate().unwrap_err();
        assert!(err.to_string().contains("parallelism"));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Parallel".parse::<ExecutionMode>().unwrap(), ExecutionMode::Parallel);
        assert_eq!("serial".parse::<ExecutionMode>().unwrap(), ExecutionMode::Serial);
        assert!("threaded".parse::<ExecutionMode>().is_err());
    }
}
