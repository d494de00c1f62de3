//! Trace configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendKind;
use crate::element::Beamline;

/// Configuration rejected before tracing starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_events` is zero.
    #[error("max_events must be at least 1")]
    MaxEventsZero,

    /// `start_event_id` is not below `max_events`.
    #[error("start_event_id {start} must be less than max_events {max}")]
    StartEventOutOfRange {
        /// Configured start.
        start: u32,
        /// Configured bound.
        max: u32,
    },

    /// `max_batch_size` is zero.
    #[error("max_batch_size must be at least 1")]
    BatchSizeZero,
}

/// Settings for one call to [`crate::Tracer::trace`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Rays traced per batch.
    pub max_batch_size: usize,
    /// Bound on events per ray, terminal event included.
    pub max_events: u32,
    /// Index of the first event written to the output.
    pub start_event_id: u32,
    /// Trace rays one after another in id order.
    pub sequential: bool,
    /// Seed for all random draws; drawn fresh per trace when unset.
    pub random_seed: Option<u64>,
    /// Execution backend.
    pub backend: BackendKind,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100_000,
            max_events: 32,
            start_event_id: 0,
            sequential: false,
            random_seed: None,
            backend: BackendKind::Cpu,
        }
    }
}

impl TraceConfig {
    /// Default configuration with an event budget sized for `beamline`.
    pub fn for_beamline(beamline: &Beamline) -> Self {
        let elements = u32::try_from(beamline.len()).unwrap_or(u32::MAX / 2);
        Self {
            max_events: elements.saturating_mul(2).saturating_add(8),
            ..Self::default()
        }
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_events == 0 {
            return Err(ConfigError::MaxEventsZero);
        }
        if self.start_event_id >= self.max_events {
            return Err(ConfigError::StartEventOutOfRange {
                start: self.start_event_id,
                max: self.max_events,
            });
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::BatchSizeZero);
        }
        Ok(())
    }
}
