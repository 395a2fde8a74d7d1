//! Arena configuration
//!
//! Loaded from an optional TOML file, then `SLIP_` prefixed environment
//! variables (`SLIP_INITIAL_SLOTS`, `SLIP_GROWTH_SLOTS`, `SLIP_MAX_SLOTS`).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest fragment the arena will request
pub const MIN_FRAGMENT_SLOTS: usize = 8;

/// Sizes governing fragment requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Slots in the first fragment
    pub initial_slots: usize,
    /// Slots in every later fragment
    pub growth_slots: usize,
    /// Upper bound on slots obtained from the system (0 = unbounded)
    pub max_slots: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            initial_slots: 1024,
            growth_slots: 1024,
            max_slots: 0,
        }
    }
}

impl ArenaConfig {
    pub fn new(initial_slots: usize, growth_slots: usize) -> Self {
        Self {
            initial_slots,
            growth_slots,
            max_slots: 0,
        }
    }

    pub fn with_max_slots(mut self, max_slots: usize) -> Self {
        self.max_slots = max_slots;
        self
    }

    /// Load from a TOML file (optional) overlaid with `SLIP_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(config::Environment::with_prefix("SLIP").try_parsing(true));

        builder
            .build()
            .and_then(|c| c.try_deserialize::<ArenaConfig>())
            .map_err(|e| Error::Configuration(format!("Failed to load arena config: {}", e)))
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to render config: {}", e)))
    }

    /// Slot count for the first (`first == true`) or a later fragment.
    ///
    /// Non-zero sizes are clamped up to [`MIN_FRAGMENT_SLOTS`]; zero is a
    /// configuration error reported at the point of demand.
    pub fn fragment_slots(&self, first: bool) -> Result<usize> {
        let (name, requested) = if first {
            ("initial_slots", self.initial_slots)
        } else {
            ("growth_slots", self.growth_slots)
        };
        if requested == 0 {
            return Err(Error::Configuration(format!("{} resolved to zero", name)));
        }
        Ok(requested.max(MIN_FRAGMENT_SLOTS))
    }
}
