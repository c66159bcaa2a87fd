// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tunables for the assignment pass.

use crate::error::ConfigError;

/// Configuration for [`AssignmentEngine`](crate::assign::AssignmentEngine).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AssignConfig {
    /// Hardware output windows per display.
    pub max_windows: u8,
    /// Layers (bottom-up) that may bid for a hardware path; the rest are
    /// client-composed.
    pub max_device_layers: u32,
    /// Iterations the retry loop may take before falling back to full
    /// client composition. See [`retry_bound`](Self::retry_bound).
    pub max_retries: u32,
    /// Fraction of each M2M type's modeled capacity that may be spent.
    pub capacity_ceiling: f32,
    /// Whether the shared secondary compositor is used at all.
    pub secondary_enabled: bool,
    /// Largest batch the secondary compositor takes in one pass.
    pub secondary_max_layers: u32,
    /// Whether an undamaged client group reuses its previous target.
    pub skip_static: bool,
    /// Shortest client run for which skipping is worth it.
    pub skip_static_min_layers: u32,
    /// Layers updating slower than this (frames per second) are grouped
    /// into client composition in low-activity mode.
    pub low_fps_threshold: u32,
    /// Largest edge, in pixels, of a layer that may use a cursor window.
    pub cursor_max_size: u32,
    /// Refresh rate used for the capacity model.
    pub refresh_hz: f32,
}

impl AssignConfig {
    /// Defaults for a phone-class display processor.
    #[must_use]
    pub const fn mobile() -> Self {
        Self {
            max_windows: 6,
            max_device_layers: 12,
            max_retries: 32,
            capacity_ceiling: 0.95,
            secondary_enabled: true,
            secondary_max_layers: 8,
            skip_static: true,
            skip_static_min_layers: 2,
            low_fps_threshold: 5,
            cursor_max_size: 256,
            refresh_hz: 60.0,
        }
    }

    /// Fewer windows, more headroom, no secondary compositor.
    ///
    /// Useful on bring-up when M2M drivers are not trusted yet.
    #[must_use]
    pub const fn conservative() -> Self {
        Self {
            max_windows: 4,
            max_device_layers: 4,
            max_retries: 8,
            capacity_ceiling: 0.8,
            secondary_enabled: false,
            secondary_max_layers: 0,
            skip_static: false,
            skip_static_min_layers: 2,
            low_fps_threshold: 5,
            cursor_max_size: 128,
            refresh_hz: 60.0,
        }
    }

    /// Most iterations the retry loop can take.
    ///
    /// Every iteration that asks for another one moves at least one bidding
    /// layer one step down the ladder device, secondary, client, and no
    /// layer ever moves back up within a pass. Each of the
    /// `max_device_layers` bidding layers can step down at most twice (once
    /// without a secondary compositor), and the last iteration changes
    /// nothing.
    #[must_use]
    pub const fn retry_bound(&self) -> u32 {
        let steps = if self.secondary_enabled { 2 } else { 1 };
        self.max_device_layers
            .saturating_mul(steps)
            .saturating_add(1)
    }

    /// Checks internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let needed = self.retry_bound();
        if self.max_retries < needed {
            return Err(ConfigError::RetryBudgetTooSmall {
                max_retries: self.max_retries,
                needed,
            });
        }
        if !(self.capacity_ceiling > 0.0 && self.capacity_ceiling <= 1.0) {
            return Err(ConfigError::CapacityCeiling(self.capacity_ceiling));
        }
        if self.refresh_hz <= 0.0 {
            return Err(ConfigError::RefreshRate(self.refresh_hz));
        }
        Ok(())
    }
}

impl Default for AssignConfig {
    fn default() -> Self {
        Self::mobile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_consistent() {
        assert_eq!(AssignConfig::mobile().validate(), Ok(()));
        assert_eq!(AssignConfig::conservative().validate(), Ok(()));
    }

    #[test]
    fn retry_budget_must_cover_device_layers() {
        let cfg = AssignConfig {
            max_retries: 24,
            ..AssignConfig::mobile()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::RetryBudgetTooSmall {
                max_retries: 24,
                needed: 25,
            })
        );
        let no_secondary = AssignConfig {
            secondary_enabled: false,
            ..cfg
        };
        assert_eq!(no_secondary.validate(), Ok(()), "13 iterations suffice");
    }

    #[test]
    fn ceiling_out_of_range() {
        let cfg = AssignConfig {
            capacity_ceiling: 1.5,
            ..AssignConfig::mobile()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::CapacityCeiling(_))));
    }
}
