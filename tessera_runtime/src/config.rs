// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Worker thread settings.

use std::time::Duration;

/// Settings for [`BackgroundReallocator`](crate::BackgroundReallocator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReallocConfig {
    /// How long the worker waits after a request for newer ones before it
    /// starts. Requests arriving in this window replace the pending size.
    pub settle: Duration,
}

impl ReallocConfig {
    /// Waits one 60 Hz frame before reallocating.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            settle: Duration::from_millis(16),
        }
    }

    /// Starts as soon as a request arrives. Used by tests.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
        }
    }
}

impl Default for ReallocConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings for [`RecompositionMonitor`](crate::RecompositionMonitor).
///
/// A display whose present rate stays below `enter_below_fps` for one poll
/// interval switches to
/// [`DeviceToClient`](tessera_core::display::RecompositionMode::DeviceToClient);
/// it switches back once the rate reaches `exit_at_fps`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecompositionConfig {
    /// Sampling period.
    pub poll_interval: Duration,
    /// Present rate below which slow layers are grouped.
    pub enter_below_fps: u32,
    /// Present rate at which grouping stops.
    pub exit_at_fps: u32,
}

impl RecompositionConfig {
    /// Samples every 250 ms; enters below 5 fps, leaves at 10 fps.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            enter_below_fps: 5,
            exit_at_fps: 10,
        }
    }
}

impl Default for RecompositionConfig {
    fn default() -> Self {
        Self::new()
    }
}
