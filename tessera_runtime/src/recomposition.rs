// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Low-activity detection.
//!
//! [`RecompositionMonitor`] samples how often the device's displays present
//! and flips the device-wide [`RecompositionSwitch`]. Displays pick the
//! mode up at their next validate, which forces a full pass on each. The
//! monitor never touches the resource pool.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tessera_core::display::RecompositionMode;

use crate::config::RecompositionConfig;
use crate::device::DisplayHandle;
use crate::error::FrameError;

const THREAD_NAME: &str = "tessera-recomposition";

const NORMAL: u8 = 0;
const DEVICE_TO_CLIENT: u8 = 1;

/// Device-wide recomposition mode, shared by the monitor and every display.
#[derive(Debug, Default)]
pub struct RecompositionSwitch {
    mode: AtomicU8,
}

impl RecompositionSwitch {
    /// A switch in [`RecompositionMode::Normal`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: AtomicU8::new(NORMAL),
        }
    }

    /// Current mode.
    #[must_use]
    pub fn get(&self) -> RecompositionMode {
        match self.mode.load(Ordering::Acquire) {
            DEVICE_TO_CLIENT => RecompositionMode::DeviceToClient,
            _ => RecompositionMode::Normal,
        }
    }

    /// Sets the mode. Returns whether it changed.
    pub fn set(&self, mode: RecompositionMode) -> bool {
        let raw = match mode {
            RecompositionMode::Normal => NORMAL,
            RecompositionMode::DeviceToClient => DEVICE_TO_CLIENT,
        };
        self.mode.swap(raw, Ordering::AcqRel) != raw
    }
}

/// Next mode given `presents` frames over `elapsed`.
///
/// The busiest display decides: grouping starts when every display is
/// below [`enter_below_fps`](RecompositionConfig::enter_below_fps) and
/// stops once any reaches [`exit_at_fps`](RecompositionConfig::exit_at_fps).
#[must_use]
pub fn next_mode(
    mode: RecompositionMode,
    presents: u64,
    elapsed: Duration,
    config: &RecompositionConfig,
) -> RecompositionMode {
    if elapsed.is_zero() {
        return mode;
    }
    let rate = presents as f64 / elapsed.as_secs_f64();
    match mode {
        RecompositionMode::Normal if rate < f64::from(config.enter_below_fps) => {
            RecompositionMode::DeviceToClient
        }
        RecompositionMode::DeviceToClient if rate >= f64::from(config.exit_at_fps) => {
            RecompositionMode::Normal
        }
        _ => mode,
    }
}

#[derive(Debug, Default)]
struct Stop {
    flag: Mutex<bool>,
    wake: Condvar,
}

/// Thread that polls present counters and drives a [`RecompositionSwitch`].
pub struct RecompositionMonitor {
    stop: Arc<Stop>,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for RecompositionMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecompositionMonitor")
            .field("running", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl RecompositionMonitor {
    /// Starts polling `displays`.
    pub fn spawn(
        displays: Vec<Arc<DisplayHandle>>,
        switch: Arc<RecompositionSwitch>,
        config: RecompositionConfig,
    ) -> Result<Self, FrameError> {
        let stop = Arc::new(Stop::default());
        let worker = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_owned())
            .spawn(move || run(&worker, &displays, &switch, &config))
            .map_err(|source| FrameError::Spawn {
                name: THREAD_NAME,
                source,
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stops polling and joins the thread.
    pub fn shutdown(&mut self) {
        *self.stop.flag.lock() = true;
        self.stop.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{THREAD_NAME} thread panicked");
            }
        }
    }
}

impl Drop for RecompositionMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    stop: &Stop,
    displays: &[Arc<DisplayHandle>],
    switch: &RecompositionSwitch,
    config: &RecompositionConfig,
) {
    log::info!("{THREAD_NAME} started for {} displays", displays.len());
    let mut seen: Vec<u64> = displays.iter().map(|d| d.presents()).collect();
    let mut sampled_at = Instant::now();
    loop {
        {
            let mut flag = stop.flag.lock();
            if !*flag {
                let _ = stop.wake.wait_for(&mut flag, config.poll_interval);
            }
            if *flag {
                break;
            }
        }
        let now = Instant::now();
        let elapsed = now - sampled_at;
        sampled_at = now;

        let mut busiest = 0;
        for (display, seen) in displays.iter().zip(&mut seen) {
            let presents = display.presents();
            busiest = busiest.max(presents.saturating_sub(*seen));
            *seen = presents;
        }
        let current = switch.get();
        let next = next_mode(current, busiest, elapsed, config);
        if switch.set(next) {
            log::info!(
                "recomposition mode {current:?} -> {next:?} ({busiest} presents in {elapsed:?})"
            );
        }
    }
    log::info!("{THREAD_NAME} stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn slow_device_enters_grouping() {
        let config = RecompositionConfig::new();
        assert_eq!(
            next_mode(RecompositionMode::Normal, 2, SECOND, &config),
            RecompositionMode::DeviceToClient
        );
        assert_eq!(
            next_mode(RecompositionMode::Normal, 30, SECOND, &config),
            RecompositionMode::Normal
        );
    }

    #[test]
    fn leaving_grouping_needs_the_higher_rate() {
        let config = RecompositionConfig::new();
        // Between the two thresholds the mode holds either way.
        assert_eq!(
            next_mode(RecompositionMode::DeviceToClient, 7, SECOND, &config),
            RecompositionMode::DeviceToClient
        );
        assert_eq!(
            next_mode(RecompositionMode::Normal, 7, SECOND, &config),
            RecompositionMode::Normal
        );
        assert_eq!(
            next_mode(RecompositionMode::DeviceToClient, 10, SECOND, &config),
            RecompositionMode::Normal
        );
    }

    #[test]
    fn zero_elapsed_keeps_the_mode() {
        let config = RecompositionConfig::new();
        assert_eq!(
            next_mode(RecompositionMode::Normal, 0, Duration::ZERO, &config),
            RecompositionMode::Normal
        );
    }

    #[test]
    fn switch_reports_changes() {
        let switch = RecompositionSwitch::new();
        assert_eq!(switch.get(), RecompositionMode::Normal);
        assert!(switch.set(RecompositionMode::DeviceToClient));
        assert!(!switch.set(RecompositionMode::DeviceToClient));
        assert_eq!(switch.get(), RecompositionMode::DeviceToClient);
    }

    #[test]
    fn idle_displays_flip_the_switch() {
        let switch = Arc::new(RecompositionSwitch::new());
        let config = RecompositionConfig {
            poll_interval: Duration::from_millis(5),
            ..RecompositionConfig::new()
        };
        let mut monitor =
            RecompositionMonitor::spawn(Vec::new(), Arc::clone(&switch), config).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while switch.get() == RecompositionMode::Normal && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        monitor.shutdown();
        assert_eq!(switch.get(), RecompositionMode::DeviceToClient);
    }
}
