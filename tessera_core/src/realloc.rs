// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Gate between background buffer reallocation and the assignment pass.
//!
//! The reallocation worker flips the gate to
//! [`Reallocating`](GateState::Reallocating) for a set of M2M engines while
//! their destination buffers are re-provisioned. The assignment pass reads
//! the gate without blocking: a layer that would need a gated engine is
//! sent to client composition with
//! [`PENDING_REALLOCATION`](crate::reason::RejectReason::PENDING_REALLOCATION)
//! for that frame.
//!
//! Every transition bumps an epoch so a display that skipped validation
//! while the gate moved re-runs its pass.

use core::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

use crate::engine::EngineId;

/// Gate state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GateState {
    /// No reallocation in flight.
    Idle,
    /// Destination buffers of the gated engines are being replaced.
    Reallocating,
}

const IDLE: u8 = 0;
const REALLOCATING: u8 = 1;

/// Lock-free reallocation gate shared by the worker and every display.
///
/// Covers every engine of a [`ResourcePool`](crate::pool::ResourcePool),
/// which holds at most 64.
#[derive(Debug)]
pub struct ReallocGate {
    state: AtomicU8,
    engines: AtomicU64,
    epoch: AtomicU32,
}

impl Default for ReallocGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReallocGate {
    /// An idle gate.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            engines: AtomicU64::new(0),
            epoch: AtomicU32::new(0),
        }
    }

    /// Closes the gate for `engines`.
    ///
    /// Returns `false` if a reallocation is already in flight.
    pub fn begin(&self, engines: &[EngineId]) -> bool {
        let mask = engines.iter().fold(0_u64, |m, &e| m | bit(e));
        if self
            .state
            .compare_exchange(IDLE, REALLOCATING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.engines.store(mask, Ordering::Release);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Reopens the gate.
    pub fn finish(&self) {
        self.engines.store(0, Ordering::Release);
        if self
            .state
            .compare_exchange(REALLOCATING, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> GateState {
        match self.state.load(Ordering::Acquire) {
            IDLE => GateState::Idle,
            _ => GateState::Reallocating,
        }
    }

    /// Whether `engine` must not take new work this frame.
    #[must_use]
    pub fn is_reallocating(&self, engine: EngineId) -> bool {
        self.state.load(Ordering::Acquire) == REALLOCATING
            && self.engines.load(Ordering::Acquire) & bit(engine) != 0
    }

    /// Number of transitions so far.
    #[must_use]
    pub fn epoch(&self) -> u32 {
        self.epoch.load(Ordering::Acquire)
    }
}

fn bit(engine: EngineId) -> u64 {
    debug_assert!(
        engine.index() < 64,
        "engine {} is outside the gate mask",
        engine.index()
    );
    1_u64
        .checked_shl(u32::from(engine.index()))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_and_finish() {
        let gate = ReallocGate::new();
        assert_eq!(gate.state(), GateState::Idle);
        assert!(gate.begin(&[EngineId(6), EngineId(7)]));
        assert_eq!(gate.state(), GateState::Reallocating);
        assert!(gate.is_reallocating(EngineId(6)));
        assert!(!gate.is_reallocating(EngineId(0)));
        assert_eq!(gate.epoch(), 1);

        gate.finish();
        assert_eq!(gate.state(), GateState::Idle);
        assert!(!gate.is_reallocating(EngineId(6)));
        assert_eq!(gate.epoch(), 2);
    }

    #[test]
    fn only_one_reallocation_at_a_time() {
        let gate = ReallocGate::new();
        assert!(gate.begin(&[EngineId(6)]));
        assert!(!gate.begin(&[EngineId(7)]));
        assert!(!gate.is_reallocating(EngineId(7)));
    }

    #[test]
    fn finish_when_idle_is_a_no_op() {
        let gate = ReallocGate::new();
        gate.finish();
        assert_eq!(gate.epoch(), 0);
    }

    #[test]
    fn last_pool_index_is_gated() {
        let gate = ReallocGate::new();
        assert!(gate.begin(&[EngineId(63)]));
        assert!(gate.is_reallocating(EngineId(63)));
        assert!(!gate.is_reallocating(EngineId(62)));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "outside the gate mask")]
    fn index_beyond_the_mask_is_rejected() {
        let gate = ReallocGate::new();
        gate.begin(&[EngineId(64)]);
    }
}
