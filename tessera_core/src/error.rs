// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame-level error types.
//!
//! Capability, capacity and policy rejections are not errors; they live in
//! [`RejectReason`](crate::reason::RejectReason). The types here describe
//! what the assignment pass itself could not resolve.

use crate::engine::EngineId;
use crate::group::GroupKind;
use crate::restriction::PhysicalType;

/// Failure of the assignment pass for one frame.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum AssignError {
    /// The retry loop hit its iteration limit without settling.
    #[error("retry loop did not converge after {attempts} attempts")]
    RetryBudgetExhausted {
        /// Iterations run.
        attempts: u32,
    },
    /// Window binding failed.
    #[error(transparent)]
    Window(#[from] WindowError),
    /// No OTF engine can scan out the client target.
    #[error("no engine available for the client composition target")]
    ClientTargetUnavailable,
    /// A bookkeeping invariant does not hold; indicates a bug.
    #[error("invariant violated: {0}")]
    InvariantViolation(#[from] Invariant),
}

impl AssignError {
    /// Whether the frame must be abandoned rather than degraded to client
    /// composition.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

/// Errors from [`WindowAllocator`](crate::window::WindowAllocator).
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    /// Two outputs asked for the same engine.
    #[error("{0:?} bound to more than one window")]
    DuplicateEngine(EngineId),
    /// More outputs than windows.
    #[error("{requested} windows requested, platform has {max}")]
    ExceedsMaxWindows {
        /// Windows needed.
        requested: usize,
        /// Windows available.
        max: u8,
    },
    /// An engine pinned to a channel cannot keep z-order at that channel.
    #[error("{engine:?} is pinned to window {window}, which breaks z-order")]
    PinnedOutOfOrder {
        /// The pinned engine.
        engine: EngineId,
        /// Its fixed window index.
        window: u8,
    },
}

/// A broken bookkeeping invariant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Invariant {
    /// A layer left the pass without a composition decision.
    #[error("layer at z {0} has no composition")]
    Undecided(u32),
    /// A device layer has no scan-out engine.
    #[error("device layer at z {0} has no OTF engine")]
    MissingEngine(u32),
    /// A group range holds a layer of another composition type.
    #[error("{0:?} group range is not contiguous")]
    NonContiguous(GroupKind),
    /// An M2M type is over its modeled capacity.
    #[error("{0:?} over capacity")]
    CapacityExceeded(PhysicalType),
    /// The pool refused an assignment the pass believed valid.
    #[error("pool rejected assignment: {0}")]
    Pool(#[from] PoolError),
}

/// Misuse of [`ResourcePool`](crate::pool::ResourcePool).
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The id does not name an engine in this pool.
    #[error("unknown {0:?}")]
    UnknownEngine(EngineId),
    /// The engine is held by another display or is an occupied OTF engine.
    #[error("{0:?} is busy")]
    Busy(EngineId),
    /// The engine is reserved for another display.
    #[error("{0:?} is reserved for another display")]
    ReservedElsewhere(EngineId),
}

/// Inconsistent [`AssignConfig`](crate::config::AssignConfig).
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The retry budget cannot cover every bidding layer.
    #[error("max_retries {max_retries} is below the {needed} iterations the loop may need")]
    RetryBudgetTooSmall {
        /// Configured budget.
        max_retries: u32,
        /// Minimum safe budget.
        needed: u32,
    },
    /// The capacity ceiling is outside `(0, 1]`.
    #[error("capacity ceiling {0} outside (0, 1]")]
    CapacityCeiling(f32),
    /// The refresh rate is not positive.
    #[error("refresh rate {0} must be positive")]
    RefreshRate(f32),
}
