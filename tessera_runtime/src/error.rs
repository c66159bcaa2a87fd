// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime error types.

use tessera_core::display::DisplayId;
use tessera_core::error::{AssignError, ConfigError, PoolError};

/// A display-controller or allocator call failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{op} failed with code {code}")]
pub struct DriverError {
    /// Operation that failed.
    pub op: &'static str,
    /// Driver status code.
    pub code: i32,
}

/// Failure of a frame lifecycle call.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// No display with this id was added to the device.
    #[error("unknown display {0:?}")]
    UnknownDisplay(DisplayId),
    /// `present` or `accept_changes` without a validated frame.
    #[error("{0:?} has no validated frame")]
    NotValidated(DisplayId),
    /// `present` before the changed composition types were accepted.
    #[error("{0:?} presented before accepting composition changes")]
    ChangesNotAccepted(DisplayId),
    /// The assignment pass abandoned the frame.
    #[error(transparent)]
    Assign(#[from] AssignError),
    /// The display controller rejected the window array.
    #[error(transparent)]
    Driver(#[from] DriverError),
    /// A reservation was refused.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// The assignment configuration is inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A worker thread could not be started.
    #[error("failed to spawn {name} thread")]
    Spawn {
        /// Thread name.
        name: &'static str,
        /// OS error.
        #[source]
        source: std::io::Error,
    },
}
