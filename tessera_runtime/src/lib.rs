// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Threads, locks, and the frame lifecycle around `tessera_core`.
//!
//! The core crate decides assignments; this crate owns everything that
//! needs an operating system:
//!
//! - [`Device`]: the root object. It owns the [`ResourcePool`] shared by
//!   all displays and puts each display behind its own lock.
//! - [`FrameState`]: `validate` runs the pass, `accept_changes`
//!   acknowledges composition changes, `present` hands the window array to
//!   the [`DisplayController`].
//! - [`FenceGuard`]: closes fences on every path that does not hand them to
//!   the controller.
//! - [`BackgroundReallocator`]: re-provisions M2M destination buffers on
//!   its own thread, gating the affected engines meanwhile.
//! - [`RecompositionMonitor`]: samples present rates and switches slow
//!   layers to client composition when the device goes quiet.
//!
//! [`ResourcePool`]: tessera_core::pool::ResourcePool

mod config;
mod device;
mod driver;
mod error;
mod fence;
mod realloc;
mod recomposition;

pub use config::{ReallocConfig, RecompositionConfig};
pub use device::{Device, DisplayHandle, FrameState};
pub use driver::{DiagnosticHook, DisplayController, DstBufferAllocator, LogHook};
pub use error::{DriverError, FrameError};
pub use fence::FenceGuard;
pub use realloc::BackgroundReallocator;
pub use recomposition::{RecompositionMonitor, RecompositionSwitch, next_mode};
