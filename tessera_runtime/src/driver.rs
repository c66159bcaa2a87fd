// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Interfaces to the display controller, the buffer allocator, and the
//! diagnostics path.

use tessera_core::display::{Display, DisplayId};
use tessera_core::engine::EngineId;
use tessera_core::error::AssignError;
use tessera_core::frame::FrameResult;
use tessera_core::window::{FenceHandle, WindowSlot};

use crate::error::DriverError;

/// The display-controller driver.
///
/// Methods take `&self`; implementations serialize internally if the
/// hardware needs it.
pub trait DisplayController: Send + Sync {
    /// Programs the window array for `display`.
    ///
    /// On success the driver owns every acquire fence in `windows` and
    /// returns the fence that signals when the frame has been retired.
    fn commit(&self, display: DisplayId, windows: &[WindowSlot])
    -> Result<FenceHandle, DriverError>;

    /// Closes a fence the driver will never see.
    fn close_fence(&self, fence: FenceHandle);

    /// Captures hardware state after a bug abandoned a frame.
    fn force_panic(&self, display: DisplayId, reason: &str) {
        _ = (display, reason);
    }
}

/// Re-provisions the destination buffers of M2M engines.
pub trait DstBufferAllocator: Send {
    /// Replaces the destination buffers of `engine` with ones sized for a
    /// `width` x `height` output.
    fn realloc(&mut self, engine: EngineId, width: u32, height: u32) -> Result<(), DriverError>;
}

/// Receives frames the pass could not assign normally.
pub trait DiagnosticHook: Send + Sync {
    /// A frame fell back to full client composition.
    fn on_fallback(&self, display: &Display, result: &FrameResult) {
        _ = (display, result);
    }

    /// A frame was abandoned.
    fn on_abandoned(&self, display: &Display, error: &AssignError) {
        _ = (display, error);
    }
}

/// Logs fallbacks and abandoned frames through `log`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogHook;

impl DiagnosticHook for LogHook {
    fn on_fallback(&self, display: &Display, result: &FrameResult) {
        log::warn!(
            "{:?}: frame {} composed entirely by client ({})",
            display.id(),
            display.frame_index(),
            result
                .fault
                .as_ref()
                .map_or_else(|| "no fault recorded".to_owned(), ToString::to_string),
        );
    }

    fn on_abandoned(&self, display: &Display, error: &AssignError) {
        log::error!(
            "{:?}: frame {} abandoned: {error}",
            display.id(),
            display.frame_index()
        );
    }
}
