// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binding decisions onto hardware windows.
//!
//! The display controller scans out a fixed, ordered array of windows.
//! [`WindowAllocator::allocate`] turns the z-ordered list of OTF-bound
//! sources into that array: one slot per request, ascending window index in
//! z order, engines with a fixed window index placed at it, and unused
//! slots left [`Disabled`](WindowState::Disabled).

use alloc::vec::Vec;

use kurbo::Rect;

use crate::engine::{EngineId, Source};
use crate::error::WindowError;
use crate::format::{BlendMode, ImageDesc, PixelFormat};

/// What a window shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WindowState {
    /// Not scanned out.
    #[default]
    Disabled,
    /// A buffer, read directly or through an M2M hop.
    Buffer,
    /// A solid color, no buffer.
    SolidColor,
    /// A cursor plane.
    Cursor,
}

/// Opaque synchronization handle owned by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FenceHandle(pub u64);

/// One window to bind, in z order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowRequest {
    /// Channel scanning this window out.
    pub engine: EngineId,
    /// Window index the engine is hard-wired to, if any.
    pub pinned: Option<u8>,
    /// What the window shows.
    pub source: Source,
    /// Window state.
    pub state: WindowState,
    /// What the channel reads.
    pub src: ImageDesc,
    /// Where it lands on the display.
    pub dst: Rect,
    /// Blending with windows below.
    pub blend: BlendMode,
    /// Plane alpha.
    pub plane_alpha: f32,
    /// ARGB fill for [`WindowState::SolidColor`].
    pub color: u32,
}

/// One configured hardware window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowSlot {
    /// Position in the window array.
    pub index: u8,
    /// What the window shows.
    pub state: WindowState,
    /// Bound channel.
    pub engine: Option<EngineId>,
    /// Bound source.
    pub source: Option<Source>,
    /// What the channel reads: format, crop, rotation, protection.
    pub src: ImageDesc,
    /// Where it lands on the display.
    pub dst: Rect,
    /// Blending with windows below.
    pub blend: BlendMode,
    /// Plane alpha.
    pub plane_alpha: f32,
    /// ARGB fill for [`WindowState::SolidColor`].
    pub color: u32,
    /// Signalled by the producer when the source is ready.
    pub acquire_fence: Option<FenceHandle>,
    /// Signalled by the controller when the source may be reused.
    pub release_fence: Option<FenceHandle>,
}

impl WindowSlot {
    /// A disabled slot at `index`.
    #[must_use]
    pub fn disabled(index: u8) -> Self {
        Self {
            index,
            state: WindowState::Disabled,
            engine: None,
            source: None,
            src: ImageDesc::plain(PixelFormat::DEFAULT_RGB, 0, 0),
            dst: Rect::ZERO,
            blend: BlendMode::None,
            plane_alpha: 1.0,
            color: 0,
            acquire_fence: None,
            release_fence: None,
        }
    }

    /// Whether the slot is scanned out.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state != WindowState::Disabled
    }

    fn bind(index: u8, req: &WindowRequest) -> Self {
        Self {
            index,
            state: req.state,
            engine: Some(req.engine),
            source: Some(req.source),
            src: req.src,
            dst: req.dst,
            blend: req.blend,
            plane_alpha: req.plane_alpha,
            color: req.color,
            acquire_fence: None,
            release_fence: None,
        }
    }
}

/// Maps z-ordered requests onto the window array.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowAllocator;

impl WindowAllocator {
    /// Builds the window array for `requests`, which must be in z order.
    ///
    /// The result always has `max` entries.
    ///
    /// # Errors
    ///
    /// - [`WindowError::ExceedsMaxWindows`] when there are more requests than
    ///   windows.
    /// - [`WindowError::DuplicateEngine`] when an engine appears twice.
    /// - [`WindowError::PinnedOutOfOrder`] when a fixed window index can not
    ///   be honoured without breaking z order.
    pub fn allocate(requests: &[WindowRequest], max: u8) -> Result<Vec<WindowSlot>, WindowError> {
        if requests.len() > usize::from(max) {
            return Err(WindowError::ExceedsMaxWindows {
                requested: requests.len(),
                max,
            });
        }
        for (i, req) in requests.iter().enumerate() {
            if requests[..i].iter().any(|r| r.engine == req.engine) {
                return Err(WindowError::DuplicateEngine(req.engine));
            }
        }

        let mut slots: Vec<WindowSlot> = (0..max).map(WindowSlot::disabled).collect();
        let mut next = 0_usize;
        for (i, req) in requests.iter().enumerate() {
            let after = requests.len() - i - 1;
            let index = match req.pinned {
                Some(p) => {
                    let p_idx = usize::from(p);
                    if p_idx < next
                        || p_idx >= usize::from(max)
                        || after > usize::from(max) - 1 - p_idx
                    {
                        return Err(WindowError::PinnedOutOfOrder {
                            engine: req.engine,
                            window: p,
                        });
                    }
                    p
                }
                None => u8::try_from(next).map_err(|_| WindowError::ExceedsMaxWindows {
                    requested: requests.len(),
                    max,
                })?,
            };
            slots[usize::from(index)] = WindowSlot::bind(index, req);
            next = usize::from(index) + 1;
        }
        Ok(slots)
    }
}
