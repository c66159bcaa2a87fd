// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channels and the geometry-change bitmask.
//!
//! Layer setters mark one of the [`understory_dirty`] channels below and,
//! for assignment-relevant changes, OR a cause bit into the store's
//! [`GeometryChange`] set. All channels are local-only: a layer's
//! capabilities depend on nothing but its own attributes.
//!
//! - [`GEOMETRY`] invalidates the layer's cached classification.
//! - [`CONTENT`] records new pixels; it never forces a new pass but clears
//!   the skip flag of the group holding the layer.
//! - [`TOPOLOGY`] is marked on create, destroy, and z-order moves.
//!
//! [`LayerStore::take_changes`](crate::layer::LayerStore::take_changes)
//! drains every channel once per validate.

use understory_dirty::Channel;

/// Assignment-relevant attribute changed; reclassify the layer.
pub const GEOMETRY: Channel = Channel::new(0);

/// New buffer contents or damage.
pub const CONTENT: Channel = Channel::new(1);

/// Layer created, destroyed, or moved in z-order.
pub const TOPOLOGY: Channel = Channel::new(2);

bitflags::bitflags! {
    /// Causes of a required assignment pass.
    ///
    /// An empty set means the previous frame's assignment is still valid.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct GeometryChange: u32 {
        /// A layer was created.
        const LAYER_ADDED = 1 << 0;
        /// A layer was destroyed.
        const LAYER_REMOVED = 1 << 1;
        /// Buffer format, size, or compression changed.
        const FORMAT = 1 << 2;
        /// Source crop changed.
        const SOURCE_CROP = 1 << 3;
        /// Display frame changed.
        const DISPLAY_FRAME = 1 << 4;
        /// Transform changed.
        const TRANSFORM = 1 << 5;
        /// Z-order changed.
        const ZORDER = 1 << 6;
        /// Blend mode or plane alpha changed.
        const BLEND = 1 << 7;
        /// Overlay priority changed.
        const PRIORITY = 1 << 8;
        /// Requested composition type changed.
        const COMPOSITION_TYPE = 1 << 9;
        /// Protected flag changed.
        const DRM = 1 << 10;
        /// HDR signalling changed.
        const HDR = 1 << 11;
        /// Measured layer frame rate crossed a threshold.
        const FPS = 1 << 12;

        /// Panel or render resolution changed.
        const RESOLUTION = 1 << 16;
        /// Color transform support changed.
        const COLOR_TRANSFORM = 1 << 17;
        /// Display power state changed.
        const POWER = 1 << 18;
        /// M2M destination buffers were re-provisioned.
        const REALLOC = 1 << 19;
        /// Caller or mode switch asked for a full pass.
        const FORCE_VALIDATE = 1 << 20;
    }
}
