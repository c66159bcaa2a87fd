// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer data model.
//!
//! A *layer* is one visible surface of a display for the current frame.
//! Each layer has:
//!
//! - An identity ([`LayerId`]), a generational handle that becomes stale when
//!   the layer is destroyed.
//! - A position in the display's z-order (bottom to top).
//! - **Caller-set attributes** ([`LayerProps`]): content, crop, frame,
//!   transform, blending, HDR signalling, requested composition, priority,
//!   and measured frame rate, plus a per-frame damage list.
//! - **Pass-owned state**: the cached classification and the
//!   [`LayerOutcome`] of the last assignment pass.
//!
//! # Dirty tracking
//!
//! Setters compare before writing, so re-setting an unchanged value is
//! free. Real changes mark the GEOMETRY or CONTENT channel (see
//! [`dirty`](crate::dirty)) and accumulate a
//! [`GeometryChange`](crate::dirty::GeometryChange) cause bit.

mod changes;
mod id;
mod props;
mod store;

pub use changes::LayerChanges;
pub use id::LayerId;
pub use props::{
    BufferDesc, Composition, LayerContent, LayerOutcome, LayerProps, OverlayPriority,
    RequestedComposition,
};
pub use store::LayerStore;
pub(crate) use store::is_slow;
