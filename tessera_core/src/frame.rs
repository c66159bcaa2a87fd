// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! What an assignment pass hands back to the frame lifecycle.

use alloc::vec::Vec;

use crate::engine::EngineId;
use crate::error::AssignError;
use crate::group::CompositionGroup;
use crate::layer::{Composition, LayerId, RequestedComposition};
use crate::reason::RejectReason;
use crate::window::WindowSlot;

/// Final decision for one layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerDecision {
    /// The layer.
    pub layer: LayerId,
    /// Position in the z-order.
    pub z: u32,
    /// What the caller asked for.
    pub requested: RequestedComposition,
    /// Composition path.
    pub composition: Composition,
    /// Window index for device layers.
    pub window: Option<u8>,
    /// Scan-out channel for device layers.
    pub otf: Option<EngineId>,
    /// M2M hop, if any.
    pub m2m: Option<EngineId>,
    /// Why the layer is not on a hardware path.
    pub reject: RejectReason,
}

impl LayerDecision {
    /// Whether the decided path differs from what was requested.
    #[must_use]
    pub fn type_changed(&self) -> bool {
        !matches!(
            (self.requested, self.composition),
            (RequestedComposition::Client, Composition::Client)
                | (
                    RequestedComposition::Device | RequestedComposition::Cursor,
                    Composition::Device
                )
        )
    }
}

/// Result of one assignment pass for one display.
#[derive(Clone, Debug)]
pub struct FrameResult {
    /// One decision per live layer, bottom to top.
    pub layers: Vec<LayerDecision>,
    /// Client group, with target and skip flag.
    pub client: CompositionGroup,
    /// Secondary group, with target and skip flag.
    pub secondary: CompositionGroup,
    /// Window array for the display controller.
    pub windows: Vec<WindowSlot>,
    /// Some layer ended up on a different path than requested.
    pub types_changed: bool,
    /// Some decision differs from the previous frame.
    pub requests_changed: bool,
    /// The pass fell back to full client composition.
    pub error_case: bool,
    /// What forced the fallback.
    pub fault: Option<AssignError>,
    /// Retry-loop iterations spent.
    pub iterations: u32,
    /// Whether the previous frame's assignment was reused unchanged.
    pub reused: bool,
}

impl FrameResult {
    /// Decision for `layer`, if it was live during the pass.
    #[must_use]
    pub fn decision(&self, layer: LayerId) -> Option<&LayerDecision> {
        self.layers.iter().find(|d| d.layer == layer)
    }

    /// Number of layers on `composition`.
    #[must_use]
    pub fn count(&self, composition: Composition) -> usize {
        self.layers
            .iter()
            .filter(|d| d.composition == composition)
            .count()
    }

    /// Windows that are scanned out.
    pub fn enabled_windows(&self) -> impl Iterator<Item = &WindowSlot> {
        self.windows.iter().filter(|w| w.is_enabled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(requested: RequestedComposition, composition: Composition) -> LayerDecision {
        LayerDecision {
            layer: LayerId {
                idx: 0,
                generation: 0,
            },
            z: 0,
            requested,
            composition,
            window: None,
            otf: None,
            m2m: None,
            reject: RejectReason::empty(),
        }
    }

    #[test]
    fn secondary_counts_as_a_type_change() {
        assert!(!decision(RequestedComposition::Device, Composition::Device).type_changed());
        assert!(!decision(RequestedComposition::Cursor, Composition::Device).type_changed());
        assert!(decision(RequestedComposition::Device, Composition::Client).type_changed());
        assert!(decision(RequestedComposition::Device, Composition::Secondary).type_changed());
        assert!(!decision(RequestedComposition::Client, Composition::Client).type_changed());
    }
}
