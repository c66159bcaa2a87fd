// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-validate change draining.
//!
//! [`LayerStore::take_changes`] drains every dirty channel once per
//! validate:
//!
//! 1. **GEOMETRY**: drained indices lose their cached classification.
//! 2. **CONTENT**: drained indices are reported so the pass can decide
//!    whether a group's target may be reused.
//! 3. **TOPOLOGY**: drained and discarded; z-order is kept eagerly.
//!
//! [`LayerChanges`] uses raw slot indices (`u32`) rather than
//! [`LayerId`](super::LayerId) handles, matching
//! [`z_order`](LayerStore::z_order).

use alloc::vec::Vec;

use super::store::LayerStore;
use crate::dirty::{self, GeometryChange};

/// The set of changes produced by a single [`LayerStore::take_changes`]
/// call.
#[derive(Clone, Debug, Default)]
pub struct LayerChanges {
    /// Layers whose assignment-relevant attributes changed.
    pub geometry: Vec<u32>,
    /// Layers with new pixels.
    pub content: Vec<u32>,
    /// Layers added since the last drain.
    pub added: Vec<u32>,
    /// Layers removed since the last drain.
    pub removed: Vec<u32>,
    /// Whether layers were added, removed, or reordered.
    pub topology_changed: bool,
    /// Accumulated causes.
    pub bits: GeometryChange,
}

impl LayerChanges {
    /// Clears all change lists.
    pub fn clear(&mut self) {
        self.geometry.clear();
        self.content.clear();
        self.added.clear();
        self.removed.clear();
        self.topology_changed = false;
        self.bits = GeometryChange::empty();
    }

    /// Whether slot `idx` has new pixels this frame.
    #[must_use]
    pub fn has_content(&self, idx: u32) -> bool {
        self.content.contains(&idx) || self.added.contains(&idx)
    }
}

impl LayerStore {
    /// Drains accumulated changes.
    pub fn take_changes(&mut self) -> LayerChanges {
        let mut changes = LayerChanges::default();
        self.take_changes_into(&mut changes);
        changes
    }

    /// Like [`take_changes`](Self::take_changes), but reuses a
    /// caller-provided buffer to avoid allocation.
    pub fn take_changes_into(&mut self, changes: &mut LayerChanges) {
        changes.clear();

        changes.geometry = self
            .dirty
            .drain(dirty::GEOMETRY)
            .deterministic()
            .run()
            .collect();
        for &idx in &changes.geometry {
            self.capability[idx as usize] = None;
        }

        changes.content = self
            .dirty
            .drain(dirty::CONTENT)
            .deterministic()
            .run()
            .collect();

        let topology: Vec<u32> = self
            .dirty
            .drain(dirty::TOPOLOGY)
            .deterministic()
            .run()
            .collect();
        changes.topology_changed = !topology.is_empty();

        changes.added = core::mem::take(&mut self.pending_added);
        changes.removed = core::mem::take(&mut self.pending_removed);
        changes.bits = core::mem::take(&mut self.geometry);
    }
}
