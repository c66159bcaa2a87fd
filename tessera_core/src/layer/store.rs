// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays layer storage with allocation, z-order, and property
//! management.

use alloc::vec::Vec;

use kurbo::Rect;
use understory_dirty::{CycleHandling, DirtyTracker};

use super::id::LayerId;
use super::props::{
    BufferDesc, LayerContent, LayerOutcome, LayerProps, OverlayPriority, RequestedComposition,
};
use crate::classify::Capability;
use crate::dirty::{self, GeometryChange};
use crate::format::{BlendMode, HdrKind, Transform};

/// Struct-of-arrays storage for the layers of one display.
///
/// Layers are addressed by [`LayerId`] handles. Internally, each layer occupies
/// a slot in parallel arrays. Destroyed layers are recycled via a free list,
/// and generation counters prevent stale handle access. A separate z-order
/// list holds live slots bottom to top.
#[derive(Debug)]
pub struct LayerStore {
    // -- Caller-set properties --
    pub(crate) props: Vec<LayerProps>,
    pub(crate) damage: Vec<Vec<Rect>>,
    pub(crate) rate: Vec<RateTracker>,

    // -- Owned by the assignment pass --
    pub(crate) outcome: Vec<LayerOutcome>,
    pub(crate) capability: Vec<Option<Capability>>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,

    // -- Ordering --
    pub(crate) order: Vec<u32>,

    // -- Dirty tracking --
    pub(crate) dirty: DirtyTracker<u32>,
    pub(crate) geometry: GeometryChange,
    /// Rates below this count as slow; 0 until the first pass sets it.
    pub(crate) low_fps_threshold: u32,

    // -- Lifecycle tracking --
    pub(crate) pending_added: Vec<u32>,
    pub(crate) pending_removed: Vec<u32>,
}

impl Default for LayerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerStore {
    /// Creates an empty layer store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            props: Vec::new(),
            damage: Vec::new(),
            rate: Vec::new(),
            outcome: Vec::new(),
            capability: Vec::new(),
            generation: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            order: Vec::new(),
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            geometry: GeometryChange::empty(),
            low_fps_threshold: 0,
            pending_added: Vec::new(),
            pending_removed: Vec::new(),
        }
    }

    // -- Allocation API --

    /// Creates a new layer on top of the z-order and returns its handle.
    ///
    /// The layer starts with no content, an empty frame, and default
    /// attributes.
    pub fn create_layer(&mut self) -> LayerId {
        let idx = if let Some(idx) = self.free_list.pop() {
            // Reuse a freed slot.
            self.generation[idx as usize] += 1;
            self.props[idx as usize] = LayerProps::default();
            self.damage[idx as usize].clear();
            self.rate[idx as usize] = RateTracker::default();
            self.outcome[idx as usize] = LayerOutcome::default();
            self.capability[idx as usize] = None;
            idx
        } else {
            // Allocate a new slot.
            let idx = self.len;
            self.len += 1;
            self.props.push(LayerProps::default());
            self.damage.push(Vec::new());
            self.rate.push(RateTracker::default());
            self.outcome.push(LayerOutcome::default());
            self.capability.push(None);
            self.generation.push(0);
            idx
        };

        self.order.push(idx);
        self.pending_added.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);
        self.mark_geometry(idx, GeometryChange::LAYER_ADDED);

        LayerId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Destroys a layer, freeing its slot for reuse.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn destroy_layer(&mut self, id: LayerId) {
        self.validate(id);
        let idx = id.idx;

        self.order.retain(|&i| i != idx);
        self.dirty.remove_key(idx);

        // Bump generation so old handles immediately fail validation.
        self.generation[idx as usize] += 1;
        self.capability[idx as usize] = None;

        self.free_list.push(idx);
        self.pending_added.retain(|&i| i != idx);
        self.pending_removed.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);
        self.geometry |= GeometryChange::LAYER_REMOVED;
    }

    /// Returns whether the given handle refers to a live layer.
    #[must_use]
    pub fn is_alive(&self, id: LayerId) -> bool {
        (id.idx < self.len)
            && self.generation[id.idx as usize] == id.generation
            && !self.free_list.contains(&id.idx)
    }

    /// Number of live layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the store holds no live layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    // -- Z-order API --

    /// Live slot indices, bottom to top.
    #[must_use]
    pub fn z_order(&self) -> &[u32] {
        &self.order
    }

    /// Live handles, bottom to top.
    #[must_use]
    pub fn ids(&self) -> Vec<LayerId> {
        self.order.iter().map(|&idx| self.id_at(idx)).collect()
    }

    /// Position of a layer in the z-order (0 is the bottom).
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    #[must_use]
    pub fn z_of(&self, id: LayerId) -> usize {
        self.validate(id);
        self.order
            .iter()
            .position(|&i| i == id.idx)
            .unwrap_or(self.order.len())
    }

    /// Moves a layer to position `z` (clamped to the top).
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn set_z_order(&mut self, id: LayerId, z: usize) {
        let from = self.z_of(id);
        let to = z.min(self.order.len() - 1);
        if from == to {
            return;
        }
        let idx = self.order.remove(from);
        self.order.insert(to, idx);
        self.dirty.mark(id.idx, dirty::TOPOLOGY);
        self.mark_geometry(id.idx, GeometryChange::ZORDER);
    }

    // -- Property getters (read-only, no dirty marking) --

    /// Returns the attributes of a layer.
    #[must_use]
    pub fn props(&self, id: LayerId) -> &LayerProps {
        self.validate(id);
        &self.props[id.idx as usize]
    }

    /// Returns the damage set for the current frame.
    #[must_use]
    pub fn damage(&self, id: LayerId) -> &[Rect] {
        self.validate(id);
        &self.damage[id.idx as usize]
    }

    /// Returns what the last pass decided for a layer.
    #[must_use]
    pub fn outcome(&self, id: LayerId) -> &LayerOutcome {
        self.validate(id);
        &self.outcome[id.idx as usize]
    }

    /// Returns the cached classification, if the layer has been classified
    /// since its last geometry change.
    #[must_use]
    pub fn capability(&self, id: LayerId) -> Option<&Capability> {
        self.validate(id);
        self.capability[id.idx as usize].as_ref()
    }

    /// Geometry changes accumulated since the last
    /// [`take_changes`](Self::take_changes).
    #[must_use]
    pub fn geometry(&self) -> GeometryChange {
        self.geometry
    }

    // -- Mutation API (auto-marks dirty) --

    /// Attaches a buffer.
    ///
    /// Always marks CONTENT. A different format, size, compression, or
    /// protection also marks GEOMETRY.
    pub fn set_buffer(&mut self, id: LayerId, buffer: BufferDesc) {
        self.validate(id);
        let idx = id.idx;
        let old = self.props[idx as usize].content;
        self.props[idx as usize].content = LayerContent::Buffer(buffer);
        let mut bits = GeometryChange::empty();
        match old {
            LayerContent::Buffer(prev) => {
                if prev.protected != buffer.protected {
                    bits |= GeometryChange::DRM;
                }
                if prev.format != buffer.format
                    || prev.compression != buffer.compression
                    || (prev.width, prev.height) != (buffer.width, buffer.height)
                {
                    bits |= GeometryChange::FORMAT;
                }
            }
            _ => bits |= GeometryChange::FORMAT,
        }
        if !bits.is_empty() {
            self.mark_geometry(idx, bits);
        }
        self.dirty.mark(idx, dirty::CONTENT);
    }

    /// Shows a solid ARGB color instead of a buffer.
    pub fn set_solid_color(&mut self, id: LayerId, argb: u32) {
        self.validate(id);
        let idx = id.idx;
        let old = self.props[idx as usize].content;
        if old == LayerContent::SolidColor(argb) {
            return;
        }
        self.props[idx as usize].content = LayerContent::SolidColor(argb);
        if !matches!(old, LayerContent::SolidColor(_)) {
            self.mark_geometry(idx, GeometryChange::FORMAT);
        }
        self.dirty.mark(idx, dirty::CONTENT);
    }

    /// Sets the source crop.
    pub fn set_source_crop(&mut self, id: LayerId, crop: Rect) {
        self.validate(id);
        if self.props[id.idx as usize].source_crop != crop {
            self.props[id.idx as usize].source_crop = crop;
            self.mark_geometry(id.idx, GeometryChange::SOURCE_CROP);
        }
    }

    /// Sets the destination rectangle.
    pub fn set_display_frame(&mut self, id: LayerId, frame: Rect) {
        self.validate(id);
        if self.props[id.idx as usize].display_frame != frame {
            self.props[id.idx as usize].display_frame = frame;
            self.mark_geometry(id.idx, GeometryChange::DISPLAY_FRAME);
        }
    }

    /// Sets the orientation.
    pub fn set_transform(&mut self, id: LayerId, transform: Transform) {
        self.validate(id);
        if self.props[id.idx as usize].transform != transform {
            self.props[id.idx as usize].transform = transform;
            self.mark_geometry(id.idx, GeometryChange::TRANSFORM);
        }
    }

    /// Sets the blend mode.
    pub fn set_blend_mode(&mut self, id: LayerId, blend: BlendMode) {
        self.validate(id);
        if self.props[id.idx as usize].blend != blend {
            self.props[id.idx as usize].blend = blend;
            self.mark_geometry(id.idx, GeometryChange::BLEND);
        }
    }

    /// Sets the plane alpha, clamped to `[0, 1]`.
    pub fn set_plane_alpha(&mut self, id: LayerId, alpha: f32) {
        self.validate(id);
        let alpha = alpha.clamp(0.0, 1.0);
        if self.props[id.idx as usize].plane_alpha != alpha {
            self.props[id.idx as usize].plane_alpha = alpha;
            self.mark_geometry(id.idx, GeometryChange::BLEND);
        }
    }

    /// Sets the HDR signalling of the content.
    pub fn set_hdr(&mut self, id: LayerId, hdr: HdrKind) {
        self.validate(id);
        if self.props[id.idx as usize].hdr != hdr {
            self.props[id.idx as usize].hdr = hdr;
            self.mark_geometry(id.idx, GeometryChange::HDR);
        }
    }

    /// Sets the compositor-requested composition type.
    pub fn set_composition_type(&mut self, id: LayerId, requested: RequestedComposition) {
        self.validate(id);
        if self.props[id.idx as usize].requested != requested {
            self.props[id.idx as usize].requested = requested;
            self.mark_geometry(id.idx, GeometryChange::COMPOSITION_TYPE);
        }
    }

    /// Sets the overlay priority hint.
    pub fn set_priority(&mut self, id: LayerId, priority: OverlayPriority) {
        self.validate(id);
        if self.props[id.idx as usize].priority != priority {
            self.props[id.idx as usize].priority = priority;
            self.mark_geometry(id.idx, GeometryChange::PRIORITY);
        }
    }

    /// Records an update rate measured by the caller.
    ///
    /// Only a change across the low-fps threshold forces a new pass.
    pub fn set_frame_rate(&mut self, id: LayerId, fps: u32) {
        self.validate(id);
        self.update_rate(id.idx, fps);
    }

    /// Records that the layer's content was updated at `timestamp_ns` and
    /// refreshes its measured rate from the smoothed update interval.
    ///
    /// Timestamps must come from one monotonic clock. The rate is known
    /// from the second update on.
    pub fn note_update(&mut self, id: LayerId, timestamp_ns: u64) {
        self.validate(id);
        if let Some(fps) = self.rate[id.idx as usize].update(timestamp_ns) {
            self.update_rate(id.idx, fps);
        }
    }

    /// Sets the damaged region for this frame. An empty list means no new
    /// pixels.
    pub fn set_damage(&mut self, id: LayerId, rects: &[Rect]) {
        self.validate(id);
        let damage = &mut self.damage[id.idx as usize];
        damage.clear();
        damage.extend_from_slice(rects);
        if !rects.is_empty() {
            self.dirty.mark(id.idx, dirty::CONTENT);
        }
    }

    // -- Raw-index accessors for the assignment pass --
    //
    // These accept raw slot indices (as found in `z_order()`) rather than
    // `LayerId` handles, skipping generation validation.

    /// Returns the handle for live slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn id_at(&self, idx: u32) -> LayerId {
        assert!(
            idx < self.len,
            "slot index {idx} out of range (len {})",
            self.len
        );
        LayerId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Returns the attributes at raw slot `idx`.
    #[must_use]
    pub fn props_at(&self, idx: u32) -> &LayerProps {
        &self.props[idx as usize]
    }

    /// Returns the outcome at raw slot `idx`.
    #[must_use]
    pub fn outcome_at(&self, idx: u32) -> &LayerOutcome {
        &self.outcome[idx as usize]
    }

    pub(crate) fn capability_at(&self, idx: u32) -> Option<&Capability> {
        self.capability[idx as usize].as_ref()
    }

    pub(crate) fn set_capability_at(&mut self, idx: u32, cap: Capability) {
        self.capability[idx as usize] = Some(cap);
    }

    pub(crate) fn set_outcome_at(&mut self, idx: u32, outcome: LayerOutcome) {
        self.outcome[idx as usize] = outcome;
    }

    /// Moves the low-fps threshold, marking every layer that changes side.
    pub(crate) fn set_low_fps_threshold(&mut self, threshold: u32) {
        let old = core::mem::replace(&mut self.low_fps_threshold, threshold);
        if old == threshold {
            return;
        }
        for i in 0..self.order.len() {
            let idx = self.order[i];
            let fps = self.props[idx as usize].fps;
            if is_slow(fps, old) != is_slow(fps, threshold) {
                self.mark_geometry(idx, GeometryChange::FPS);
            }
        }
    }

    // -- Internal --

    fn update_rate(&mut self, idx: u32, fps: u32) {
        let old = core::mem::replace(&mut self.props[idx as usize].fps, fps);
        if is_slow(old, self.low_fps_threshold) != is_slow(fps, self.low_fps_threshold) {
            self.mark_geometry(idx, GeometryChange::FPS);
        }
    }

    fn mark_geometry(&mut self, idx: u32, bits: GeometryChange) {
        self.geometry |= bits;
        self.dirty.mark(idx, dirty::GEOMETRY);
    }

    /// Validates that a handle is not stale.
    ///
    /// # Panics
    ///
    /// Panics if the handle's generation doesn't match.
    fn validate(&self, id: LayerId) {
        assert!(
            id.idx < self.len && self.generation[id.idx as usize] == id.generation,
            "stale LayerId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }
}

/// Whether a layer updating at `fps` counts as slow; 0 means unknown.
pub(crate) fn is_slow(fps: u32, threshold: u32) -> bool {
    fps > 0 && fps < threshold
}

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Smoothed interval between content updates of one layer.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct RateTracker {
    last: Option<u64>,
    interval: u64,
}

impl RateTracker {
    /// Folds in an update at `now` (nanoseconds) and returns the rate in
    /// frames per second, once two updates have been seen.
    fn update(&mut self, now: u64) -> Option<u32> {
        let prev = self.last.replace(now)?;
        let dt = now.saturating_sub(prev).max(1);
        self.interval = if self.interval == 0 {
            dt
        } else {
            self.interval.saturating_mul(3).saturating_add(dt) / 4
        };
        let fps = (NANOS_PER_SEC + self.interval / 2) / self.interval;
        Some(u32::try_from(fps).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;

    #[test]
    fn create_and_destroy() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        assert!(store.is_alive(id));
        assert_eq!(store.len(), 1);
        store.destroy_layer(id);
        assert!(!store.is_alive(id));
        assert!(store.is_empty());
    }

    #[test]
    fn generation_prevents_stale_access() {
        let mut store = LayerStore::new();
        let id1 = store.create_layer();
        store.destroy_layer(id1);
        let id2 = store.create_layer();
        // id2 reuses the same slot but has a different generation.
        assert!(!store.is_alive(id1));
        assert!(store.is_alive(id2));
        assert_eq!(id1.idx, id2.idx);
        assert_ne!(id1.generation, id2.generation);
    }

    #[test]
    #[should_panic(expected = "stale LayerId")]
    fn stale_handle_panics() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        store.destroy_layer(id);
        let _ = store.props(id);
    }

    #[test]
    fn new_layers_stack_on_top() {
        let mut store = LayerStore::new();
        let a = store.create_layer();
        let b = store.create_layer();
        let c = store.create_layer();
        assert_eq!(store.ids(), [a, b, c]);
        store.set_z_order(c, 0);
        assert_eq!(store.ids(), [c, a, b]);
        store.set_z_order(c, 99);
        assert_eq!(store.ids(), [a, b, c], "clamped to top");
        assert!(store.geometry().contains(GeometryChange::ZORDER));
    }

    #[test]
    fn unchanged_setter_is_not_a_geometry_change() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        store.set_display_frame(id, Rect::new(0.0, 0.0, 100.0, 100.0));
        store.geometry = GeometryChange::empty();

        store.set_display_frame(id, Rect::new(0.0, 0.0, 100.0, 100.0));
        store.set_plane_alpha(id, 1.0);
        store.set_priority(id, OverlayPriority::None);
        assert!(store.geometry().is_empty());

        store.set_plane_alpha(id, 0.5);
        assert_eq!(store.geometry(), GeometryChange::BLEND);
    }

    #[test]
    fn same_buffer_shape_is_content_only() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        let buf = BufferDesc::new(PixelFormat::Rgba8888, 64, 64);
        store.set_buffer(id, buf);
        assert!(store.geometry().contains(GeometryChange::FORMAT));
        store.geometry = GeometryChange::empty();

        store.set_buffer(id, buf);
        assert!(store.geometry().is_empty());

        store.set_buffer(id, buf.protected());
        assert_eq!(store.geometry(), GeometryChange::DRM);
    }

    #[test]
    fn destroy_removes_from_order() {
        let mut store = LayerStore::new();
        let a = store.create_layer();
        let b = store.create_layer();
        store.destroy_layer(a);
        assert_eq!(store.ids(), [b]);
        assert!(store.geometry().contains(GeometryChange::LAYER_REMOVED));
    }

    #[test]
    fn plane_alpha_is_clamped() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        store.set_plane_alpha(id, 3.0);
        assert_eq!(store.props(id).plane_alpha, 1.0);
    }

    #[test]
    fn frame_rate_marks_only_threshold_crossings() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        store.set_low_fps_threshold(5);
        store.geometry = GeometryChange::empty();

        store.set_frame_rate(id, 60);
        store.set_frame_rate(id, 58);
        assert!(store.geometry().is_empty(), "still fast");

        store.set_frame_rate(id, 3);
        assert_eq!(store.geometry(), GeometryChange::FPS);
        store.geometry = GeometryChange::empty();

        store.set_frame_rate(id, 2);
        assert!(store.geometry().is_empty(), "still slow");
        assert_eq!(store.props(id).fps, 2);
    }

    #[test]
    fn rate_is_measured_from_updates() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        store.set_low_fps_threshold(5);
        store.geometry = GeometryChange::empty();

        let frame = NANOS_PER_SEC / 60;
        for i in 0..4 {
            store.note_update(id, i * frame);
        }
        assert_eq!(store.props(id).fps, 60);
        assert!(store.geometry().is_empty());

        // Two updates a second pull the smoothed rate below the threshold.
        let mut t = 3 * frame;
        for _ in 0..8 {
            t += NANOS_PER_SEC / 2;
            store.note_update(id, t);
        }
        assert!(store.props(id).fps < 5);
        assert_eq!(store.geometry(), GeometryChange::FPS);
    }

    #[test]
    fn moving_the_threshold_marks_layers_that_change_side() {
        let mut store = LayerStore::new();
        let slow = store.create_layer();
        let fast = store.create_layer();
        store.set_frame_rate(slow, 8);
        store.set_frame_rate(fast, 30);
        store.set_low_fps_threshold(5);
        let _ = store.take_changes();

        store.set_low_fps_threshold(10);
        assert_eq!(store.geometry(), GeometryChange::FPS);
        let changes = store.take_changes();
        assert!(changes.geometry.contains(&slow.idx));
        assert!(!changes.geometry.contains(&fast.idx));
    }
}
