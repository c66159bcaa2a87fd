// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The engine pool shared by every display of a device.
//!
//! There is exactly one [`ResourcePool`] per device. It is owned by the
//! runtime root and passed by reference into each assignment pass; the
//! caller serializes access (see `tessera_runtime::Device`).
//!
//! Capacity is accounted per [`PhysicalType`]: logical instances that share
//! a physical unit (a blitter serving both as scaler and as composer) draw
//! from one budget.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::display::DisplayId;
use crate::engine::{Assignment, Engine, EngineDesc, EngineId, EngineKind};
use crate::error::PoolError;
use crate::format::ImageDesc;
use crate::reason::RejectReason;
use crate::restriction::{PhysicalType, RestrictionCatalog};

/// A request by one display for an engine type another display holds.
///
/// Claims on M2M types come from a higher-priority display and are honored
/// by lower-priority holders. Claims on channel types come from a display
/// left without a channel for its client target and are honored by every
/// holder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Claim {
    /// Contested type.
    pub physical: PhysicalType,
    /// Display that wants it.
    pub display: DisplayId,
    /// That display's priority.
    pub priority: u8,
}

/// Owns every engine instance and its per-frame state.
#[derive(Debug)]
pub struct ResourcePool {
    engines: Vec<Engine>,
    catalog: Arc<RestrictionCatalog>,
    ceiling: f32,
    claims: Vec<Claim>,
    mutations: u64,
}

impl ResourcePool {
    /// Creates an empty pool.
    ///
    /// `ceiling` scales every type's modeled capacity (see
    /// [`AssignConfig::capacity_ceiling`](crate::config::AssignConfig)).
    #[must_use]
    pub fn new(catalog: Arc<RestrictionCatalog>, ceiling: f32) -> Self {
        Self {
            engines: Vec::new(),
            catalog,
            ceiling,
            claims: Vec::new(),
            mutations: 0,
        }
    }

    /// Creates a pool holding one engine per entry of `layout`.
    #[must_use]
    pub fn with_layout(
        catalog: Arc<RestrictionCatalog>,
        ceiling: f32,
        layout: &[EngineDesc],
    ) -> Self {
        let mut pool = Self::new(catalog, ceiling);
        for desc in layout {
            pool.add_engine(*desc);
        }
        pool
    }

    /// Most engines a pool can hold; the reallocation gate tracks engines
    /// in a 64-bit mask.
    pub const MAX_ENGINES: usize = 64;

    /// Adds an engine and returns its id.
    ///
    /// # Panics
    ///
    /// Panics if the pool already holds [`MAX_ENGINES`](Self::MAX_ENGINES)
    /// engines.
    pub fn add_engine(&mut self, desc: EngineDesc) -> EngineId {
        assert!(
            self.engines.len() < Self::MAX_ENGINES,
            "a pool holds at most {} engines",
            Self::MAX_ENGINES
        );
        #[expect(
            clippy::cast_possible_truncation,
            reason = "bounded by the assert above"
        )]
        let id = EngineId(self.engines.len() as u16);
        self.engines.push(Engine::new(id, desc));
        id
    }

    /// The restriction catalog used for feasibility checks.
    #[must_use]
    pub fn catalog(&self) -> &RestrictionCatalog {
        &self.catalog
    }

    /// All engines, in id order.
    #[must_use]
    pub fn engines(&self) -> &[Engine] {
        &self.engines
    }

    /// Looks up an engine.
    #[must_use]
    pub fn engine(&self, id: EngineId) -> Option<&Engine> {
        self.engines.get(usize::from(id.0))
    }

    fn engine_mut(&mut self, id: EngineId) -> Result<&mut Engine, PoolError> {
        self.engines
            .get_mut(usize::from(id.0))
            .ok_or(PoolError::UnknownEngine(id))
    }

    /// Count of mutating calls that changed state. Used to verify that a
    /// skipped pass leaves the pool alone.
    #[must_use]
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    // -- Reservations --

    /// Pre-binds an engine to a display. Reserved engines survive resets
    /// and are only assignable by their owner.
    pub fn reserve(&mut self, id: EngineId, display: DisplayId) -> Result<(), PoolError> {
        let engine = self.engine_mut(id)?;
        match engine.reserved_for {
            Some(d) if d != display => return Err(PoolError::ReservedElsewhere(id)),
            Some(_) => return Ok(()),
            None => {}
        }
        if engine.owner.is_some_and(|(d, _)| d != display) {
            return Err(PoolError::Busy(id));
        }
        engine.reserved_for = Some(display);
        self.mutations += 1;
        Ok(())
    }

    /// Drops a reservation.
    pub fn unreserve(&mut self, id: EngineId) -> Result<(), PoolError> {
        let engine = self.engine_mut(id)?;
        if engine.reserved_for.take().is_some() {
            self.mutations += 1;
        }
        Ok(())
    }

    // -- Assignment --

    /// Clears the engine's work for this frame. Its reservation stays.
    pub fn release(&mut self, id: EngineId) -> Result<(), PoolError> {
        let engine = self.engine_mut(id)?;
        if engine.owner.is_some() {
            engine.owner = None;
            engine.running = false;
            engine.work.clear();
            engine.used_capacity = 0.0;
            self.mutations += 1;
        }
        Ok(())
    }

    /// Releases every engine holding work for `display`. Returns how many
    /// were released.
    pub fn release_display(&mut self, display: DisplayId) -> usize {
        let mut released = 0;
        for engine in &mut self.engines {
            if engine.owner.is_some_and(|(d, _)| d == display) {
                engine.owner = None;
                engine.running = false;
                engine.work.clear();
                engine.used_capacity = 0.0;
                released += 1;
            }
        }
        if released > 0 {
            self.mutations += 1;
        }
        released
    }

    /// Releases the work of one source on one engine, leaving its other
    /// sources in place.
    pub fn release_source(
        &mut self,
        id: EngineId,
        source: crate::engine::Source,
    ) -> Result<(), PoolError> {
        let engine = self.engine_mut(id)?;
        let before = engine.work.len();
        engine.work.retain(|a| a.source != source);
        if engine.work.len() != before {
            engine.used_capacity = engine.work.iter().map(|a| a.capacity).sum();
            if engine.work.is_empty() {
                engine.owner = None;
                engine.running = false;
            }
            self.mutations += 1;
        }
        Ok(())
    }

    /// Records work on an engine for `display`.
    ///
    /// Only the assignment pass calls this, after
    /// [`check_assignable`](Self::check_assignable) succeeded.
    pub fn assign(
        &mut self,
        id: EngineId,
        display: DisplayId,
        priority: u8,
        assignment: Assignment,
    ) -> Result<(), PoolError> {
        let engine = self.engine_mut(id)?;
        if engine.reserved_for.is_some_and(|r| r != display) {
            return Err(PoolError::ReservedElsewhere(id));
        }
        if !engine.available_to(display) {
            return Err(PoolError::Busy(id));
        }
        engine.owner = Some((display, priority));
        engine.used_capacity += assignment.capacity;
        engine.work.push(assignment);
        self.mutations += 1;
        Ok(())
    }

    /// Marks every engine held by `display` as handed to hardware.
    pub fn mark_running(&mut self, display: DisplayId) {
        let mut changed = false;
        for engine in &mut self.engines {
            if engine.owner.is_some_and(|(d, _)| d == display) && !engine.running {
                engine.running = true;
                changed = true;
            }
        }
        if changed {
            self.mutations += 1;
        }
    }

    // -- Capacity --

    /// Capacity consumed by all instances of `physical`.
    #[must_use]
    pub fn capacity_used(&self, physical: PhysicalType) -> f32 {
        self.engines
            .iter()
            .filter(|e| e.desc.physical == physical)
            .map(|e| e.used_capacity)
            .sum()
    }

    /// Capacity `physical` may use in total.
    #[must_use]
    pub fn capacity_limit(&self, physical: PhysicalType) -> f32 {
        self.catalog
            .get(physical)
            .and_then(|e| e.capacity)
            .map_or(f32::INFINITY, |m| m.max_capacity * self.ceiling)
    }

    /// Checks geometric feasibility and remaining capacity for placing the
    /// hop `src -> dst` on `id` for `display`.
    ///
    /// Returns the capacity the hop would consume.
    pub fn check_assignable(
        &self,
        id: EngineId,
        display: DisplayId,
        src: &ImageDesc,
        dst: &ImageDesc,
        refresh_hz: f32,
    ) -> Result<f32, RejectReason> {
        let engine = self.engine(id).ok_or(RejectReason::INSUFFICIENT_ENGINE)?;
        if !engine.available_to(display) {
            return Err(RejectReason::INSUFFICIENT_ENGINE);
        }
        let entry = self
            .catalog
            .get(engine.desc.physical)
            .ok_or(RejectReason::INSUFFICIENT_ENGINE)?;
        let reasons = entry.check(src, dst);
        if !reasons.is_empty() {
            return Err(reasons);
        }
        if engine.kind() == EngineKind::Otf {
            return Ok(0.0);
        }
        if engine.work.len() >= entry.max_sources as usize {
            return Err(RejectReason::INSUFFICIENT_CAPACITY);
        }
        let required = entry
            .capacity
            .map_or(0.0, |m| m.required(src, dst, refresh_hz));
        if self.capacity_used(engine.desc.physical) + required
            > self.capacity_limit(engine.desc.physical)
        {
            return Err(RejectReason::INSUFFICIENT_CAPACITY);
        }
        Ok(required)
    }

    /// Boolean form of [`check_assignable`](Self::check_assignable).
    #[must_use]
    pub fn is_assignable(
        &self,
        id: EngineId,
        display: DisplayId,
        src: &ImageDesc,
        dst: &ImageDesc,
        refresh_hz: f32,
    ) -> bool {
        self.check_assignable(id, display, src, dst, refresh_hz)
            .is_ok()
    }

    // -- Priority claims --

    /// Records that `display` wanted `physical` but found it held by a
    /// lower-priority display.
    pub fn post_claim(&mut self, claim: Claim) {
        if !self.claims.contains(&claim) {
            self.claims.push(claim);
            self.mutations += 1;
        }
    }

    /// Drops every claim made by `display`.
    pub fn clear_claims(&mut self, display: DisplayId) {
        let before = self.claims.len();
        self.claims.retain(|c| c.display != display);
        if self.claims.len() != before {
            self.mutations += 1;
        }
    }

    /// Outstanding claims.
    #[must_use]
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// Whether a display with higher priority than `priority` is waiting
    /// for `physical`.
    #[must_use]
    pub fn has_claim_above(&self, physical: PhysicalType, priority: u8) -> bool {
        self.claims
            .iter()
            .any(|c| c.physical == physical && c.priority > priority)
    }

    /// Number of displays other than `display` waiting for a channel.
    #[must_use]
    pub fn channel_claims(&self, display: DisplayId) -> usize {
        let waiting = |c: &Claim| c.physical.is_otf() && c.display != display;
        self.claims
            .iter()
            .enumerate()
            .filter(|&(i, c)| {
                waiting(c)
                    && !self.claims[..i]
                        .iter()
                        .any(|p| waiting(p) && p.display == c.display)
            })
            .count()
    }

    /// Channels neither held this frame nor reserved.
    #[must_use]
    pub fn free_channels(&self) -> usize {
        self.engines
            .iter()
            .filter(|e| {
                e.kind() == EngineKind::Otf && e.owner.is_none() && e.reserved_for.is_none()
            })
            .count()
    }

    /// Priority of the display holding the engine, if any.
    #[must_use]
    pub(crate) fn owner_priority(&self, id: EngineId) -> Option<u8> {
        self.engine(id).and_then(|e| e.owner.map(|(_, p)| p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineState, Source};
    use crate::format::PixelFormat;
    use crate::layer::LayerId;

    fn pool() -> ResourcePool {
        ResourcePool::with_layout(
            Arc::new(RestrictionCatalog::builtin()),
            1.0,
            &EngineDesc::mobile_layout(),
        )
    }

    fn work(display: DisplayId, w: u32, h: u32, capacity: f32) -> Assignment {
        work_for(display, 0, w, h, capacity)
    }

    fn work_for(display: DisplayId, layer: u32, w: u32, h: u32, capacity: f32) -> Assignment {
        Assignment {
            source: Source::Layer {
                display,
                layer: LayerId {
                    idx: layer,
                    generation: 0,
                },
            },
            src: ImageDesc::plain(PixelFormat::Rgba8888, w, h),
            dst: ImageDesc::plain(PixelFormat::Rgba8888, w, h),
            capacity,
        }
    }

    #[test]
    fn reserve_is_exclusive() {
        let mut pool = pool();
        let id = EngineId(0);
        pool.reserve(id, DisplayId(0)).unwrap();
        assert_eq!(pool.engine(id).unwrap().state(), EngineState::Reserved);
        assert_eq!(
            pool.reserve(id, DisplayId(1)),
            Err(PoolError::ReservedElsewhere(id))
        );
        let a = work(DisplayId(1), 64, 64, 0.0);
        assert_eq!(
            pool.assign(id, DisplayId(1), 1, a),
            Err(PoolError::ReservedElsewhere(id))
        );
    }

    #[test]
    fn release_keeps_reservation() {
        let mut pool = pool();
        let id = EngineId(0);
        pool.reserve(id, DisplayId(0)).unwrap();
        pool.assign(id, DisplayId(0), 2, work(DisplayId(0), 64, 64, 0.0))
            .unwrap();
        assert_eq!(pool.engine(id).unwrap().state(), EngineState::Assigned);
        pool.release(id).unwrap();
        assert_eq!(pool.engine(id).unwrap().state(), EngineState::Reserved);
        assert_eq!(pool.release_display(DisplayId(0)), 0, "nothing held");
    }

    #[test]
    fn channel_takes_a_single_source() {
        let mut pool = pool();
        let id = EngineId(0);
        pool.assign(id, DisplayId(0), 2, work(DisplayId(0), 64, 64, 0.0))
            .unwrap();
        assert_eq!(
            pool.assign(id, DisplayId(0), 2, work(DisplayId(0), 64, 64, 0.0)),
            Err(PoolError::Busy(id))
        );
        let src = ImageDesc::plain(PixelFormat::Rgba8888, 64, 64);
        assert_eq!(
            pool.check_assignable(id, DisplayId(0), &src, &src, 60.0),
            Err(RejectReason::INSUFFICIENT_ENGINE)
        );
    }

    #[test]
    fn capacity_is_shared_across_instances_of_a_type() {
        let mut pool = pool();
        // Engines 7 and 8 are both G2D.
        pool.assign(EngineId(7), DisplayId(0), 2, work(DisplayId(0), 64, 64, 0.4))
            .unwrap();
        pool.assign(EngineId(8), DisplayId(0), 2, work(DisplayId(0), 64, 64, 0.3))
            .unwrap();
        assert!((pool.capacity_used(PhysicalType::G2d) - 0.7).abs() < 1e-6);
        assert!(pool.capacity_used(PhysicalType::Msc).abs() < 1e-6);
    }

    #[test]
    fn check_rejects_over_ceiling() {
        let mut pool = ResourcePool::with_layout(
            Arc::new(RestrictionCatalog::builtin()),
            0.2,
            &EngineDesc::mobile_layout(),
        );
        let msc = EngineId(6);
        let src = ImageDesc::plain(PixelFormat::Rgba8888, 1920, 1080);
        let need = pool
            .check_assignable(msc, DisplayId(0), &src, &src, 60.0)
            .unwrap();
        pool.assign(
            msc,
            DisplayId(0),
            2,
            Assignment {
                capacity: need,
                ..work(DisplayId(0), 1920, 1080, 0.0)
            },
        )
        .unwrap();
        // A second 1080p pass (about 0.1 each) exceeds the 0.2 ceiling.
        assert_eq!(
            pool.check_assignable(msc, DisplayId(0), &src, &src, 60.0),
            Err(RejectReason::INSUFFICIENT_CAPACITY)
        );
        assert!(pool.capacity_used(PhysicalType::Msc) <= pool.capacity_limit(PhysicalType::Msc));
    }

    #[test]
    fn m2m_is_not_shared_across_displays() {
        let mut pool = pool();
        let msc = EngineId(6);
        pool.assign(msc, DisplayId(0), 2, work(DisplayId(0), 64, 64, 0.01))
            .unwrap();
        let src = ImageDesc::plain(PixelFormat::Rgba8888, 64, 64);
        assert!(!pool.is_assignable(msc, DisplayId(1), &src, &src, 60.0));
        assert!(pool.is_assignable(msc, DisplayId(0), &src, &src, 60.0));
    }

    #[test]
    fn release_source_recomputes_capacity() {
        let mut pool = pool();
        let msc = EngineId(6);
        let a = work_for(DisplayId(0), 0, 64, 64, 0.2);
        let b = work_for(DisplayId(0), 1, 64, 64, 0.1);
        pool.assign(msc, DisplayId(0), 2, a).unwrap();
        pool.assign(msc, DisplayId(0), 2, b).unwrap();
        pool.release_source(msc, a.source).unwrap();
        assert!((pool.capacity_used(PhysicalType::Msc) - 0.1).abs() < 1e-6);
        pool.release_source(msc, b.source).unwrap();
        assert_eq!(pool.engine(msc).unwrap().state(), EngineState::Free);
    }

    #[test]
    fn claims_are_deduplicated_and_cleared() {
        let mut pool = pool();
        let claim = Claim {
            physical: PhysicalType::Msc,
            display: DisplayId(0),
            priority: 2,
        };
        pool.post_claim(claim);
        pool.post_claim(claim);
        assert_eq!(pool.claims().len(), 1);
        assert!(pool.has_claim_above(PhysicalType::Msc, 1));
        assert!(!pool.has_claim_above(PhysicalType::Msc, 2));
        pool.clear_claims(DisplayId(0));
        assert!(pool.claims().is_empty());
    }

    #[test]
    fn channel_claims_count_each_waiting_display_once() {
        let mut pool = pool();
        assert_eq!(pool.free_channels(), 6);
        pool.reserve(EngineId(5), DisplayId(0)).unwrap();
        pool.assign(EngineId(0), DisplayId(0), 2, work(DisplayId(0), 64, 64, 0.0))
            .unwrap();
        assert_eq!(pool.free_channels(), 4, "held and reserved channels are not free");

        for physical in [PhysicalType::DppG, PhysicalType::DppVg, PhysicalType::Msc] {
            pool.post_claim(Claim {
                physical,
                display: DisplayId(1),
                priority: 1,
            });
        }
        assert_eq!(pool.channel_claims(DisplayId(0)), 1);
        assert_eq!(pool.channel_claims(DisplayId(1)), 0, "own claims do not count");
        pool.clear_claims(DisplayId(1));
        assert_eq!(pool.channel_claims(DisplayId(0)), 0);
    }

    #[test]
    fn no_op_calls_do_not_count_as_mutations() {
        let mut pool = pool();
        let before = pool.mutation_count();
        pool.release(EngineId(0)).unwrap();
        pool.release_display(DisplayId(0));
        pool.clear_claims(DisplayId(0));
        pool.mark_running(DisplayId(0));
        assert_eq!(pool.mutation_count(), before);
    }

    #[test]
    #[should_panic(expected = "at most 64 engines")]
    fn pool_holds_what_the_gate_can_track() {
        let mut pool = ResourcePool::new(Arc::new(RestrictionCatalog::builtin()), 1.0);
        for _ in 0..=ResourcePool::MAX_ENGINES {
            pool.add_engine(EngineDesc::channel(PhysicalType::DppG));
        }
    }
}
