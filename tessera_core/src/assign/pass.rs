// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One assignment pass over the layers of a display.
//!
//! A [`Pass`] works on a z-ordered snapshot of the layers. Each bidding
//! layer sits on a three-step ladder: it bids for its own window, then
//! (after failing) for the secondary group, then it is pinned to client
//! composition for the rest of the pass. Iterations only ever move layers
//! down the ladder, which bounds the retry loop (see
//! [`AssignConfig::retry_bound`]).

use alloc::vec::Vec;
use core::cmp::Reverse;

use kurbo::Rect;

use super::chain;
use crate::classify::Capability;
use crate::config::AssignConfig;
use crate::display::{Display, DisplayId, DisplayKind, RecompositionMode};
use crate::engine::{Assignment, EngineId, EngineKind, LogicalType, Source};
use crate::error::{AssignError, Invariant, WindowError};
use crate::format::{HdrKind, ImageDesc, PixelFormat};
use crate::group::{CompositionGroup, GroupKind, TargetBuffer};
use crate::layer::{Composition, LayerContent, LayerId, LayerProps, RequestedComposition, is_slow};
use crate::pool::{Claim, ResourcePool};
use crate::realloc::ReallocGate;
use crate::reason::RejectReason;
use crate::restriction::{EngineMask, PhysicalType};
use crate::trace::{DemotionEvent, RetryEvent, Tracer, WindowBoundEvent};
use crate::window::{WindowAllocator, WindowRequest, WindowSlot, WindowState};

/// Slack allowed when re-checking float capacity sums.
const CAPACITY_EPSILON: f32 = 1e-4;

/// Outcome of one retry-loop iteration.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum StepResult {
    /// Nothing moved; the assignment is consistent.
    Stable,
    /// Some layer stepped down the ladder; run again.
    Changed,
    /// The iteration could not complete.
    Failed(AssignError),
}

/// A hardware path found for a layer, not yet committed to the pool.
#[derive(Clone, Copy, Debug)]
pub(super) enum Placement {
    /// A channel reads the layer itself.
    Direct {
        otf: EngineId,
        src: ImageDesc,
        state: WindowState,
    },
    /// A scaler writes `mid`, which a channel reads.
    Chain {
        m2m: EngineId,
        src: ImageDesc,
        mid: ImageDesc,
        otf: EngineId,
        capacity: f32,
    },
}

/// Pass-local state of one layer.
#[derive(Clone, Debug)]
pub(super) struct PassLayer {
    pub(super) slot: u32,
    pub(super) id: LayerId,
    pub(super) props: LayerProps,
    pub(super) cap: Capability,
    /// Client pin; empty while the layer still bids.
    pub(super) sticky: RejectReason,
    /// Failed to get a window and bids for the secondary group only.
    pub(super) wants_secondary: bool,
    pub(super) composition: Option<Composition>,
    pub(super) otf: Option<EngineId>,
    pub(super) m2m: Option<EngineId>,
    /// What the channel reads, or what the composer reads for secondary
    /// layers.
    pub(super) src: Option<ImageDesc>,
    pub(super) state: WindowState,
    pub(super) window: Option<u8>,
    pub(super) reject: RejectReason,
}

impl PassLayer {
    pub(super) fn is_pinned(&self) -> bool {
        !self.sticky.is_empty()
    }

    pub(super) fn source(&self, display: DisplayId) -> Source {
        Source::Layer {
            display,
            layer: self.id,
        }
    }

    /// What an engine reads for this layer.
    pub(super) fn read_image(&self) -> Option<ImageDesc> {
        match self.props.content {
            LayerContent::Buffer(_) => self.props.source_image(),
            LayerContent::SolidColor(_) => {
                let frame = self.props.frame_image();
                Some(ImageDesc::plain(
                    PixelFormat::DEFAULT_RGB,
                    frame.width(),
                    frame.height(),
                ))
            }
            LayerContent::Empty => None,
        }
    }

    fn clear_placement(&mut self) {
        self.composition = self.is_pinned().then_some(Composition::Client);
        self.otf = None;
        self.m2m = None;
        self.src = None;
        self.state = WindowState::Disabled;
        self.window = None;
        self.reject = self.sticky;
    }

    /// Ladder position: 0 bidding, 1 secondary only, 2 pinned.
    fn rung(&self) -> u32 {
        if self.is_pinned() {
            2
        } else if self.wants_secondary {
            1
        } else {
            0
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "layer counts are bounded by u32 slot indices"
)]
pub(super) fn z32(z: usize) -> u32 {
    z as u32
}

fn overlaps(a: Rect, b: Rect) -> bool {
    let i = a.intersect(b);
    i.width() > 0.0 && i.height() > 0.0
}

/// Picks the reason recorded when a layer leaves the device path: the
/// transient causes when there are any, since those may clear next frame.
fn demotion_reason(reasons: RejectReason) -> RejectReason {
    let transient =
        reasons & (RejectReason::CAPACITY | RejectReason::PENDING_REALLOCATION);
    if !transient.is_empty() {
        transient
    } else if !reasons.is_empty() {
        reasons
    } else {
        RejectReason::INSUFFICIENT_ENGINE
    }
}

/// State of one assignment pass.
pub(super) struct Pass<'a> {
    pub(super) cfg: &'a AssignConfig,
    pub(super) display: DisplayId,
    pub(super) kind: DisplayKind,
    pub(super) priority: u8,
    size: (u32, u32),
    render_size: (u32, u32),
    color_transform_supported: bool,
    recomposition: RecompositionMode,
    has_composer: bool,
    pub(super) layers: Vec<PassLayer>,
    pub(super) client: CompositionGroup,
    pub(super) secondary: CompositionGroup,
    pub(super) windows_left: u32,
    /// Channels left free for other displays' client targets.
    spare_channels: usize,
    pub(super) iterations: u32,
}

impl<'a> Pass<'a> {
    pub(super) fn new(
        cfg: &'a AssignConfig,
        display: &Display,
        pool: &ResourcePool,
    ) -> Self {
        let store = &display.layers;
        let layers = store
            .z_order()
            .iter()
            .map(|&slot| PassLayer {
                slot,
                id: store.id_at(slot),
                props: *store.props_at(slot),
                cap: store.capability_at(slot).copied().unwrap_or_default(),
                sticky: RejectReason::empty(),
                wants_secondary: false,
                composition: None,
                otf: None,
                m2m: None,
                src: None,
                state: WindowState::Disabled,
                window: None,
                reject: RejectReason::empty(),
            })
            .collect();
        Self {
            cfg,
            display: display.id,
            kind: display.kind,
            priority: display.kind.priority(),
            size: (display.width, display.height),
            render_size: display.render_size,
            color_transform_supported: display.color_transform_supported,
            recomposition: display.recomposition,
            has_composer: pool
                .engines()
                .iter()
                .any(|e| e.desc.logical == LogicalType::Composer),
            layers,
            client: CompositionGroup::new(GroupKind::Client),
            secondary: CompositionGroup::new(GroupKind::Secondary),
            windows_left: 0,
            spare_channels: pool.channel_claims(display.id),
            iterations: 0,
        }
    }

    fn window_budget(&self) -> u32 {
        u32::from(self.kind.window_budget(self.cfg.max_windows))
    }

    fn screen_image(&self) -> ImageDesc {
        ImageDesc::plain(PixelFormat::DEFAULT_RGB, self.size.0, self.size.1)
    }

    fn secondary_possible(&self) -> bool {
        self.cfg.secondary_enabled && self.kind.has_secondary_composition() && self.has_composer
    }

    /// Whether taking one more channel would leave a waiting display
    /// without one.
    fn channels_spoken_for(&self, pool: &ResourcePool) -> bool {
        self.spare_channels > 0 && pool.free_channels() <= self.spare_channels
    }

    fn progress(&self) -> u32 {
        self.layers.iter().map(PassLayer::rung).sum()
    }

    pub(super) fn pinned_range(&self) -> Option<(usize, usize)> {
        let lo = self.layers.iter().position(PassLayer::is_pinned)?;
        let hi = self.layers.iter().rposition(PassLayer::is_pinned)?;
        Some((lo, hi))
    }

    /// Pins layer `z` to client composition. Returns whether it was bidding.
    pub(super) fn pin(&mut self, z: usize, reason: RejectReason, tracer: &mut Tracer<'_>) -> bool {
        let display = self.display;
        let l = &mut self.layers[z];
        let fresh = !l.is_pinned();
        l.sticky |= reason;
        l.clear_placement();
        if fresh {
            log::trace!("{display:?}: z {z} to client ({reason:?})");
            tracer.demotion(&DemotionEvent {
                display,
                layer: l.id,
                z: z32(z),
                reason,
            });
        }
        fresh
    }

    // -- Policy pins --

    /// Pins every layer a policy keeps off hardware regardless of
    /// resources.
    pub(super) fn pin_policies(&mut self, tracer: &mut Tracer<'_>) {
        let slow: Vec<usize> = if self.recomposition == RecompositionMode::DeviceToClient {
            self.layers
                .iter()
                .enumerate()
                .filter(|(_, l)| is_slow(l.props.fps, self.cfg.low_fps_threshold))
                .map(|(z, _)| z)
                .collect()
        } else {
            Vec::new()
        };
        // A lone slow layer saves nothing: the client target needs a window too.
        let slow_applies = slow.len() >= 2;
        let budget = self.window_budget();

        for z in 0..self.layers.len() {
            let l = &self.layers[z];
            let mut reason = RejectReason::empty();
            if l.props.requested == RequestedComposition::Client {
                reason |= RejectReason::FORCED_CLIENT;
            }
            if !self.color_transform_supported {
                reason |= RejectReason::UNSUPPORTED_COLOR_TRANSFORM;
            }
            if z32(z) >= self.cfg.max_device_layers {
                reason |= RejectReason::EXCEEDS_LAYER_BUDGET;
            }
            if budget == 0 {
                reason |= RejectReason::INSUFFICIENT_WINDOW;
            }
            if slow_applies && slow.contains(&z) {
                reason |= RejectReason::LOW_FPS_LAYER;
            }
            if !l.cap.has_hardware_path() {
                let capability = l.cap.all_reasons() & RejectReason::CAPABILITY;
                reason |= if capability.is_empty() {
                    RejectReason::UNSUPPORTED_FORMAT
                } else {
                    capability
                };
            }
            if !reason.is_empty() {
                self.pin(z, reason, tracer);
            }
        }
    }

    // -- Retry loop --

    /// Runs iterations until one is stable, then applies the priority
    /// yield once.
    pub(super) fn converge(
        &mut self,
        pool: &mut ResourcePool,
        gate: &ReallocGate,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), AssignError> {
        let mut yielded = false;
        loop {
            if self.iterations >= self.cfg.max_retries {
                return Err(AssignError::RetryBudgetExhausted {
                    attempts: self.iterations,
                });
            }
            match self.iterate(pool, gate, tracer) {
                StepResult::Changed => {}
                StepResult::Failed(err) => return Err(err),
                StepResult::Stable => {
                    if !yielded && self.yield_to_claims(pool, tracer) {
                        yielded = true;
                        continue;
                    }
                    return Ok(());
                }
            }
        }
    }

    pub(super) fn iterate(
        &mut self,
        pool: &mut ResourcePool,
        gate: &ReallocGate,
        tracer: &mut Tracer<'_>,
    ) -> StepResult {
        let before = self.progress();
        let iteration = self.iterations;
        self.iterations += 1;
        if let Err(err) = self.bid(pool, gate, tracer) {
            return StepResult::Failed(err);
        }
        let after = self.progress();
        if after > before {
            log::debug!(
                "{:?}: iteration {iteration} moved layers down ({before} -> {after})",
                self.display
            );
            tracer.retry(&RetryEvent {
                display: self.display,
                iteration,
                pinned: z32(self.layers.iter().filter(|l| l.is_pinned()).count()),
            });
            StepResult::Changed
        } else {
            StepResult::Stable
        }
    }

    fn bid(
        &mut self,
        pool: &mut ResourcePool,
        gate: &ReallocGate,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), AssignError> {
        // (a) Start from nothing but pins and reservations.
        pool.release_display(self.display);
        self.client.reset();
        self.secondary.reset();
        for l in &mut self.layers {
            l.clear_placement();
        }
        self.windows_left = self.window_budget();
        self.normalize(pool, tracer)?;

        // (b) Targets first, so they always find a window.
        if self.pinned_range().is_some() {
            self.assign_client_target(pool)?;
        }
        if self.layers.iter().any(|l| !l.is_pinned() && l.wants_secondary) {
            if let Err(reason) = self.assign_secondary_target(pool)? {
                for z in 0..self.layers.len() {
                    let l = &self.layers[z];
                    if !l.is_pinned() && l.wants_secondary {
                        self.pin(z, RejectReason::SECONDARY_UNAVAILABLE | reason, tracer);
                    }
                }
            }
        }

        // (c) Priority tiers high to low, bottom to top within a tier.
        let mut claims = Vec::new();
        for z in self.bidding_order() {
            let l = &self.layers[z];
            if l.is_pinned() {
                continue;
            }
            if l.wants_secondary {
                self.layers[z].composition = Some(Composition::Secondary);
                continue;
            }
            match self.plan_device(z, pool, gate, &mut claims) {
                Ok(placement) => self.commit(z, placement, pool)?,
                Err(reasons) => {
                    if self.secondary_possible() && self.layers[z].cap.secondary {
                        let l = &mut self.layers[z];
                        l.wants_secondary = true;
                        l.composition = Some(Composition::Secondary);
                        l.reject = demotion_reason(reasons);
                    } else {
                        self.pin(z, demotion_reason(reasons), tracer);
                    }
                }
            }
        }
        for claim in claims {
            pool.post_claim(claim);
        }

        self.normalize(pool, tracer)?;

        // (d) Batch the secondary group onto the composer.
        self.assign_composer(pool, gate, tracer)?;
        self.sync_groups();
        Ok(())
    }

    fn bidding_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.layers.len()).collect();
        order.sort_by_key(|&z| (Reverse(self.layers[z].props.priority), z));
        order
    }

    // -- Engine selection --

    /// Picks a free channel of a type in `mask` that can take `src` to `dst`.
    ///
    /// Engines reserved for this display come first, then unpinned ones,
    /// then the least capable type.
    pub(super) fn pick_otf(
        &self,
        pool: &ResourcePool,
        mask: EngineMask,
        src: &ImageDesc,
        dst: &ImageDesc,
    ) -> Result<EngineId, RejectReason> {
        let mut candidates: Vec<_> = pool
            .engines()
            .iter()
            .filter(|e| {
                e.kind() == EngineKind::Otf
                    && mask.contains(EngineMask::from(e.desc.physical))
                    && e.available_to(self.display)
            })
            .collect();
        if candidates.is_empty() {
            return Err(RejectReason::INSUFFICIENT_ENGINE);
        }
        candidates.sort_by_key(|e| {
            (
                e.reserved_for != Some(self.display),
                e.desc.fixed_window.is_some(),
                e.desc.physical.index(),
                e.id,
            )
        });
        let mut reasons = RejectReason::empty();
        for e in candidates {
            match pool.check_assignable(e.id, self.display, src, dst, self.cfg.refresh_hz) {
                Ok(_) => return Ok(e.id),
                Err(r) => reasons |= r,
            }
        }
        Err(reasons)
    }

    /// Finds a device path for layer `z` without touching the pool.
    pub(super) fn plan_device(
        &self,
        z: usize,
        pool: &ResourcePool,
        gate: &ReallocGate,
        claims: &mut Vec<Claim>,
    ) -> Result<Placement, RejectReason> {
        if self.windows_left == 0 {
            return Err(RejectReason::INSUFFICIENT_WINDOW);
        }
        if self.channels_spoken_for(pool) {
            return Err(RejectReason::INSUFFICIENT_ENGINE);
        }
        let l = &self.layers[z];
        let Some(read) = l.read_image() else {
            return Err(RejectReason::UNSUPPORTED_FORMAT);
        };
        let dst = l.props.frame_image();
        let state = if l.props.is_solid_color() {
            WindowState::SolidColor
        } else if l.props.requested == RequestedComposition::Cursor
            && dst.width() <= self.cfg.cursor_max_size
            && dst.height() <= self.cfg.cursor_max_size
        {
            WindowState::Cursor
        } else {
            WindowState::Buffer
        };

        let mut reasons = RejectReason::empty();
        if l.cap.direct.is_empty() {
            reasons |= l.cap.all_reasons() & RejectReason::CAPABILITY;
        } else {
            match self.pick_otf(pool, l.cap.direct, &read, &dst) {
                Ok(otf) => {
                    return Ok(Placement::Direct {
                        otf,
                        src: read,
                        state,
                    });
                }
                Err(r) => reasons |= r,
            }
        }
        if !l.props.is_solid_color() && !l.cap.m2m.is_empty() {
            match chain::plan_chain(self, l, pool, gate, claims) {
                Ok(placement) => return Ok(placement),
                Err(r) => reasons |= r,
            }
        }
        Err(reasons)
    }

    /// Commits a placement for layer `z` to the pool.
    pub(super) fn commit(
        &mut self,
        z: usize,
        placement: Placement,
        pool: &mut ResourcePool,
    ) -> Result<(), AssignError> {
        let source = self.layers[z].source(self.display);
        let dst = self.layers[z].props.frame_image();
        let (otf, m2m, read, state) = match placement {
            Placement::Direct { otf, src, state } => {
                pool.assign(
                    otf,
                    self.display,
                    self.priority,
                    Assignment {
                        source,
                        src,
                        dst,
                        capacity: 0.0,
                    },
                )
                .map_err(Invariant::from)?;
                (otf, None, src, state)
            }
            Placement::Chain {
                m2m,
                src,
                mid,
                otf,
                capacity,
            } => {
                pool.assign(
                    m2m,
                    self.display,
                    self.priority,
                    Assignment {
                        source,
                        src,
                        dst: mid,
                        capacity,
                    },
                )
                .map_err(Invariant::from)?;
                pool.assign(
                    otf,
                    self.display,
                    self.priority,
                    Assignment {
                        source,
                        src: mid,
                        dst,
                        capacity: 0.0,
                    },
                )
                .map_err(Invariant::from)?;
                (otf, Some(m2m), mid, WindowState::Buffer)
            }
        };
        let l = &mut self.layers[z];
        l.composition = Some(Composition::Device);
        l.otf = Some(otf);
        l.m2m = m2m;
        l.src = Some(read);
        l.state = state;
        l.reject = RejectReason::empty();
        self.windows_left -= 1;
        Ok(())
    }

    /// Returns the engines held for layer `z` to the pool.
    pub(super) fn release_layer(
        &mut self,
        z: usize,
        pool: &mut ResourcePool,
    ) -> Result<(), AssignError> {
        let source = self.layers[z].source(self.display);
        let l = &mut self.layers[z];
        if let Some(otf) = l.otf.take() {
            pool.release_source(otf, source).map_err(Invariant::from)?;
            self.windows_left += 1;
        }
        if let Some(m2m) = l.m2m.take() {
            pool.release_source(m2m, source).map_err(Invariant::from)?;
        }
        l.src = None;
        l.state = WindowState::Disabled;
        Ok(())
    }

    // -- Targets --

    fn group_hdr(&self, composition: Composition) -> HdrKind {
        self.layers
            .iter()
            .filter(|l| {
                l.composition == Some(composition)
                    || (composition == Composition::Client && l.is_pinned())
            })
            .map(|l| l.props.hdr)
            .find(|h| h.is_hdr())
            .unwrap_or(HdrKind::Sdr)
    }

    fn target_src(target: &TargetBuffer) -> ImageDesc {
        ImageDesc {
            hdr: target.hdr,
            ..ImageDesc::plain(target.format, target.width, target.height)
        }
    }

    /// Gives the client target a channel and a window.
    pub(super) fn assign_client_target(
        &mut self,
        pool: &mut ResourcePool,
    ) -> Result<(), AssignError> {
        let target = TargetBuffer::for_content(
            self.render_size.0,
            self.render_size.1,
            self.group_hdr(Composition::Client),
        );
        self.client.target = Some(target);
        if !self.kind.needs_scanout() {
            return Ok(());
        }
        if self.windows_left == 0 {
            return Err(AssignError::ClientTargetUnavailable);
        }
        let src = Self::target_src(&target);
        let dst = self.screen_image();
        let Ok(otf) = self.pick_otf(pool, EngineMask::OTF, &src, &dst) else {
            self.claim_channel(pool);
            return Err(AssignError::ClientTargetUnavailable);
        };
        pool.assign(
            otf,
            self.display,
            self.priority,
            Assignment {
                source: Source::ClientTarget(self.display),
                src,
                dst,
                capacity: 0.0,
            },
        )
        .map_err(Invariant::from)?;
        self.client.otf = Some(otf);
        self.windows_left -= 1;
        Ok(())
    }

    /// Asks the displays holding channels to leave one for this display's
    /// client target.
    fn claim_channel(&self, pool: &mut ResourcePool) {
        let held = pool
            .engines()
            .iter()
            .filter(|e| e.kind() == EngineKind::Otf && e.owner().is_some_and(|d| d != self.display))
            .map(|e| e.desc.physical)
            .min_by_key(|p| p.index());
        if let Some(physical) = held {
            log::debug!(
                "{:?}: no channel for the client target, claiming {physical:?}",
                self.display
            );
            pool.post_claim(Claim {
                physical,
                display: self.display,
                priority: self.priority,
            });
        }
    }

    pub(super) fn release_client_target(
        &mut self,
        pool: &mut ResourcePool,
    ) -> Result<(), AssignError> {
        if let Some(otf) = self.client.otf.take() {
            pool.release_source(otf, Source::ClientTarget(self.display))
                .map_err(Invariant::from)?;
            self.windows_left += 1;
        }
        Ok(())
    }

    /// Gives the secondary target a channel and a window.
    ///
    /// The inner error says why it could not.
    fn assign_secondary_target(
        &mut self,
        pool: &mut ResourcePool,
    ) -> Result<Result<(), RejectReason>, AssignError> {
        let target = TargetBuffer::for_content(
            self.size.0,
            self.size.1,
            self.group_hdr(Composition::Secondary),
        );
        self.secondary.target = Some(target);
        if !self.kind.needs_scanout() {
            return Ok(Ok(()));
        }
        if self.windows_left == 0 {
            return Ok(Err(RejectReason::INSUFFICIENT_WINDOW));
        }
        if self.channels_spoken_for(pool) {
            return Ok(Err(RejectReason::INSUFFICIENT_ENGINE));
        }
        let src = Self::target_src(&target);
        let dst = self.screen_image();
        let otf = match self.pick_otf(pool, EngineMask::OTF, &src, &dst) {
            Ok(otf) => otf,
            Err(r) => return Ok(Err(demotion_reason(r))),
        };
        pool.assign(
            otf,
            self.display,
            self.priority,
            Assignment {
                source: Source::SecondaryTarget(self.display),
                src,
                dst,
                capacity: 0.0,
            },
        )
        .map_err(Invariant::from)?;
        self.secondary.otf = Some(otf);
        self.windows_left -= 1;
        Ok(Ok(()))
    }

    /// Puts the secondary group on the composer, pinning what does not fit.
    fn assign_composer(
        &mut self,
        pool: &mut ResourcePool,
        gate: &ReallocGate,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), AssignError> {
        let members: Vec<usize> = (0..self.layers.len())
            .filter(|&z| {
                let l = &self.layers[z];
                !l.is_pinned() && l.composition == Some(Composition::Secondary)
            })
            .collect();
        if members.is_empty() {
            return Ok(());
        }
        if self.kind.needs_scanout() && self.secondary.otf.is_none() {
            // New candidates this iteration; the target comes next time.
            return Ok(());
        }

        let mut gated = false;
        let composer = pool
            .engines()
            .iter()
            .find(|e| {
                if e.desc.logical != LogicalType::Composer || !e.available_to(self.display) {
                    return false;
                }
                if gate.is_reallocating(e.id) {
                    gated = true;
                    return false;
                }
                true
            })
            .map(|e| e.id);
        let Some(composer) = composer else {
            let reason = RejectReason::SECONDARY_UNAVAILABLE
                | if gated {
                    RejectReason::PENDING_REALLOCATION
                } else {
                    RejectReason::INSUFFICIENT_ENGINE
                };
            for z in members {
                self.pin(z, reason, tracer);
            }
            return Ok(());
        };

        let mut taken = 0_u32;
        for z in members {
            if taken >= self.cfg.secondary_max_layers {
                self.pin(
                    z,
                    RejectReason::SECONDARY_UNAVAILABLE | RejectReason::INSUFFICIENT_CAPACITY,
                    tracer,
                );
                continue;
            }
            let l = &self.layers[z];
            let Some(src) = l.read_image() else {
                self.pin(
                    z,
                    RejectReason::SECONDARY_UNAVAILABLE | RejectReason::UNSUPPORTED_FORMAT,
                    tracer,
                );
                continue;
            };
            let dst = l.props.frame_image();
            let source = l.source(self.display);
            match pool.check_assignable(composer, self.display, &src, &dst, self.cfg.refresh_hz) {
                Ok(capacity) => {
                    pool.assign(
                        composer,
                        self.display,
                        self.priority,
                        Assignment {
                            source,
                            src,
                            dst,
                            capacity,
                        },
                    )
                    .map_err(Invariant::from)?;
                    let l = &mut self.layers[z];
                    l.m2m = Some(composer);
                    l.src = Some(src);
                    l.reject = RejectReason::empty();
                    taken += 1;
                }
                Err(r) => {
                    self.pin(
                        z,
                        RejectReason::SECONDARY_UNAVAILABLE | (r & RejectReason::CAPACITY),
                        tracer,
                    );
                }
            }
        }
        if taken > 0 {
            self.secondary.m2m = Some(composer);
        }
        Ok(())
    }

    // -- Group normalization --

    /// Applies the group rules until nothing moves.
    fn normalize(
        &mut self,
        pool: &mut ResourcePool,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), AssignError> {
        loop {
            let mut changed = false;

            if let Some((lo, hi)) = self.pinned_range() {
                for z in lo..=hi {
                    if !self.layers[z].is_pinned() {
                        changed |= self.pin(z, RejectReason::SANDWICHED_BETWEEN_CLIENT, tracer);
                    }
                }
            }

            for c in 0..self.layers.len() {
                let top = &self.layers[c];
                if !top.is_pinned() || !top.props.overwrites_translucently() {
                    continue;
                }
                let frame = top.props.display_frame;
                for z in 0..c {
                    let l = &self.layers[z];
                    if !l.is_pinned() && overlaps(frame, l.props.display_frame) {
                        changed |= self.pin(z, RejectReason::BELOW_OVERWRITE, tracer);
                    }
                }
            }

            changed |= self.close_secondary(pool, tracer)?;

            if self.kind.supports_hdr_exception()
                && self.layers.iter().any(|l| {
                    l.is_pinned()
                        && l.props.hdr.is_hdr()
                        && l.sticky.intersects(RejectReason::CAPABILITY)
                })
            {
                for z in 0..self.layers.len() {
                    if !self.layers[z].is_pinned() {
                        changed |= self.pin(z, RejectReason::HDR_EXCEPTION, tracer);
                    }
                }
            }

            if !changed {
                return Ok(());
            }
        }
    }

    /// Makes the secondary group one contiguous run.
    ///
    /// Device layers inside the run join it when the composer can read
    /// them. If the run is still split, the longest piece stays and the
    /// others are pinned.
    fn close_secondary(
        &mut self,
        pool: &mut ResourcePool,
        tracer: &mut Tracer<'_>,
    ) -> Result<bool, AssignError> {
        let is_member =
            |l: &PassLayer| !l.is_pinned() && l.composition == Some(Composition::Secondary);
        let Some(lo) = self.layers.iter().position(is_member) else {
            return Ok(false);
        };
        let Some(hi) = self.layers.iter().rposition(is_member) else {
            return Ok(false);
        };

        let mut changed = false;
        for z in lo..=hi {
            let l = &self.layers[z];
            if !l.is_pinned()
                && l.composition == Some(Composition::Device)
                && l.state != WindowState::Cursor
                && l.cap.secondary
            {
                self.release_layer(z, pool)?;
                let l = &mut self.layers[z];
                l.composition = Some(Composition::Secondary);
                l.wants_secondary = true;
                changed = true;
            }
        }

        let mut runs: Vec<(usize, usize)> = Vec::new();
        for z in lo..=hi {
            if !is_member(&self.layers[z]) {
                continue;
            }
            match runs.last_mut() {
                Some((_, end)) if *end + 1 == z => *end = z,
                _ => runs.push((z, z)),
            }
        }
        if runs.len() > 1 {
            let keep = runs
                .iter()
                .enumerate()
                .max_by_key(|(i, (s, e))| (e - s, Reverse(*i)))
                .map_or(0, |(i, _)| i);
            for (i, &(s, e)) in runs.iter().enumerate() {
                if i == keep {
                    continue;
                }
                for z in s..=e {
                    changed |= self.pin(z, RejectReason::SECONDARY_UNAVAILABLE, tracer);
                }
            }
        }
        Ok(changed)
    }

    /// Recomputes group ranges and the secondary target from the layers.
    pub(super) fn sync_groups(&mut self) {
        self.client.range = None;
        self.secondary.range = None;
        for z in 0..self.layers.len() {
            let l = &self.layers[z];
            if l.is_pinned() {
                self.client.include(z32(z));
            } else if l.composition == Some(Composition::Secondary) {
                self.secondary.include(z32(z));
            }
        }
        if self.client.is_empty() {
            self.client.target = None;
        }
        if self.secondary.is_empty() {
            self.secondary.target = None;
        } else {
            self.secondary.target = Some(TargetBuffer::for_content(
                self.size.0,
                self.size.1,
                self.group_hdr(Composition::Secondary),
            ));
        }
    }

    // -- Priority yield --

    /// Pins layers holding an M2M type that a higher-priority display has
    /// claimed. Returns whether any layer moved.
    fn yield_to_claims(&mut self, pool: &ResourcePool, tracer: &mut Tracer<'_>) -> bool {
        let mut moved = false;
        for z in 0..self.layers.len() {
            let l = &self.layers[z];
            if l.is_pinned() {
                continue;
            }
            let Some(physical) = l.m2m.and_then(|m| pool.engine(m)).map(|e| e.desc.physical)
            else {
                continue;
            };
            if pool.has_claim_above(physical, self.priority) {
                log::debug!("{:?}: z {z} yields {physical:?}", self.display);
                moved |= self.pin(z, RejectReason::YIELDED_TO_PRIORITY, tracer);
            }
        }
        moved
    }

    // -- Checks and output --

    pub(super) fn check_invariants(&self, pool: &ResourcePool) -> Result<(), Invariant> {
        for (z, l) in self.layers.iter().enumerate() {
            match l.composition {
                None => return Err(Invariant::Undecided(z32(z))),
                Some(Composition::Device) if l.otf.is_none() => {
                    return Err(Invariant::MissingEngine(z32(z)));
                }
                Some(Composition::Secondary) if l.m2m.is_none() => {
                    return Err(Invariant::MissingEngine(z32(z)));
                }
                _ => {}
            }
        }
        for (group, composition) in [
            (&self.client, Composition::Client),
            (&self.secondary, Composition::Secondary),
        ] {
            let members = self
                .layers
                .iter()
                .filter(|l| l.composition == Some(composition))
                .count();
            let contiguous = match group.range() {
                None => members == 0,
                Some((first, last)) => {
                    first <= last
                        && group.len() == members
                        && (first..=last)
                            .all(|z| self.layers[z as usize].composition == Some(composition))
                }
            };
            if !contiguous {
                return Err(Invariant::NonContiguous(group.kind()));
            }
        }
        for physical in PhysicalType::ALL {
            if physical.is_otf() {
                continue;
            }
            if pool.capacity_used(physical) > pool.capacity_limit(physical) + CAPACITY_EPSILON {
                return Err(Invariant::CapacityExceeded(physical));
            }
        }
        Ok(())
    }

    fn target_request(
        &self,
        otf: EngineId,
        source: Source,
        target: Option<TargetBuffer>,
        pool: &ResourcePool,
    ) -> WindowRequest {
        let src = target.as_ref().map_or_else(
            || self.screen_image(),
            Self::target_src,
        );
        WindowRequest {
            engine: otf,
            pinned: pool.engine(otf).and_then(|e| e.desc.fixed_window),
            source,
            state: WindowState::Buffer,
            src,
            dst: self.screen_image().rect,
            blend: crate::format::BlendMode::Premultiplied,
            plane_alpha: 1.0,
            color: 0,
        }
    }

    /// Lays the decisions out on the window array.
    pub(super) fn bind_windows(
        &mut self,
        pool: &ResourcePool,
        tracer: &mut Tracer<'_>,
    ) -> Result<Vec<WindowSlot>, WindowError> {
        let mut requests = Vec::new();
        let (mut client_done, mut secondary_done) = (false, false);
        for l in &self.layers {
            match l.composition {
                Some(Composition::Client) if !client_done => {
                    client_done = true;
                    if let Some(otf) = self.client.otf {
                        requests.push(self.target_request(
                            otf,
                            Source::ClientTarget(self.display),
                            self.client.target,
                            pool,
                        ));
                    }
                }
                Some(Composition::Secondary) if !secondary_done => {
                    secondary_done = true;
                    if let Some(otf) = self.secondary.otf {
                        requests.push(self.target_request(
                            otf,
                            Source::SecondaryTarget(self.display),
                            self.secondary.target,
                            pool,
                        ));
                    }
                }
                Some(Composition::Device) => {
                    if let (Some(otf), Some(src)) = (l.otf, l.src) {
                        requests.push(WindowRequest {
                            engine: otf,
                            pinned: pool.engine(otf).and_then(|e| e.desc.fixed_window),
                            source: l.source(self.display),
                            state: l.state,
                            src,
                            dst: l.props.display_frame,
                            blend: l.props.blend,
                            plane_alpha: l.props.plane_alpha,
                            color: match l.props.content {
                                LayerContent::SolidColor(argb) => argb,
                                _ => 0,
                            },
                        });
                    }
                }
                _ => {}
            }
        }

        let budget = self.kind.window_budget(self.cfg.max_windows);
        let slots = WindowAllocator::allocate(&requests, budget)?;
        for slot in &slots {
            let (Some(engine), Some(source)) = (slot.engine, slot.source) else {
                continue;
            };
            match source {
                Source::Layer { layer, .. } => {
                    if let Some(l) = self.layers.iter_mut().find(|l| l.id == layer) {
                        l.window = Some(slot.index);
                    }
                }
                Source::ClientTarget(_) => self.client.window = Some(slot.index),
                Source::SecondaryTarget(_) => self.secondary.window = Some(slot.index),
            }
            tracer.window_bound(&WindowBoundEvent {
                display: self.display,
                window: slot.index,
                engine,
                source,
            });
        }
        Ok(slots)
    }

    /// Runs the whole pass after policy pins: retry loop, local search,
    /// checks, and window binding.
    pub(super) fn run(
        &mut self,
        pool: &mut ResourcePool,
        gate: &ReallocGate,
        tracer: &mut Tracer<'_>,
    ) -> Result<Vec<WindowSlot>, AssignError> {
        self.converge(pool, gate, tracer)?;
        let moved = self.shrink_client(pool, gate)?;
        let widened = self.widen_secondary(pool, gate)?;
        if moved + widened > 0 {
            log::trace!(
                "{:?}: local search moved {moved} out of client, {widened} into secondary",
                self.display
            );
        }
        self.sync_groups();
        self.check_invariants(pool)?;
        Ok(self.bind_windows(pool, tracer)?)
    }

    /// Sends every layer to client composition.
    ///
    /// Returns the window array, which holds at most the client target.
    pub(super) fn fall_back(
        &mut self,
        pool: &mut ResourcePool,
        tracer: &mut Tracer<'_>,
    ) -> Vec<WindowSlot> {
        pool.release_display(self.display);
        self.client.reset();
        self.secondary.reset();
        self.windows_left = self.window_budget();
        for l in &mut self.layers {
            l.sticky = RejectReason::CONVERGENCE_FALLBACK;
            l.wants_secondary = false;
            l.clear_placement();
        }
        if !self.layers.is_empty() {
            if let Err(err) = self.assign_client_target(pool) {
                log::error!("{:?}: fallback without a client target: {err}", self.display);
                self.client.otf = None;
            }
        }
        self.sync_groups();
        self.bind_windows(pool, tracer).unwrap_or_else(|err| {
            log::error!("{:?}: fallback windows: {err}", self.display);
            Vec::new()
        })
    }
}
