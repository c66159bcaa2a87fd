// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Local search after the retry loop settles.
//!
//! Both steps only move layers between adjacent groups, so contiguity
//! holds without another normalization round.

use alloc::vec::Vec;

use super::pass::{Pass, z32};
use crate::engine::Assignment;
use crate::error::{AssignError, Invariant};
use crate::layer::Composition;
use crate::pool::ResourcePool;
use crate::realloc::ReallocGate;
use crate::reason::RejectReason;
use crate::window::WindowState;

impl Pass<'_> {
    /// Whether a pinned layer above `z` overwrites translucently over it.
    fn overwritten_above(&self, z: usize) -> bool {
        let frame = self.layers[z].props.display_frame;
        self.layers[z + 1..].iter().any(|top| {
            top.is_pinned() && top.props.overwrites_translucently() && {
                let i = top.props.display_frame.intersect(frame);
                i.width() > 0.0 && i.height() > 0.0
            }
        })
    }

    /// Moves recoverable layers at the ends of the client range back to
    /// hardware. Returns how many moved.
    ///
    /// A lone client layer gives up the client target first, so its window
    /// becomes available to it.
    pub(super) fn shrink_client(
        &mut self,
        pool: &mut ResourcePool,
        gate: &ReallocGate,
    ) -> Result<u32, AssignError> {
        let mut moved = 0;
        // Claims from here are dropped; the retry loop already posted the
        // ones that matter.
        let mut claims = Vec::new();
        loop {
            let Some((lo, hi)) = self.pinned_range() else {
                break;
            };
            let single = lo == hi;
            let mut progressed = false;
            for z in [Some(hi), (!single).then_some(lo)].into_iter().flatten() {
                if !self.layers[z].sticky.is_recoverable() {
                    continue;
                }
                if z == lo && !single && self.overwritten_above(z) {
                    continue;
                }
                if single {
                    self.release_client_target(pool)?;
                }
                if let Ok(placement) = self.plan_device(z, pool, gate, &mut claims) {
                    let l = &mut self.layers[z];
                    l.sticky = RejectReason::empty();
                    l.wants_secondary = false;
                    self.commit(z, placement, pool)?;
                    progressed = true;
                } else if self.join_secondary(z, pool, gate)? {
                    progressed = true;
                } else if single {
                    self.assign_client_target(pool)?;
                }
                if progressed {
                    moved += 1;
                    break;
                }
            }
            if !progressed {
                break;
            }
        }
        Ok(moved)
    }

    /// Moves layer `z` into the secondary group if it borders it and the
    /// composer has room.
    fn join_secondary(
        &mut self,
        z: usize,
        pool: &mut ResourcePool,
        gate: &ReallocGate,
    ) -> Result<bool, AssignError> {
        let (Some(composer), Some((first, last))) = (self.secondary.m2m, self.secondary.range)
        else {
            return Ok(false);
        };
        let at = z32(z);
        if at + 1 != first && at != last + 1 {
            return Ok(false);
        }
        let l = &self.layers[z];
        if !l.cap.secondary
            || self.secondary.len() >= self.cfg.secondary_max_layers as usize
            || gate.is_reallocating(composer)
        {
            return Ok(false);
        }
        let Some(src) = l.read_image() else {
            return Ok(false);
        };
        let dst = l.props.frame_image();
        let source = l.source(self.display);
        let Ok(capacity) =
            pool.check_assignable(composer, self.display, &src, &dst, self.cfg.refresh_hz)
        else {
            return Ok(false);
        };
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
        l.sticky = RejectReason::empty();
        l.wants_secondary = true;
        l.composition = Some(Composition::Secondary);
        l.m2m = Some(composer);
        l.src = Some(src);
        l.reject = RejectReason::empty();
        self.secondary.include(at);
        Ok(true)
    }

    /// Folds device layers bordering the secondary group into it while the
    /// composer has room, freeing their windows. Returns how many moved.
    pub(super) fn widen_secondary(
        &mut self,
        pool: &mut ResourcePool,
        gate: &ReallocGate,
    ) -> Result<u32, AssignError> {
        let Some(composer) = self.secondary.m2m else {
            return Ok(0);
        };
        if gate.is_reallocating(composer) {
            return Ok(0);
        }
        let mut widened = 0;
        while let Some((first, last)) = self.secondary.range {
            if self.secondary.len() >= self.cfg.secondary_max_layers as usize {
                break;
            }
            let mut grew = false;
            for at in [first.checked_sub(1), last.checked_add(1)].into_iter().flatten() {
                let z = at as usize;
                let Some(l) = self.layers.get(z) else {
                    continue;
                };
                if l.is_pinned()
                    || l.composition != Some(Composition::Device)
                    || l.state == WindowState::Cursor
                    || !l.cap.secondary
                {
                    continue;
                }
                let Some(src) = l.read_image() else {
                    continue;
                };
                let dst = l.props.frame_image();
                let source = l.source(self.display);
                // Checked before releasing the layer's own hop, so this
                // never overshoots.
                let Ok(capacity) =
                    pool.check_assignable(composer, self.display, &src, &dst, self.cfg.refresh_hz)
                else {
                    continue;
                };
                self.release_layer(z, pool)?;
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
                l.composition = Some(Composition::Secondary);
                l.wants_secondary = true;
                l.m2m = Some(composer);
                l.src = Some(src);
                self.secondary.include(at);
                widened += 1;
                grew = true;
                break;
            }
            if !grew {
                break;
            }
        }
        Ok(widened)
    }
}
