// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The assignment pass.
//!
//! [`AssignmentEngine::assign`] decides, for every layer of one display,
//! whether it gets its own hardware window (possibly behind an M2M hop),
//! joins the secondary group, or is composed by the client.
//!
//! # Per-frame flow
//!
//! 1. Drain layer changes. With nothing changed, no reallocation since the
//!    last pass, and no open claim involving this display, the previous
//!    result is returned without touching the pool. A display whose client
//!    target found no channel claims one; holders leave a channel free on
//!    their next pass.
//! 2. Reclassify layers whose attributes changed.
//! 3. Pin layers that policy keeps off hardware.
//! 4. Run the bounded retry loop until an iteration is stable.
//! 5. Move client layers back to hardware where windows remain, and fold
//!    neighbors into the secondary group where the composer has room.
//! 6. Check the result, then lay it out on the window array.
//!
//! If step 4 runs out of iterations or step 6 fails, every layer goes to
//! client composition and the result is flagged `error_case`.

mod chain;
mod optimize;
mod pass;


use alloc::vec::Vec;

use crate::classify;
use crate::config::AssignConfig;
use crate::dirty::GeometryChange;
use crate::display::Display;
use crate::error::{AssignError, ConfigError};
use crate::frame::{FrameResult, LayerDecision};
use crate::group::CompositionGroup;
use crate::layer::{Composition, LayerChanges, LayerOutcome, LayerStore};
use crate::pool::ResourcePool;
use crate::realloc::ReallocGate;
use crate::trace::{PassBeginEvent, PassEndEvent, Tracer};

use pass::{Pass, z32};

/// Runs assignment passes with a fixed configuration.
#[derive(Clone, Debug)]
pub struct AssignmentEngine {
    config: AssignConfig,
}

impl AssignmentEngine {
    /// Creates an engine after validating `config`.
    pub fn new(config: AssignConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Creates an engine without validating; lets tests starve the loop.
    #[cfg(test)]
    pub(crate) fn new_unchecked(config: AssignConfig) -> Self {
        Self { config }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &AssignConfig {
        &self.config
    }

    /// Assigns every layer of `display` for the next frame.
    ///
    /// Engines previously held by `display` are released and re-acquired
    /// from `pool`. Engines gated by `gate` are not used this frame.
    ///
    /// Returns `Err` only for faults the pass cannot recover from; the
    /// caller abandons the frame. Recoverable faults produce a full-client
    /// result with [`FrameResult::error_case`] set.
    pub fn assign(
        &self,
        display: &mut Display,
        pool: &mut ResourcePool,
        gate: &ReallocGate,
        tracer: &mut Tracer<'_>,
    ) -> Result<FrameResult, AssignError> {
        display.frame_index += 1;
        display
            .layers
            .set_low_fps_threshold(self.config.low_fps_threshold);
        let changes = display.layers.take_changes();
        let mut bits = changes.bits | display.pending;
        let epoch = gate.epoch();
        if epoch != display.realloc_epoch {
            bits |= GeometryChange::REALLOC;
        }

        if bits.is_empty() && !contested(display, pool) {
            if let Some(result) = self.reuse(display, &changes, tracer) {
                return Ok(result);
            }
        }

        display.pending = GeometryChange::empty();
        display.realloc_epoch = epoch;
        let reclassified = classify::refresh(&mut display.layers, pool.catalog());
        tracer.pass_begin(&PassBeginEvent {
            display: display.id,
            frame_index: display.frame_index,
            layers: z32(display.layers.len()),
            reclassified: z32(reclassified),
            causes: bits,
        });
        log::trace!(
            "{:?}: frame {} full pass ({bits:?})",
            display.id,
            display.frame_index
        );

        pool.clear_claims(display.id);
        let mut pass = Pass::new(&self.config, display, pool);
        pass.pin_policies(tracer);
        let (windows, fault) = match pass.run(pool, gate, tracer) {
            Ok(windows) => (windows, None),
            Err(err) if err.is_fatal() => {
                log::error!("{:?}: frame abandoned: {err}", display.id);
                pool.release_display(display.id);
                display.last = None;
                display.force_validate();
                return Err(err);
            }
            Err(err) => {
                log::warn!(
                    "{:?}: {err}; sending every layer to client composition",
                    display.id
                );
                let windows = pass.fall_back(pool, tracer);
                (windows, Some(err))
            }
        };

        let prev = display.last.take();
        let decisions: Vec<LayerDecision> = pass
            .layers
            .iter()
            .enumerate()
            .map(|(z, l)| LayerDecision {
                layer: l.id,
                z: z32(z),
                requested: l.props.requested,
                composition: l.composition.unwrap_or(Composition::Client),
                window: l.window,
                otf: l.otf,
                m2m: l.m2m,
                reject: l.reject,
            })
            .collect();
        for (l, d) in pass.layers.iter().zip(&decisions) {
            display.layers.set_outcome_at(
                l.slot,
                LayerOutcome {
                    composition: Some(d.composition),
                    window: d.window,
                    otf: d.otf,
                    m2m: d.m2m,
                    reject: d.reject,
                },
            );
        }

        let mut client = pass.client.clone();
        let mut secondary = pass.secondary.clone();
        client.skip = self.group_skip(
            &client,
            prev.as_ref().map(|p| &p.client),
            &display.layers,
            &changes,
        );
        secondary.skip = self.group_skip(
            &secondary,
            prev.as_ref().map(|p| &p.secondary),
            &display.layers,
            &changes,
        );

        let requests_changed = prev.as_ref().is_none_or(|p| {
            p.layers.len() != decisions.len()
                || p
                    .layers
                    .iter()
                    .zip(&decisions)
                    .any(|(a, b)| a.layer != b.layer || a.composition != b.composition)
        });
        let result = FrameResult {
            types_changed: decisions.iter().any(LayerDecision::type_changed),
            requests_changed,
            error_case: fault.is_some(),
            fault,
            iterations: pass.iterations,
            reused: false,
            layers: decisions,
            client,
            secondary,
            windows,
        };

        display.client = result.client.clone();
        display.secondary = result.secondary.clone();
        display.last = Some(result.clone());

        let end = pass_end(display, &result);
        log::debug!(
            "{:?}: {} device, {} secondary, {} client after {} iterations",
            display.id,
            end.device,
            end.secondary,
            end.client,
            end.iterations
        );
        tracer.pass_end(&end);
        Ok(result)
    }

    /// Hands back the previous result when nothing it depends on moved.
    fn reuse(
        &self,
        display: &mut Display,
        changes: &LayerChanges,
        tracer: &mut Tracer<'_>,
    ) -> Option<FrameResult> {
        let mut result = display.last.clone()?;
        result.reused = true;
        result.requests_changed = false;
        result.iterations = 0;
        result.client.skip =
            self.group_skip(&result.client, Some(&display.client), &display.layers, changes);
        result.secondary.skip =
            self.group_skip(&result.secondary, Some(&display.secondary), &display.layers, changes);
        display.client.skip = result.client.skip;
        display.secondary.skip = result.secondary.skip;
        display.last = Some(result.clone());
        log::trace!("{:?}: frame {} reused", display.id, display.frame_index);
        tracer.pass_end(&pass_end(display, &result));
        Some(result)
    }

    /// Whether `group`'s target from the previous frame can be shown again
    /// without recomposing.
    fn group_skip(
        &self,
        group: &CompositionGroup,
        prev: Option<&CompositionGroup>,
        store: &LayerStore,
        changes: &LayerChanges,
    ) -> bool {
        let Some((first, last)) = group.range() else {
            return false;
        };
        if !self.config.skip_static || group.len() < self.config.skip_static_min_layers as usize {
            return false;
        }
        let Some(prev) = prev else {
            return false;
        };
        if prev.range() != group.range() || prev.target().is_none() {
            return false;
        }
        let order = store.z_order();
        (first..=last).all(|z| {
            order.get(z as usize).is_some_and(|&slot| {
                !changes.has_content(slot) && !changes.geometry.contains(&slot)
            })
        })
    }
}

/// Whether `display` waits for an engine another display holds, holds an
/// M2M type a higher-priority display waits for, or holds channels while
/// fewer are free than displays wait for.
fn contested(display: &Display, pool: &ResourcePool) -> bool {
    if pool.claims().iter().any(|c| c.display == display.id) {
        return true;
    }
    let priority = display.kind.priority();
    let mut holds_channel = false;
    for e in pool.engines().iter().filter(|e| e.owner() == Some(display.id)) {
        let physical = e.desc.physical;
        if !physical.is_otf() && pool.has_claim_above(physical, priority) {
            return true;
        }
        holds_channel |= physical.is_otf();
    }
    holds_channel && pool.channel_claims(display.id) > pool.free_channels()
}

fn pass_end(display: &Display, result: &FrameResult) -> PassEndEvent {
    PassEndEvent {
        display: display.id,
        iterations: result.iterations,
        client: z32(result.count(Composition::Client)),
        device: z32(result.count(Composition::Device)),
        secondary: z32(result.count(Composition::Secondary)),
        fallback: result.error_case,
        reused: result.reused,
    }
}
