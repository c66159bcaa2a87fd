// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing for the assignment pass.
//!
//! This module provides an [`AssignTraceSink`] trait with per-event methods
//! that the pass calls at each stage. All method bodies default to no-ops,
//! so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn AssignTraceSink`. When the `trace`
//! feature is **off**, every `Tracer` method compiles to nothing. When
//! **on**, each method performs a single `Option` branch before dispatching.

use crate::dirty::GeometryChange;
use crate::display::DisplayId;
use crate::engine::{EngineId, Source};
use crate::layer::LayerId;
use crate::reason::RejectReason;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Emitted when a pass starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassBeginEvent {
    /// Display being assigned.
    pub display: DisplayId,
    /// Frame counter of the display.
    pub frame_index: u64,
    /// Live layers.
    pub layers: u32,
    /// Layers reclassified for this pass.
    pub reclassified: u32,
    /// Why the previous result could not be reused.
    pub causes: GeometryChange,
}

/// Emitted when a layer leaves the hardware path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DemotionEvent {
    /// Display being assigned.
    pub display: DisplayId,
    /// The layer.
    pub layer: LayerId,
    /// Its z position.
    pub z: u32,
    /// Why.
    pub reason: RejectReason,
}

/// Emitted when a retry-loop iteration ends with changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryEvent {
    /// Display being assigned.
    pub display: DisplayId,
    /// Zero-based iteration that asked for the retry.
    pub iteration: u32,
    /// Layers pinned to client composition so far.
    pub pinned: u32,
}

/// Emitted for every enabled window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowBoundEvent {
    /// Display being assigned.
    pub display: DisplayId,
    /// Window index.
    pub window: u8,
    /// Bound channel.
    pub engine: EngineId,
    /// What it shows.
    pub source: Source,
}

/// Emitted when a pass ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassEndEvent {
    /// Display being assigned.
    pub display: DisplayId,
    /// Retry-loop iterations spent.
    pub iterations: u32,
    /// Layers on client composition.
    pub client: u32,
    /// Layers on their own window.
    pub device: u32,
    /// Layers in the secondary group.
    pub secondary: u32,
    /// Whether the pass fell back to full client composition.
    pub fallback: bool,
    /// Whether the previous assignment was reused.
    pub reused: bool,
}

// ---------------------------------------------------------------------------
// AssignTraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the assignment pass.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait AssignTraceSink {
    /// Called when a pass starts.
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        _ = e;
    }

    /// Called when a layer is sent to client composition.
    fn on_demotion(&mut self, e: &DemotionEvent) {
        _ = e;
    }

    /// Called when an iteration asks for another one.
    fn on_retry(&mut self, e: &RetryEvent) {
        _ = e;
    }

    /// Called for each bound window.
    fn on_window_bound(&mut self, e: &WindowBoundEvent) {
        _ = e;
    }

    /// Called when a pass ends.
    fn on_pass_end(&mut self, e: &PassEndEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// An [`AssignTraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl AssignTraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`AssignTraceSink`].
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn AssignTraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn AssignTraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn AssignTraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`PassBeginEvent`].
    #[inline]
    pub fn pass_begin(&mut self, e: &PassBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_pass_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`DemotionEvent`].
    #[inline]
    pub fn demotion(&mut self, e: &DemotionEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_demotion(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`RetryEvent`].
    #[inline]
    pub fn retry(&mut self, e: &RetryEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_retry(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`WindowBoundEvent`].
    #[inline]
    pub fn window_bound(&mut self, e: &WindowBoundEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_window_bound(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PassEndEvent`].
    #[inline]
    pub fn pass_end(&mut self, e: &PassEndEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_pass_end(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_end() -> PassEndEvent {
        PassEndEvent {
            display: DisplayId(0),
            iterations: 2,
            client: 1,
            device: 3,
            secondary: 0,
            fallback: false,
            reused: false,
        }
    }

    #[test]
    fn noop_sink_compiles() {
        let mut sink = NoopSink;
        sink.on_pass_begin(&PassBeginEvent {
            display: DisplayId(0),
            frame_index: 0,
            layers: 3,
            reclassified: 3,
            causes: GeometryChange::LAYER_ADDED,
        });
        sink.on_pass_end(&sample_end());
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        tracer.pass_end(&sample_end());
        tracer.retry(&RetryEvent {
            display: DisplayId(0),
            iteration: 0,
            pinned: 1,
        });
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        use alloc::vec::Vec;

        struct RecordingSink {
            ends: Vec<u32>,
        }
        impl AssignTraceSink for RecordingSink {
            fn on_pass_end(&mut self, e: &PassEndEvent) {
                self.ends.push(e.iterations);
            }
        }

        let mut sink = RecordingSink { ends: Vec::new() };
        let mut tracer = Tracer::new(&mut sink);
        tracer.pass_end(&sample_end());
        // Access sink after tracer is dropped.
        drop(tracer);
        assert_eq!(sink.ends, &[2]);
    }
}
