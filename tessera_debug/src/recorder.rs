// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory trace recording.

use tessera_core::trace::{
    AssignTraceSink, DemotionEvent, PassBeginEvent, PassEndEvent, RetryEvent, WindowBoundEvent,
};

/// One recorded trace event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    /// See [`AssignTraceSink::on_pass_begin`].
    PassBegin(PassBeginEvent),
    /// See [`AssignTraceSink::on_demotion`].
    Demotion(DemotionEvent),
    /// See [`AssignTraceSink::on_retry`].
    Retry(RetryEvent),
    /// See [`AssignTraceSink::on_window_bound`].
    WindowBound(WindowBoundEvent),
    /// See [`AssignTraceSink::on_pass_end`].
    PassEnd(PassEndEvent),
}

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct RecorderSink {
    events: Vec<TraceEvent>,
}

impl RecorderSink {
    /// An empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far.
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Demotions recorded so far.
    pub fn demotions(&self) -> impl Iterator<Item = &DemotionEvent> {
        self.events.iter().filter_map(|e| match e {
            TraceEvent::Demotion(d) => Some(d),
            _ => None,
        })
    }

    /// The most recent pass summary.
    #[must_use]
    pub fn last_pass(&self) -> Option<&PassEndEvent> {
        self.events.iter().rev().find_map(|e| match e {
            TraceEvent::PassEnd(p) => Some(p),
            _ => None,
        })
    }

    /// Drops everything recorded.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl AssignTraceSink for RecorderSink {
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        self.events.push(TraceEvent::PassBegin(*e));
    }

    fn on_demotion(&mut self, e: &DemotionEvent) {
        self.events.push(TraceEvent::Demotion(*e));
    }

    fn on_retry(&mut self, e: &RetryEvent) {
        self.events.push(TraceEvent::Retry(*e));
    }

    fn on_window_bound(&mut self, e: &WindowBoundEvent) {
        self.events.push(TraceEvent::WindowBound(*e));
    }

    fn on_pass_end(&mut self, e: &PassEndEvent) {
        self.events.push(TraceEvent::PassEnd(*e));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kurbo::Rect;

    use super::*;
    use tessera_core::assign::AssignmentEngine;
    use tessera_core::config::AssignConfig;
    use tessera_core::dirty::GeometryChange;
    use tessera_core::display::{Display, DisplayId, DisplayKind};
    use tessera_core::engine::EngineDesc;
    use tessera_core::format::PixelFormat;
    use tessera_core::layer::{BufferDesc, RequestedComposition};
    use tessera_core::pool::ResourcePool;
    use tessera_core::realloc::ReallocGate;
    use tessera_core::reason::RejectReason;
    use tessera_core::restriction::RestrictionCatalog;
    use tessera_core::trace::Tracer;

    #[test]
    fn records_a_full_pass_then_a_reuse() {
        let config = AssignConfig::mobile();
        let engine = AssignmentEngine::new(config).unwrap();
        let mut pool = ResourcePool::with_layout(
            Arc::new(RestrictionCatalog::builtin()),
            config.capacity_ceiling,
            &EngineDesc::mobile_layout(),
        );
        let gate = ReallocGate::new();
        let mut display = Display::new(DisplayId(0), DisplayKind::Primary, 1920, 1080);
        let layers = display.layers_mut();
        for requested in [RequestedComposition::Device, RequestedComposition::Client] {
            let id = layers.create_layer();
            layers.set_buffer(id, BufferDesc::new(PixelFormat::Rgba8888, 1920, 1080));
            layers.set_display_frame(id, Rect::new(0.0, 0.0, 1920.0, 1080.0));
            layers.set_composition_type(id, requested);
        }

        let mut sink = RecorderSink::new();
        engine
            .assign(&mut display, &mut pool, &gate, &mut Tracer::new(&mut sink))
            .unwrap();
        assert!(matches!(sink.events()[0], TraceEvent::PassBegin(_)));
        let demoted: Vec<_> = sink.demotions().collect();
        assert_eq!(demoted.len(), 1);
        assert!(demoted[0].reason.contains(RejectReason::FORCED_CLIENT));
        let end = sink.last_pass().unwrap();
        assert_eq!((end.device, end.client), (1, 1));
        assert!(!end.reused);

        sink.clear();
        engine
            .assign(&mut display, &mut pool, &gate, &mut Tracer::new(&mut sink))
            .unwrap();
        assert_eq!(sink.events().len(), 1);
        assert!(sink.last_pass().unwrap().reused);

        // A reallocation that came and went still invalidates the result.
        assert!(gate.begin(&[pool.engines()[6].id()]));
        gate.finish();
        sink.clear();
        engine
            .assign(&mut display, &mut pool, &gate, &mut Tracer::new(&mut sink))
            .unwrap();
        let TraceEvent::PassBegin(begin) = sink.events()[0] else {
            panic!("expected a full pass, got {:?}", sink.events()[0]);
        };
        assert_eq!(begin.causes, GeometryChange::REALLOC);
        assert!(!sink.last_pass().unwrap().reused);
    }
}
