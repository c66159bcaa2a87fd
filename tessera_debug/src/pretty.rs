// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`AssignTraceSink`] and writes one line per
//! event to a [`Write`](std::io::Write) destination (default: stderr).

use std::io::Write;

use tessera_core::engine::Source;
use tessera_core::trace::{
    AssignTraceSink, DemotionEvent, PassBeginEvent, PassEndEvent, RetryEvent, WindowBoundEvent,
};

use crate::dump::reason_names;

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns the destination.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn source_label(source: Source) -> String {
    match source {
        Source::Layer { layer, .. } => format!("layer {}.{}", layer.index(), layer.generation()),
        Source::ClientTarget(_) => "client-target".to_owned(),
        Source::SecondaryTarget(_) => "secondary-target".to_owned(),
    }
}

impl<W: Write> AssignTraceSink for PrettyPrintSink<W> {
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[pass:begin] display={} frame={} layers={} reclassified={} causes={:?}",
            e.display.0, e.frame_index, e.layers, e.reclassified, e.causes,
        );
    }

    fn on_demotion(&mut self, e: &DemotionEvent) {
        let _ = writeln!(
            self.writer,
            "[demote] display={} z={} reason={}",
            e.display.0,
            e.z,
            reason_names(e.reason).join("|"),
        );
    }

    fn on_retry(&mut self, e: &RetryEvent) {
        let _ = writeln!(
            self.writer,
            "[retry] display={} iteration={} pinned={}",
            e.display.0, e.iteration, e.pinned,
        );
    }

    fn on_window_bound(&mut self, e: &WindowBoundEvent) {
        let _ = writeln!(
            self.writer,
            "[window] display={} win={} engine={} {}",
            e.display.0,
            e.window,
            e.engine.index(),
            source_label(e.source),
        );
    }

    fn on_pass_end(&mut self, e: &PassEndEvent) {
        let outcome = if e.fallback {
            "FALLBACK"
        } else if e.reused {
            "reused"
        } else {
            "ok"
        };
        let _ = writeln!(
            self.writer,
            "[pass:end] display={} iterations={} device={} secondary={} client={} {outcome}",
            e.display.0, e.iterations, e.device, e.secondary, e.client,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::display::DisplayId;
    use tessera_core::layer::LayerStore;
    use tessera_core::reason::RejectReason;

    #[test]
    fn pretty_print_demotion() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_demotion(&DemotionEvent {
            display: DisplayId(0),
            layer: LayerStore::new().create_layer(),
            z: 2,
            reason: RejectReason::FORCED_CLIENT | RejectReason::EXCEEDS_LAYER_BUDGET,
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.contains("[demote]"), "got: {output}");
        assert!(output.contains("FORCED_CLIENT|EXCEEDS_LAYER_BUDGET"), "got: {output}");
    }

    #[test]
    fn pretty_print_fallback() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_pass_end(&PassEndEvent {
            display: DisplayId(1),
            iterations: 3,
            client: 4,
            device: 0,
            secondary: 0,
            fallback: true,
            reused: false,
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.contains("FALLBACK"), "got: {output}");
        assert!(output.contains("display=1"), "got: {output}");
    }
}
