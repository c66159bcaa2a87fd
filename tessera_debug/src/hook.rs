// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A diagnostics hook that writes JSON dumps.

use std::io::Write;

use parking_lot::Mutex;
use serde_json::json;

use tessera_core::display::Display;
use tessera_core::error::AssignError;
use tessera_core::frame::FrameResult;
use tessera_runtime::DiagnosticHook;

use crate::dump::frame_json;

/// Writes one JSON document per fallback or abandoned frame.
pub struct JsonDumpHook<W: Write + Send = Box<dyn Write + Send>> {
    writer: Mutex<W>,
}

impl<W: Write + Send> std::fmt::Debug for JsonDumpHook<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonDumpHook").finish_non_exhaustive()
    }
}

impl JsonDumpHook {
    /// Dumps to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::with_writer(Box::new(std::io::stderr()))
    }
}

impl<W: Write + Send> JsonDumpHook<W> {
    /// Dumps to `writer`.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the hook and returns the destination.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn emit(&self, value: &serde_json::Value) {
        let mut writer = self.writer.lock();
        if let Err(err) = serde_json::to_writer(&mut *writer, value) {
            log::warn!("diagnostic dump failed: {err}");
            return;
        }
        let _ = writeln!(writer);
    }
}

impl<W: Write + Send> DiagnosticHook for JsonDumpHook<W> {
    fn on_fallback(&self, display: &Display, result: &FrameResult) {
        self.emit(&json!({
            "event": "fallback",
            "frame": display.frame_index(),
            "result": frame_json(display.id(), result),
        }));
    }

    fn on_abandoned(&self, display: &Display, error: &AssignError) {
        self.emit(&json!({
            "event": "abandoned",
            "display": display.id().0,
            "frame": display.frame_index(),
            "layers": display.layers().len(),
            "error": error.to_string(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use tessera_core::display::{DisplayId, DisplayKind};
    use tessera_core::error::{AssignError, Invariant};

    use super::*;

    #[test]
    fn abandoned_frame_is_one_json_line() {
        let hook = JsonDumpHook::with_writer(Vec::<u8>::new());
        let display = Display::new(DisplayId(2), DisplayKind::External, 1280, 720);
        hook.on_abandoned(
            &display,
            &AssignError::InvariantViolation(Invariant::Undecided(0)),
        );
        let output = String::from_utf8(hook.into_inner()).unwrap();
        assert_eq!(output.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(value["event"], "abandoned");
        assert_eq!(value["display"], 2);
        assert!(value["error"].as_str().unwrap().contains("no composition"));
    }
}
