// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON snapshots of assignment results.
//!
//! [`frame_json`] turns a [`FrameResult`] into a [`Value`] with one entry
//! per layer and per enabled window, suitable for bug reports and for
//! diffing two frames.

use std::io::Write;

use kurbo::Rect;
use serde_json::{Value, json};

use tessera_core::display::DisplayId;
use tessera_core::engine::Source;
use tessera_core::frame::FrameResult;
use tessera_core::group::CompositionGroup;
use tessera_core::reason::RejectReason;

/// Flag names of `reason`, in bit order.
#[must_use]
pub fn reason_names(reason: RejectReason) -> Vec<&'static str> {
    reason.iter_names().map(|(name, _)| name).collect()
}

fn rect_json(r: Rect) -> Value {
    json!([r.x0, r.y0, r.x1, r.y1])
}

fn source_json(source: Source) -> Value {
    match source {
        Source::Layer { layer, .. } => json!({ "layer": layer.index() }),
        Source::ClientTarget(_) => json!("client-target"),
        Source::SecondaryTarget(_) => json!("secondary-target"),
    }
}

fn group_json(group: &CompositionGroup) -> Value {
    let Some((first, last)) = group.range() else {
        return Value::Null;
    };
    json!({
        "first": first,
        "last": last,
        "otf": group.otf().map(|e| e.index()),
        "m2m": group.m2m().map(|e| e.index()),
        "window": group.window(),
        "target": group.target().map(|t| json!({
            "format": format!("{:?}", t.format),
            "width": t.width,
            "height": t.height,
            "hdr": format!("{:?}", t.hdr),
        })),
        "skip": group.skip(),
    })
}

/// Snapshot of `result` for `display`.
#[must_use]
pub fn frame_json(display: DisplayId, result: &FrameResult) -> Value {
    let layers: Vec<Value> = result
        .layers
        .iter()
        .map(|d| {
            json!({
                "z": d.z,
                "layer": d.layer.index(),
                "requested": format!("{:?}", d.requested),
                "composition": format!("{:?}", d.composition),
                "window": d.window,
                "otf": d.otf.map(|e| e.index()),
                "m2m": d.m2m.map(|e| e.index()),
                "reject": reason_names(d.reject),
            })
        })
        .collect();
    let windows: Vec<Value> = result
        .enabled_windows()
        .map(|w| {
            json!({
                "index": w.index,
                "state": format!("{:?}", w.state),
                "engine": w.engine.map(|e| e.index()),
                "source": w.source.map_or(Value::Null, source_json),
                "src": rect_json(w.src.rect),
                "dst": rect_json(w.dst),
                "format": format!("{:?}", w.src.format),
                "blend": format!("{:?}", w.blend),
                "alpha": w.plane_alpha,
            })
        })
        .collect();
    json!({
        "display": display.0,
        "iterations": result.iterations,
        "reused": result.reused,
        "error_case": result.error_case,
        "fault": result.fault.as_ref().map(ToString::to_string),
        "types_changed": result.types_changed,
        "requests_changed": result.requests_changed,
        "client": group_json(&result.client),
        "secondary": group_json(&result.secondary),
        "layers": layers,
        "windows": windows,
    })
}

/// Writes [`frame_json`] to `writer`, pretty-printed.
pub fn dump_frame<W: Write>(
    writer: W,
    display: DisplayId,
    result: &FrameResult,
) -> Result<(), serde_json::Error> {
    serde_json::to_writer_pretty(writer, &frame_json(display, result))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use tessera_core::assign::AssignmentEngine;
    use tessera_core::config::AssignConfig;
    use tessera_core::display::{Display, DisplayKind};
    use tessera_core::engine::EngineDesc;
    use tessera_core::format::PixelFormat;
    use tessera_core::layer::{BufferDesc, RequestedComposition};
    use tessera_core::pool::ResourcePool;
    use tessera_core::realloc::ReallocGate;
    use tessera_core::restriction::RestrictionCatalog;
    use tessera_core::trace::Tracer;

    fn sample() -> FrameResult {
        let config = AssignConfig::mobile();
        let engine = AssignmentEngine::new(config).unwrap();
        let mut pool = ResourcePool::with_layout(
            Arc::new(RestrictionCatalog::builtin()),
            config.capacity_ceiling,
            &EngineDesc::mobile_layout(),
        );
        let mut display = Display::new(DisplayId(0), DisplayKind::Primary, 1920, 1080);
        let layers = display.layers_mut();
        for requested in [RequestedComposition::Device, RequestedComposition::Client] {
            let id = layers.create_layer();
            layers.set_buffer(id, BufferDesc::new(PixelFormat::Rgba8888, 1920, 1080));
            layers.set_display_frame(id, Rect::new(0.0, 0.0, 1920.0, 1080.0));
            layers.set_composition_type(id, requested);
        }
        engine
            .assign(&mut display, &mut pool, &ReallocGate::new(), &mut Tracer::none())
            .unwrap()
    }

    #[test]
    fn frame_dump_lists_layers_and_windows() {
        let value = frame_json(DisplayId(0), &sample());
        assert_eq!(value["layers"].as_array().unwrap().len(), 2);
        assert_eq!(value["layers"][0]["composition"], "Device");
        assert_eq!(value["layers"][1]["reject"][0], "FORCED_CLIENT");
        assert_eq!(value["client"]["first"], 1);
        assert_eq!(value["windows"].as_array().unwrap().len(), 2);
        assert_eq!(value["windows"][1]["source"], "client-target");
        assert!(value["secondary"].is_null());
    }

    #[test]
    fn dump_frame_is_valid_json() {
        let mut buf = Vec::new();
        dump_frame(&mut buf, DisplayId(0), &sample()).unwrap();
        let parsed: Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed["display"], 0);
        assert_eq!(parsed["error_case"], false);
    }
}
