// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pretty-printing, recording, and JSON dumps for tessera diagnostics.
//!
//! This crate provides [`AssignTraceSink`](tessera_core::trace::AssignTraceSink)
//! implementations and dump helpers for development and post-mortem
//! analysis:
//!
//! - [`pretty::PrettyPrintSink`]: human-readable one-line-per-event output.
//! - [`recorder::RecorderSink`]: keeps every event in memory for inspection.
//! - [`dump`]: JSON snapshots of a [`FrameResult`](tessera_core::frame::FrameResult).
//! - [`catalog`]: restriction tables read from or written to JSON.
//! - [`hook::JsonDumpHook`]: a runtime diagnostics hook that dumps every
//!   fallback and abandoned frame.

pub mod catalog;
pub mod dump;
pub mod hook;
pub mod pretty;
pub mod recorder;

pub use catalog::load_catalog_json;
pub use dump::dump_frame;
pub use hook::JsonDumpHook;
pub use pretty::PrettyPrintSink;
pub use recorder::RecorderSink;
