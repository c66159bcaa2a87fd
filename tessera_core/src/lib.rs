// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame assignment of display layers to hardware composition engines.
//!
//! `tessera_core` decides, for every frame of every display, which layers
//! are scanned out by a hardware window, which are batched through a shared
//! secondary compositor, and which are composed by the client into one
//! target buffer. It is `no_std` compatible (with `alloc`) and keeps layers
//! in struct-of-arrays storage with generational handles.
//!
//! # Architecture
//!
//! ```text
//!   LayerStore setters ──► dirty channels + GeometryChange bits
//!                                │
//!                                ▼
//!   AssignmentEngine::assign(display, pool, gate)
//!       │  classify ──► pin policies ──► retry loop ──► local search
//!       │                                   │
//!       │                     ResourcePool (engines, capacity, claims)
//!       ▼
//!   FrameResult ──► WindowSlot array ──► display controller
//! ```
//!
//! **[`layer`]**: Layer storage, generational handles, and change draining.
//! Setters compare before writing and record why a new pass is needed.
//!
//! **[`classify`]**: Per-layer capability against every engine type, cached
//! until an assignment-relevant attribute changes.
//!
//! **[`restriction`]**: The capability catalog of each physical engine
//! type: formats, size and scale limits, alignment, capacity model.
//!
//! **[`pool`]**: The [`ResourcePool`](pool::ResourcePool) owns every
//! engine instance, tracks per-type capacity, and records priority claims
//! between displays. There is no global state; callers own the pool.
//!
//! **[`assign`]**: The [`AssignmentEngine`](assign::AssignmentEngine) and
//! its bounded retry loop.
//!
//! **[`group`]**, **[`window`]**, **[`frame`]**: Composition groups, the
//! window array, and the per-frame result.
//!
//! **[`realloc`]**: The lock-free gate between background buffer
//! reallocation and the pass.
//!
//! **[`trace`]**: [`AssignTraceSink`](trace::AssignTraceSink) trait and
//! event types, with a zero-overhead [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `serde` (disabled by default): Serialization of the restriction catalog
//!   and of reject reasons.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod assign;
pub mod classify;
pub mod config;
pub mod dirty;
pub mod display;
pub mod engine;
pub mod error;
pub mod format;
pub mod frame;
pub mod group;
pub mod layer;
pub mod pool;
pub mod realloc;
pub mod reason;
pub mod restriction;
pub mod trace;
pub mod window;
