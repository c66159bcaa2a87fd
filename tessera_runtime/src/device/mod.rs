// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The device root and the per-display frame lifecycle.
//!
//! [`Device`] owns the resource pool shared by every display, the
//! reallocation gate, and the worker threads. Each display sits behind its
//! own lock in a [`DisplayHandle`]; a frame moves through
//! [`FrameState::NotValidated`] → [`Validated`](FrameState::Validated) →
//! [`Presented`](FrameState::Presented).
//!
//! Lock order is display first, then pool. The pool lock is held only for
//! the assignment pass and for marking engines running at present.


use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tessera_core::assign::AssignmentEngine;
use tessera_core::config::AssignConfig;
use tessera_core::display::{Display, DisplayId, DisplayKind};
use tessera_core::engine::{EngineDesc, EngineId, Source};
use tessera_core::frame::FrameResult;
use tessera_core::pool::ResourcePool;
use tessera_core::realloc::ReallocGate;
use tessera_core::restriction::RestrictionCatalog;
use tessera_core::trace::Tracer;
use tessera_core::window::FenceHandle;

use crate::config::{ReallocConfig, RecompositionConfig};
use crate::driver::{DiagnosticHook, DisplayController, DstBufferAllocator, LogHook};
use crate::error::FrameError;
use crate::fence::FenceGuard;
use crate::realloc::BackgroundReallocator;
use crate::recomposition::{RecompositionMonitor, RecompositionSwitch};

/// Where a display is in its frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FrameState {
    /// Layers changed since the last validate.
    #[default]
    NotValidated,
    /// A pass ran; the result may be presented.
    Validated,
    /// The result was handed to the display controller.
    Presented,
}

#[derive(Debug)]
struct DisplaySlot {
    display: Display,
    state: FrameState,
    accepted: bool,
    fences: Vec<(Source, FenceHandle)>,
}

impl DisplaySlot {
    fn close_fences(&mut self, controller: &dyn DisplayController) {
        for (_, fence) in self.fences.drain(..) {
            controller.close_fence(fence);
        }
    }
}

/// One display and its frame state, behind the display's lock.
#[derive(Debug)]
pub struct DisplayHandle {
    id: DisplayId,
    slot: Mutex<DisplaySlot>,
    presents: AtomicU64,
}

impl DisplayHandle {
    fn new(display: Display) -> Self {
        Self {
            id: display.id(),
            slot: Mutex::new(DisplaySlot {
                display,
                state: FrameState::NotValidated,
                accepted: false,
                fences: Vec::new(),
            }),
            presents: AtomicU64::new(0),
        }
    }

    /// Display id.
    #[must_use]
    pub fn id(&self) -> DisplayId {
        self.id
    }

    /// Frame state.
    #[must_use]
    pub fn state(&self) -> FrameState {
        self.slot.lock().state
    }

    /// Frames presented so far.
    #[must_use]
    pub fn presents(&self) -> u64 {
        self.presents.load(Ordering::Relaxed)
    }

    /// Runs `f` on the display under its lock. The frame returns to
    /// [`FrameState::NotValidated`].
    pub fn edit<R>(&self, f: impl FnOnce(&mut Display) -> R) -> R {
        let mut slot = self.slot.lock();
        slot.state = FrameState::NotValidated;
        f(&mut slot.display)
    }

    /// Runs `f` on the display under its lock without touching the frame
    /// state.
    pub fn inspect<R>(&self, f: impl FnOnce(&Display) -> R) -> R {
        f(&self.slot.lock().display)
    }
}

/// Root object: shared pool, displays, gate, and worker threads.
pub struct Device {
    engine: AssignmentEngine,
    pool: Arc<Mutex<ResourcePool>>,
    gate: Arc<ReallocGate>,
    switch: Arc<RecompositionSwitch>,
    displays: Vec<Arc<DisplayHandle>>,
    controller: Arc<dyn DisplayController>,
    diagnostics: Arc<dyn DiagnosticHook>,
    reallocator: Option<BackgroundReallocator>,
    monitor: Option<RecompositionMonitor>,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("engine", &self.engine)
            .field("displays", &self.displays.len())
            .field("reallocator", &self.reallocator)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl Device {
    /// Creates a device with the engines in `layout`.
    pub fn new(
        config: AssignConfig,
        catalog: RestrictionCatalog,
        layout: &[EngineDesc],
        controller: Arc<dyn DisplayController>,
    ) -> Result<Self, FrameError> {
        let engine = AssignmentEngine::new(config)?;
        let pool = ResourcePool::with_layout(Arc::new(catalog), config.capacity_ceiling, layout);
        log::info!(
            "device created with {} engines ({:?} restriction table)",
            pool.engines().len(),
            pool.catalog().origin()
        );
        Ok(Self {
            engine,
            pool: Arc::new(Mutex::new(pool)),
            gate: Arc::new(ReallocGate::new()),
            switch: Arc::new(RecompositionSwitch::new()),
            displays: Vec::new(),
            controller,
            diagnostics: Arc::new(LogHook),
            reallocator: None,
            monitor: None,
        })
    }

    /// Replaces the hook told about fallbacks and abandoned frames.
    pub fn set_diagnostics(&mut self, hook: Arc<dyn DiagnosticHook>) {
        self.diagnostics = hook;
    }

    /// The shared resource pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<Mutex<ResourcePool>> {
        &self.pool
    }

    /// The reallocation gate.
    #[must_use]
    pub fn gate(&self) -> &Arc<ReallocGate> {
        &self.gate
    }

    /// The device-wide recomposition mode.
    #[must_use]
    pub fn recomposition(&self) -> &Arc<RecompositionSwitch> {
        &self.switch
    }

    /// Adds a display.
    ///
    /// Displays added after [`start_recomposition_monitor`] are not
    /// sampled.
    ///
    /// [`start_recomposition_monitor`]: Self::start_recomposition_monitor
    pub fn add_display(
        &mut self,
        kind: DisplayKind,
        width: u32,
        height: u32,
    ) -> Arc<DisplayHandle> {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "a device drives a handful of displays"
        )]
        let id = DisplayId(self.displays.len() as u32);
        let handle = Arc::new(DisplayHandle::new(Display::new(id, kind, width, height)));
        self.displays.push(Arc::clone(&handle));
        log::info!("{id:?}: added {kind:?} display {width}x{height}");
        handle
    }

    /// Looks up a display.
    pub fn display(&self, id: DisplayId) -> Result<&Arc<DisplayHandle>, FrameError> {
        self.displays
            .get(id.0 as usize)
            .ok_or(FrameError::UnknownDisplay(id))
    }

    /// Pre-binds `engine` to `display`.
    pub fn reserve(&self, engine: EngineId, display: DisplayId) -> Result<(), FrameError> {
        let handle = self.display(display)?;
        let mut slot = handle.slot.lock();
        self.pool.lock().reserve(engine, display)?;
        slot.display.force_validate();
        slot.state = FrameState::NotValidated;
        Ok(())
    }

    /// Hands the runtime the acquire fence of `source` for the next
    /// present. A fence already held for `source` is closed.
    pub fn set_acquire_fence(
        &self,
        display: DisplayId,
        source: Source,
        fence: FenceHandle,
    ) -> Result<(), FrameError> {
        let handle = self.display(display)?;
        let mut slot = handle.slot.lock();
        if let Some(entry) = slot.fences.iter_mut().find(|(s, _)| *s == source) {
            let old = core::mem::replace(&mut entry.1, fence);
            self.controller.close_fence(old);
        } else {
            slot.fences.push((source, fence));
        }
        Ok(())
    }

    /// Changes the panel resolution and, with a reallocator running, asks
    /// for matching M2M destination buffers.
    pub fn set_resolution(
        &self,
        display: DisplayId,
        width: u32,
        height: u32,
    ) -> Result<(), FrameError> {
        self.display(display)?.edit(|d| d.set_resolution(width, height));
        if let Some(reallocator) = &self.reallocator {
            reallocator.request_realloc(width, height);
        }
        Ok(())
    }

    /// Starts the background reallocation worker for every engine that
    /// owns destination buffers.
    pub fn start_reallocator<A: DstBufferAllocator + 'static>(
        &mut self,
        allocator: A,
        config: ReallocConfig,
    ) -> Result<(), FrameError> {
        let engines: Vec<EngineId> = self
            .pool
            .lock()
            .engines()
            .iter()
            .filter(|e| e.desc().owns_dst_buffers)
            .map(|e| e.id())
            .collect();
        self.reallocator = Some(BackgroundReallocator::spawn(
            Arc::clone(&self.gate),
            engines,
            allocator,
            config,
        )?);
        Ok(())
    }

    /// The reallocation worker, if started.
    #[must_use]
    pub fn reallocator(&self) -> Option<&BackgroundReallocator> {
        self.reallocator.as_ref()
    }

    /// Starts sampling present rates of the current displays.
    pub fn start_recomposition_monitor(
        &mut self,
        config: RecompositionConfig,
    ) -> Result<(), FrameError> {
        self.monitor = Some(RecompositionMonitor::spawn(
            self.displays.clone(),
            Arc::clone(&self.switch),
            config,
        )?);
        Ok(())
    }

    /// Stops both worker threads.
    pub fn shutdown(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.shutdown();
        }
        if let Some(mut reallocator) = self.reallocator.take() {
            reallocator.shutdown();
        }
    }

    /// Runs the assignment pass for the next frame of `display`.
    ///
    /// A frame that fell back to full client composition is still `Ok`;
    /// the diagnostics hook sees it and the next validate runs a full
    /// pass. An abandoned frame closes every pending fence, invokes the
    /// controller's panic hook, and returns the error.
    pub fn validate(
        &self,
        display: DisplayId,
        tracer: &mut Tracer<'_>,
    ) -> Result<FrameResult, FrameError> {
        let handle = self.display(display)?;
        let mut slot = handle.slot.lock();
        slot.display.set_recomposition_mode(self.switch.get());
        let outcome = {
            let mut pool = self.pool.lock();
            self.engine.assign(&mut slot.display, &mut pool, &self.gate, tracer)
        };
        match outcome {
            Ok(result) => {
                if result.error_case {
                    self.diagnostics.on_fallback(&slot.display, &result);
                    slot.display.force_validate();
                }
                slot.state = FrameState::Validated;
                slot.accepted = !result.types_changed;
                Ok(result)
            }
            Err(err) => {
                self.diagnostics.on_abandoned(&slot.display, &err);
                self.controller.force_panic(display, &err.to_string());
                slot.close_fences(&*self.controller);
                slot.state = FrameState::NotValidated;
                Err(err.into())
            }
        }
    }

    /// Acknowledges the composition types of the validated frame.
    pub fn accept_changes(&self, display: DisplayId) -> Result<(), FrameError> {
        let handle = self.display(display)?;
        let mut slot = handle.slot.lock();
        if slot.state != FrameState::Validated {
            return Err(FrameError::NotValidated(display));
        }
        slot.accepted = true;
        Ok(())
    }

    /// Hands the validated window array to the display controller.
    ///
    /// Acquire fences of bound windows go to the controller with the
    /// array; every other pending fence is closed, whether or not the
    /// commit succeeds. Returns the retire fence.
    pub fn present(&self, display: DisplayId) -> Result<FenceHandle, FrameError> {
        let handle = self.display(display)?;
        let mut guard = handle.slot.lock();
        let slot = &mut *guard;
        if slot.state != FrameState::Validated {
            return Err(FrameError::NotValidated(display));
        }
        if !slot.accepted {
            return Err(FrameError::ChangesNotAccepted(display));
        }
        let mut windows = slot
            .display
            .last_result()
            .map(|r| r.windows.clone())
            .ok_or(FrameError::NotValidated(display))?;

        let controller = &*self.controller;
        let mut pending: Vec<(Source, FenceGuard<'_>)> = slot
            .fences
            .drain(..)
            .map(|(source, fence)| (source, FenceGuard::new(fence, controller)))
            .collect();
        let mut bound = Vec::new();
        for window in windows.iter_mut().filter(|w| w.is_enabled()) {
            let Some(source) = window.source else {
                continue;
            };
            if let Some(i) = pending.iter().position(|(s, _)| *s == source) {
                let (_, fence) = pending.swap_remove(i);
                window.acquire_fence = fence.fence();
                bound.push(fence);
            }
        }

        self.pool.lock().mark_running(display);
        match controller.commit(display, &windows) {
            Ok(retire) => {
                for fence in bound {
                    let _ = fence.hand_off();
                }
                slot.state = FrameState::Presented;
                handle.presents.fetch_add(1, Ordering::Relaxed);
                Ok(retire)
            }
            Err(err) => {
                log::warn!("{display:?}: commit failed: {err}");
                slot.display.force_validate();
                slot.state = FrameState::NotValidated;
                Err(err.into())
            }
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.shutdown();
    }
}
