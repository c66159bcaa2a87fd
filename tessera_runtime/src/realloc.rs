// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Background re-provisioning of M2M destination buffers.
//!
//! [`BackgroundReallocator`] owns one worker thread. Requests coalesce:
//! only the most recent size is acted on. While the worker replaces
//! buffers it holds the shared [`ReallocGate`] closed for the affected
//! engines, and every display's assignment pass routes work away from
//! them. The frame path never waits on the worker.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tessera_core::engine::EngineId;
use tessera_core::realloc::ReallocGate;

use crate::config::ReallocConfig;
use crate::driver::DstBufferAllocator;
use crate::error::FrameError;

const THREAD_NAME: &str = "tessera-realloc";

#[derive(Debug, Default)]
struct Queue {
    pending: Option<(u32, u32)>,
    running: bool,
    completed: u64,
}

#[derive(Debug, Default)]
struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
    done: Condvar,
    shutdown: AtomicBool,
}

/// Worker that reallocates destination buffers off the frame path.
pub struct BackgroundReallocator {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for BackgroundReallocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundReallocator")
            .field("running", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl BackgroundReallocator {
    /// Starts the worker for `engines`.
    pub fn spawn<A: DstBufferAllocator + 'static>(
        gate: Arc<ReallocGate>,
        engines: Vec<EngineId>,
        allocator: A,
        config: ReallocConfig,
    ) -> Result<Self, FrameError> {
        let shared = Arc::new(Shared::default());
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_owned())
            .spawn(move || run(&worker, &gate, &engines, allocator, config))
            .map_err(|source| FrameError::Spawn {
                name: THREAD_NAME,
                source,
            })?;
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Asks for buffers sized `width` x `height`, replacing any request
    /// the worker has not started yet.
    pub fn request_realloc(&self, width: u32, height: u32) {
        let mut queue = self.shared.queue.lock();
        if queue.pending.replace((width, height)).is_some() {
            log::trace!("reallocation request coalesced into {width}x{height}");
        }
        drop(queue);
        self.shared.wake.notify_one();
    }

    /// Reallocations finished so far.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.shared.queue.lock().completed
    }

    /// Blocks until no request is pending or running, or `timeout` passes.
    /// Returns whether the worker went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.shared.queue.lock();
        while queue.running || queue.pending.is_some() {
            if self.shared.done.wait_until(&mut queue, deadline).timed_out() {
                return !queue.running && queue.pending.is_none();
            }
        }
        true
    }

    /// Stops the worker after the reallocation in progress, if any.
    /// Pending requests are dropped.
    pub fn shutdown(&mut self) {
        {
            let _queue = self.shared.queue.lock();
            self.shared.shutdown.store(true, Ordering::Release);
        }
        self.shared.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{THREAD_NAME} thread panicked");
            }
        }
    }
}

impl Drop for BackgroundReallocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<A: DstBufferAllocator>(
    shared: &Shared,
    gate: &ReallocGate,
    engines: &[EngineId],
    mut allocator: A,
    config: ReallocConfig,
) {
    log::info!("{THREAD_NAME} started for {} engines", engines.len());
    loop {
        let mut queue = shared.queue.lock();
        while queue.pending.is_none() && !shared.shutdown.load(Ordering::Acquire) {
            shared.wake.wait(&mut queue);
        }
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        if !config.settle.is_zero() {
            let _ = shared.wake.wait_for(&mut queue, config.settle);
            if shared.shutdown.load(Ordering::Acquire) {
                break;
            }
        }
        let Some((width, height)) = queue.pending.take() else {
            continue;
        };
        queue.running = true;
        drop(queue);

        reallocate(gate, engines, &mut allocator, width, height);

        let mut queue = shared.queue.lock();
        queue.running = false;
        queue.completed += 1;
        drop(queue);
        shared.done.notify_all();
    }
    shared.done.notify_all();
    log::info!("{THREAD_NAME} stopped");
}

/// Reopens the gate when dropped, including on unwind.
struct OpenOnDrop<'a>(&'a ReallocGate);

impl Drop for OpenOnDrop<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

fn reallocate<A: DstBufferAllocator>(
    gate: &ReallocGate,
    engines: &[EngineId],
    allocator: &mut A,
    width: u32,
    height: u32,
) {
    if !gate.begin(engines) {
        log::warn!("reallocation gate already closed; dropping {width}x{height} request");
        return;
    }
    let _open = OpenOnDrop(gate);
    let mut failed = 0_usize;
    for &engine in engines {
        if let Err(err) = allocator.realloc(engine, width, height) {
            log::warn!("{engine:?}: destination buffer reallocation failed: {err}");
            failed += 1;
        }
    }
    log::debug!(
        "reallocated destination buffers to {width}x{height} ({failed} of {} failed)",
        engines.len()
    );
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use tessera_core::engine::EngineDesc;
    use tessera_core::pool::ResourcePool;
    use tessera_core::realloc::GateState;
    use tessera_core::restriction::RestrictionCatalog;

    use super::*;
    use crate::error::DriverError;

    fn m2m_engines() -> Vec<EngineId> {
        let pool = ResourcePool::with_layout(
            Arc::new(RestrictionCatalog::builtin()),
            1.0,
            &EngineDesc::mobile_layout(),
        );
        pool.engines()
            .iter()
            .filter(|e| e.desc().owns_dst_buffers)
            .map(|e| e.id())
            .collect()
    }

    /// Records every call and the gate state it saw.
    struct Recording {
        gate: Arc<ReallocGate>,
        calls: mpsc::Sender<(EngineId, u32, u32, GateState)>,
        hold: Option<mpsc::Receiver<()>>,
        fail: bool,
    }

    impl DstBufferAllocator for Recording {
        fn realloc(
            &mut self,
            engine: EngineId,
            width: u32,
            height: u32,
        ) -> Result<(), DriverError> {
            let gated = self.gate.is_reallocating(engine);
            assert!(gated, "{engine:?} not gated during reallocation");
            let _ = self.calls.send((engine, width, height, self.gate.state()));
            if let Some(hold) = self.hold.take() {
                let _ = hold.recv();
            }
            if self.fail {
                return Err(DriverError {
                    op: "realloc",
                    code: -12,
                });
            }
            Ok(())
        }
    }

    #[test]
    fn gate_is_closed_only_while_reallocating() {
        let gate = Arc::new(ReallocGate::new());
        let engines = m2m_engines();
        let (tx, rx) = mpsc::channel();
        let allocator = Recording {
            gate: Arc::clone(&gate),
            calls: tx,
            hold: None,
            fail: false,
        };
        let worker = BackgroundReallocator::spawn(
            Arc::clone(&gate),
            engines.clone(),
            allocator,
            ReallocConfig::immediate(),
        )
        .unwrap();

        worker.request_realloc(1280, 720);
        assert!(worker.wait_idle(Duration::from_secs(5)));
        let calls: Vec<_> = rx.try_iter().collect();
        assert_eq!(calls.len(), engines.len());
        assert!(
            calls
                .iter()
                .all(|&(_, w, h, s)| (w, h, s) == (1280, 720, GateState::Reallocating))
        );
        assert_eq!(gate.state(), GateState::Idle);
        assert_eq!(gate.epoch(), 2);
        assert_eq!(worker.completed(), 1);
    }

    #[test]
    fn requests_during_a_reallocation_coalesce() {
        let gate = Arc::new(ReallocGate::new());
        let engines = m2m_engines();
        let (tx, rx) = mpsc::channel();
        let (release, hold) = mpsc::channel();
        let allocator = Recording {
            gate: Arc::clone(&gate),
            calls: tx,
            hold: Some(hold),
            fail: false,
        };
        let worker = BackgroundReallocator::spawn(
            Arc::clone(&gate),
            engines.clone(),
            allocator,
            ReallocConfig::immediate(),
        )
        .unwrap();

        worker.request_realloc(100, 100);
        // The first call blocks until released.
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!((first.1, first.2), (100, 100));
        worker.request_realloc(200, 200);
        worker.request_realloc(300, 300);
        release.send(()).unwrap();

        assert!(worker.wait_idle(Duration::from_secs(5)));
        let sizes: Vec<(u32, u32)> = rx.try_iter().map(|c| (c.1, c.2)).collect();
        assert!(!sizes.contains(&(200, 200)), "stale request ran: {sizes:?}");
        assert_eq!(sizes.iter().filter(|&&s| s == (300, 300)).count(), engines.len());
        assert_eq!(worker.completed(), 2);
    }

    #[test]
    fn failed_allocation_still_reopens_the_gate() {
        let gate = Arc::new(ReallocGate::new());
        let (tx, _rx) = mpsc::channel();
        let allocator = Recording {
            gate: Arc::clone(&gate),
            calls: tx,
            hold: None,
            fail: true,
        };
        let worker = BackgroundReallocator::spawn(
            Arc::clone(&gate),
            m2m_engines(),
            allocator,
            ReallocConfig::immediate(),
        )
        .unwrap();
        worker.request_realloc(640, 480);
        assert!(worker.wait_idle(Duration::from_secs(5)));
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[test]
    fn shutdown_joins_an_idle_worker() {
        let gate = Arc::new(ReallocGate::new());
        let (tx, _rx) = mpsc::channel();
        let allocator = Recording {
            gate: Arc::clone(&gate),
            calls: tx,
            hold: None,
            fail: false,
        };
        let mut worker =
            BackgroundReallocator::spawn(gate, Vec::new(), allocator, ReallocConfig::new())
                .unwrap();
        worker.shutdown();
        assert!(worker.handle.is_none());
        assert_eq!(worker.completed(), 0);
    }
}
