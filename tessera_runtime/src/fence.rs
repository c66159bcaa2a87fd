// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scoped ownership of fences.

use core::fmt;

use tessera_core::window::FenceHandle;

use crate::driver::DisplayController;

/// Closes its fence on drop unless it was handed off.
///
/// Every fence the runtime receives is wrapped in a guard, so an early
/// return from the present path cannot leak one.
pub struct FenceGuard<'a> {
    fence: Option<FenceHandle>,
    controller: &'a dyn DisplayController,
}

impl fmt::Debug for FenceGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FenceGuard")
            .field("fence", &self.fence)
            .finish_non_exhaustive()
    }
}

impl<'a> FenceGuard<'a> {
    /// Takes ownership of `fence`.
    #[must_use]
    pub fn new(fence: FenceHandle, controller: &'a dyn DisplayController) -> Self {
        Self {
            fence: Some(fence),
            controller,
        }
    }

    /// The guarded fence, if still held.
    #[must_use]
    pub fn fence(&self) -> Option<FenceHandle> {
        self.fence
    }

    /// Gives the fence up without closing it.
    pub fn hand_off(mut self) -> Option<FenceHandle> {
        self.fence.take()
    }
}

impl Drop for FenceGuard<'_> {
    fn drop(&mut self) {
        if let Some(fence) = self.fence.take() {
            self.controller.close_fence(fence);
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tessera_core::display::DisplayId;
    use tessera_core::window::WindowSlot;

    use super::*;
    use crate::error::DriverError;

    #[derive(Default)]
    struct Closer(Mutex<Vec<FenceHandle>>);

    impl DisplayController for Closer {
        fn commit(&self, _: DisplayId, _: &[WindowSlot]) -> Result<FenceHandle, DriverError> {
            Ok(FenceHandle(0))
        }

        fn close_fence(&self, fence: FenceHandle) {
            self.0.lock().push(fence);
        }
    }

    #[test]
    fn dropped_guard_closes_its_fence() {
        let closer = Closer::default();
        {
            let _guard = FenceGuard::new(FenceHandle(7), &closer);
        }
        assert_eq!(*closer.0.lock(), vec![FenceHandle(7)]);
    }

    #[test]
    fn handed_off_fence_is_not_closed() {
        let closer = Closer::default();
        let guard = FenceGuard::new(FenceHandle(3), &closer);
        assert_eq!(guard.hand_off(), Some(FenceHandle(3)));
        assert!(closer.0.lock().is_empty());
    }
}
