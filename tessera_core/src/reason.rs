// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Why a layer did not get a hardware path.
//!
//! Rejections are never errors. They are accumulated per layer (and per
//! engine type during classification) so diagnostics can explain each
//! demotion. Every bit belongs to exactly one [`ReasonKind`].

bitflags::bitflags! {
    /// Reasons a layer was kept off an engine or demoted to client
    /// composition.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct RejectReason: u32 {
        // -- Capability --
        /// The engine cannot read the pixel format.
        const UNSUPPORTED_FORMAT = 1 << 0;
        /// Crop or frame outside the size/alignment bounds.
        const UNSUPPORTED_SIZE = 1 << 1;
        /// Scale ratio outside the engine's range.
        const UNSUPPORTED_SCALE = 1 << 2;
        /// Buffer compression the engine cannot decode.
        const UNSUPPORTED_COMPRESSION = 1 << 3;
        /// HDR content on an engine without tone-mapping support.
        const UNSUPPORTED_HDR = 1 << 4;
        /// Protected content on an engine outside the secure path.
        const UNSUPPORTED_DRM = 1 << 5;
        /// Transform the engine cannot apply.
        const UNSUPPORTED_ROTATION = 1 << 6;

        // -- Capacity --
        /// Throughput budget of the engine type is spent.
        const INSUFFICIENT_CAPACITY = 1 << 8;
        /// No output window left on the display.
        const INSUFFICIENT_WINDOW = 1 << 9;
        /// No free engine instance of a usable type.
        const INSUFFICIENT_ENGINE = 1 << 10;

        // -- Policy --
        /// The compositor asked for client composition.
        const FORCED_CLIENT = 1 << 16;
        /// Beyond the number of layers the display may put on hardware.
        const EXCEEDS_LAYER_BUDGET = 1 << 17;
        /// Grouped with other slow-updating layers for client composition.
        const LOW_FPS_LAYER = 1 << 18;
        /// The M2M engine's destination buffers are being re-provisioned.
        const PENDING_REALLOCATION = 1 << 19;
        /// The display color transform cannot be applied in hardware.
        const UNSUPPORTED_COLOR_TRANSFORM = 1 << 20;
        /// Lies between two client-composed layers.
        const SANDWICHED_BETWEEN_CLIENT = 1 << 21;
        /// Lies beneath an overwriting client-composed layer it overlaps.
        const BELOW_OVERWRITE = 1 << 22;
        /// Released its engine to a higher-priority display.
        const YIELDED_TO_PRIORITY = 1 << 23;
        /// The shared secondary compositor could not take the layer.
        const SECONDARY_UNAVAILABLE = 1 << 24;
        /// HDR content elsewhere forced the whole frame to the client.
        const HDR_EXCEPTION = 1 << 25;
        /// The retry loop did not converge and every layer fell back.
        const CONVERGENCE_FALLBACK = 1 << 26;

        /// All capability bits.
        const CAPABILITY = 0x0000_00ff;
        /// All capacity bits.
        const CAPACITY = 0x0000_ff00;
        /// All policy bits.
        const POLICY = 0xffff_0000;
    }
}

/// Broad class of a [`RejectReason`] bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReasonKind {
    /// The layer cannot use the engine at all.
    Capability,
    /// Resources ran out this frame.
    Capacity,
    /// Deliberate exclusion.
    Policy,
}

impl RejectReason {
    /// Returns the kind of the most significant reason present.
    ///
    /// Policy outranks capability, which outranks capacity: a policy
    /// exclusion holds whatever resources are free.
    #[must_use]
    pub fn kind(self) -> Option<ReasonKind> {
        if self.intersects(Self::POLICY) {
            Some(ReasonKind::Policy)
        } else if self.intersects(Self::CAPABILITY) {
            Some(ReasonKind::Capability)
        } else if self.intersects(Self::CAPACITY) {
            Some(ReasonKind::Capacity)
        } else {
            None
        }
    }

    /// Whether a demotion for these reasons may be undone once resources
    /// free up.
    ///
    /// Sandwiched layers count: their exclusion depends only on neighbors.
    #[must_use]
    pub fn is_recoverable(self) -> bool {
        !self.is_empty()
            && (Self::CAPACITY | Self::SANDWICHED_BETWEEN_CLIENT | Self::PENDING_REALLOCATION)
                .contains(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_disjoint_masks() {
        assert!((RejectReason::CAPABILITY & RejectReason::CAPACITY).is_empty());
        assert!((RejectReason::CAPACITY & RejectReason::POLICY).is_empty());
        assert!(RejectReason::CAPABILITY.contains(RejectReason::UNSUPPORTED_ROTATION));
        assert!(RejectReason::CAPACITY.contains(RejectReason::INSUFFICIENT_ENGINE));
        assert!(RejectReason::POLICY.contains(RejectReason::CONVERGENCE_FALLBACK));
    }

    #[test]
    fn policy_outranks_capability() {
        let r = RejectReason::UNSUPPORTED_FORMAT | RejectReason::FORCED_CLIENT;
        assert_eq!(r.kind(), Some(ReasonKind::Policy));
        assert_eq!(
            RejectReason::INSUFFICIENT_WINDOW.kind(),
            Some(ReasonKind::Capacity)
        );
        assert_eq!(RejectReason::empty().kind(), None);
    }

    #[test]
    fn recoverable_only_for_transient_reasons() {
        assert!(RejectReason::INSUFFICIENT_CAPACITY.is_recoverable());
        assert!(
            (RejectReason::INSUFFICIENT_WINDOW | RejectReason::SANDWICHED_BETWEEN_CLIENT)
                .is_recoverable()
        );
        assert!(!RejectReason::FORCED_CLIENT.is_recoverable());
        assert!(
            !(RejectReason::INSUFFICIENT_WINDOW | RejectReason::UNSUPPORTED_DRM).is_recoverable()
        );
        assert!(!RejectReason::empty().is_recoverable());
    }
}
