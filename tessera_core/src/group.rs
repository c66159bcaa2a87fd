// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contiguous runs of layers composed as one unit.
//!
//! A display has two groups: the client group, composed in software into
//! the client target, and the secondary group, blended by a shared M2M
//! composer into the secondary target. Each group covers at most one
//! contiguous z range per frame, and the two ranges never overlap.

use crate::engine::EngineId;
use crate::format::{HdrKind, PixelFormat};

/// Which kind of group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GroupKind {
    /// Software composition by the caller.
    Client,
    /// Hardware composition by a shared M2M composer.
    Secondary,
}

/// The buffer a group composes into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetBuffer {
    /// Pixel layout of the target.
    pub format: PixelFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// HDR signalling of the composed content.
    pub hdr: HdrKind,
}

impl TargetBuffer {
    /// A target for `width` x `height` that keeps HDR precision when any
    /// member layer carries HDR content.
    #[must_use]
    pub fn for_content(width: u32, height: u32, hdr: HdrKind) -> Self {
        Self {
            format: if hdr.is_hdr() {
                PixelFormat::Rgba1010102
            } else {
                PixelFormat::DEFAULT_RGB
            },
            width,
            height,
            hdr,
        }
    }
}

/// A contiguous run of layers handled as one unit.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositionGroup {
    kind: GroupKind,
    pub(crate) range: Option<(u32, u32)>,
    pub(crate) otf: Option<EngineId>,
    pub(crate) m2m: Option<EngineId>,
    pub(crate) window: Option<u8>,
    pub(crate) target: Option<TargetBuffer>,
    pub(crate) skip: bool,
}

impl CompositionGroup {
    /// An empty group.
    #[must_use]
    pub const fn new(kind: GroupKind) -> Self {
        Self {
            kind,
            range: None,
            otf: None,
            m2m: None,
            window: None,
            target: None,
            skip: false,
        }
    }

    /// Kind of this group.
    #[must_use]
    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    /// Inclusive z range `(first, last)`, or `None` when empty.
    #[must_use]
    pub fn range(&self) -> Option<(u32, u32)> {
        self.range
    }

    /// Lowest z in the group.
    #[must_use]
    pub fn first(&self) -> Option<u32> {
        self.range.map(|(f, _)| f)
    }

    /// Highest z in the group.
    #[must_use]
    pub fn last(&self) -> Option<u32> {
        self.range.map(|(_, l)| l)
    }

    /// Number of layers in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.range.map_or(0, |(f, l)| (l - f + 1) as usize)
    }

    /// Whether the group holds no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_none()
    }

    /// Whether `z` falls inside the range.
    #[must_use]
    pub fn contains(&self, z: u32) -> bool {
        self.range.is_some_and(|(f, l)| f <= z && z <= l)
    }

    /// OTF engine scanning out the target.
    #[must_use]
    pub fn otf(&self) -> Option<EngineId> {
        self.otf
    }

    /// Composer producing the target (secondary group only).
    #[must_use]
    pub fn m2m(&self) -> Option<EngineId> {
        self.m2m
    }

    /// Window showing the target.
    #[must_use]
    pub fn window(&self) -> Option<u8> {
        self.window
    }

    /// Target buffer descriptor.
    #[must_use]
    pub fn target(&self) -> Option<&TargetBuffer> {
        self.target.as_ref()
    }

    /// Whether the previous frame's target can be shown again unchanged.
    #[must_use]
    pub fn skip(&self) -> bool {
        self.skip
    }

    /// Empties the group, keeping its kind.
    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.kind);
    }

    /// Grows the range to include `z`.
    pub(crate) fn include(&mut self, z: u32) {
        self.range = Some(match self.range {
            None => (z, z),
            Some((f, l)) => (f.min(z), l.max(z)),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_grows_range() {
        let mut g = CompositionGroup::new(GroupKind::Client);
        assert!(g.is_empty());
        assert_eq!(g.len(), 0);
        g.include(4);
        g.include(2);
        assert_eq!(g.range(), Some((2, 4)));
        assert_eq!(g.len(), 3);
        assert!(g.contains(3));
        assert!(!g.contains(5));
    }

    #[test]
    fn reset_keeps_kind() {
        let mut g = CompositionGroup::new(GroupKind::Secondary);
        g.include(1);
        g.skip = true;
        g.reset();
        assert_eq!(g.kind(), GroupKind::Secondary);
        assert!(g.is_empty());
        assert!(!g.skip());
    }

    #[test]
    fn hdr_target_keeps_ten_bits() {
        let t = TargetBuffer::for_content(1920, 1080, HdrKind::Hdr10);
        assert_eq!(t.format, PixelFormat::Rgba1010102);
        let t = TargetBuffer::for_content(1920, 1080, HdrKind::Sdr);
        assert_eq!(t.format, PixelFormat::DEFAULT_RGB);
    }
}
