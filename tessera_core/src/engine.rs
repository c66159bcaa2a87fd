// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine instances and what they are working on.

use alloc::vec::Vec;
use core::fmt;

use crate::display::DisplayId;
use crate::format::ImageDesc;
use crate::layer::LayerId;
use crate::restriction::PhysicalType;

/// Identifies an engine within a [`ResourcePool`](crate::pool::ResourcePool).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(pub(crate) u16);

impl EngineId {
    /// Position in the pool (for diagnostics and bitmasks).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineId({})", self.0)
    }
}

/// On-the-fly versus memory-to-memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Scans out to a display channel; one source per frame.
    Otf,
    /// Writes an intermediate buffer; may take several sources.
    M2m,
}

/// The role a logical engine instance plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// A display channel.
    Channel,
    /// Per-layer scaling/conversion ahead of a channel.
    Scaler,
    /// Blends a run of layers into one buffer for a channel.
    Composer,
}

/// Static description used to add an engine to a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineDesc {
    /// Physical type (capability and capacity accounting).
    pub physical: PhysicalType,
    /// Logical role.
    pub logical: LogicalType,
    /// Window index this channel must occupy, if pinned.
    pub fixed_window: Option<u8>,
    /// Whether the engine writes into destination buffers that must be
    /// re-provisioned on resolution changes.
    pub owns_dst_buffers: bool,
}

impl EngineDesc {
    /// A display channel of the given type.
    #[must_use]
    pub const fn channel(physical: PhysicalType) -> Self {
        Self {
            physical,
            logical: LogicalType::Channel,
            fixed_window: None,
            owns_dst_buffers: false,
        }
    }

    /// A per-layer M2M scaler of the given type.
    #[must_use]
    pub const fn scaler(physical: PhysicalType) -> Self {
        Self {
            physical,
            logical: LogicalType::Scaler,
            fixed_window: None,
            owns_dst_buffers: true,
        }
    }

    /// A multi-source composer of the given type.
    #[must_use]
    pub const fn composer(physical: PhysicalType) -> Self {
        Self {
            physical,
            logical: LogicalType::Composer,
            fixed_window: None,
            owns_dst_buffers: true,
        }
    }

    /// Pins a channel to a window index.
    #[must_use]
    pub const fn pinned(mut self, window: u8) -> Self {
        self.fixed_window = Some(window);
        self
    }

    /// The engine layout of the default platform: six channels, one
    /// scaler, and a blitter serving both as scaler and as composer.
    #[must_use]
    pub const fn mobile_layout() -> [Self; 9] {
        [
            Self::channel(PhysicalType::DppG),
            Self::channel(PhysicalType::DppG),
            Self::channel(PhysicalType::DppVg),
            Self::channel(PhysicalType::DppVg),
            Self::channel(PhysicalType::DppVgf),
            Self::channel(PhysicalType::DppVgf),
            Self::scaler(PhysicalType::Msc),
            Self::scaler(PhysicalType::G2d),
            Self::composer(PhysicalType::G2d),
        ]
    }
}

/// What an engine is producing or consuming.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    /// A layer of a display.
    Layer {
        /// Owning display.
        display: DisplayId,
        /// The layer.
        layer: LayerId,
    },
    /// The client composition target of a display.
    ClientTarget(DisplayId),
    /// The secondary composition target of a display.
    SecondaryTarget(DisplayId),
}

/// One unit of work on an engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Assignment {
    /// What is being processed.
    pub source: Source,
    /// Input image.
    pub src: ImageDesc,
    /// Output image.
    pub dst: ImageDesc,
    /// Capacity consumed (0 for OTF engines).
    pub capacity: f32,
}

/// Observable state of an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// Unassigned and unreserved.
    Free,
    /// Pre-claimed by a display but idle this frame.
    Reserved,
    /// Holding work for one display this frame.
    Assigned,
    /// Its work was handed to the hardware.
    Running,
}

/// An engine instance tracked by the pool.
#[derive(Clone, Debug)]
pub struct Engine {
    pub(crate) id: EngineId,
    pub(crate) desc: EngineDesc,
    pub(crate) reserved_for: Option<DisplayId>,
    pub(crate) owner: Option<(DisplayId, u8)>,
    pub(crate) running: bool,
    pub(crate) work: Vec<Assignment>,
    pub(crate) used_capacity: f32,
}

impl Engine {
    pub(crate) fn new(id: EngineId, desc: EngineDesc) -> Self {
        Self {
            id,
            desc,
            reserved_for: None,
            owner: None,
            running: false,
            work: Vec::new(),
            used_capacity: 0.0,
        }
    }

    /// Engine id.
    #[must_use]
    pub fn id(&self) -> EngineId {
        self.id
    }

    /// Static description.
    #[must_use]
    pub fn desc(&self) -> &EngineDesc {
        &self.desc
    }

    /// OTF or M2M, derived from the physical type.
    #[must_use]
    pub fn kind(&self) -> EngineKind {
        if self.desc.physical.is_otf() {
            EngineKind::Otf
        } else {
            EngineKind::M2m
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        match (self.owner, self.running, self.reserved_for) {
            (Some(_), true, _) => EngineState::Running,
            (Some(_), false, _) => EngineState::Assigned,
            (None, _, Some(_)) => EngineState::Reserved,
            (None, _, None) => EngineState::Free,
        }
    }

    /// Display this engine is reserved for.
    #[must_use]
    pub fn reserved_for(&self) -> Option<DisplayId> {
        self.reserved_for
    }

    /// Display holding this engine this frame.
    #[must_use]
    pub fn owner(&self) -> Option<DisplayId> {
        self.owner.map(|(d, _)| d)
    }

    /// Work assigned this frame.
    #[must_use]
    pub fn work(&self) -> &[Assignment] {
        &self.work
    }

    /// Capacity consumed by this instance.
    #[must_use]
    pub fn used_capacity(&self) -> f32 {
        self.used_capacity
    }

    /// Whether `display` may place work on this engine, ignoring capacity.
    pub(crate) fn available_to(&self, display: DisplayId) -> bool {
        self.reserved_for.is_none_or(|r| r == display)
            && match self.owner {
                None => true,
                Some((d, _)) => d == display && self.kind() == EngineKind::M2m,
            }
    }
}
