// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display identity and per-display state carried across frames.

use core::fmt;

use crate::dirty::GeometryChange;
use crate::frame::FrameResult;
use crate::group::CompositionGroup;
use crate::layer::LayerStore;

/// Identifies a display within a device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayId(pub u32);

impl fmt::Debug for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DisplayId({})", self.0)
    }
}

/// What sort of display this is.
///
/// Subtype-specific behavior is read through the capability methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisplayKind {
    /// The built-in panel.
    Primary,
    /// A hot-plugged external output.
    External,
    /// A write-back target with no scan-out.
    Virtual,
}

impl DisplayKind {
    /// When an HDR layer cannot get a hardware path, the whole frame goes to
    /// the client so tone mapping stays consistent.
    #[must_use]
    pub const fn supports_hdr_exception(self) -> bool {
        matches!(self, Self::Primary)
    }

    /// The panel can upscale a smaller client target.
    #[must_use]
    pub const fn supports_ddi_scale(self) -> bool {
        matches!(self, Self::Primary)
    }

    /// The shared secondary compositor may be used for this display.
    #[must_use]
    pub const fn has_secondary_composition(self) -> bool {
        true
    }

    /// Output goes through hardware windows.
    #[must_use]
    pub const fn needs_scanout(self) -> bool {
        !matches!(self, Self::Virtual)
    }

    /// Windows this display may bind, given the platform maximum.
    #[must_use]
    pub const fn window_budget(self, platform_max: u8) -> u8 {
        match self {
            Self::Primary | Self::External => platform_max,
            Self::Virtual => 0,
        }
    }

    /// Higher values win contested M2M engines.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Primary => 2,
            Self::External => 1,
            Self::Virtual => 0,
        }
    }
}

/// Whether low-activity grouping into client composition is in effect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RecompositionMode {
    /// Normal assignment.
    #[default]
    Normal,
    /// Slow-updating layers are grouped into client composition.
    DeviceToClient,
}

/// A display: its layers plus what the previous frame decided.
///
/// The assignment pass reads and writes this through
/// [`AssignmentEngine::assign`](crate::assign::AssignmentEngine::assign).
#[derive(Debug)]
pub struct Display {
    pub(crate) id: DisplayId,
    pub(crate) kind: DisplayKind,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) render_size: (u32, u32),
    pub(crate) layers: LayerStore,
    pub(crate) pending: GeometryChange,
    pub(crate) color_transform_supported: bool,
    pub(crate) recomposition: RecompositionMode,
    pub(crate) client: CompositionGroup,
    pub(crate) secondary: CompositionGroup,
    pub(crate) last: Option<FrameResult>,
    pub(crate) realloc_epoch: u32,
    pub(crate) frame_index: u64,
}

impl Display {
    /// Creates a display with no layers.
    #[must_use]
    pub fn new(id: DisplayId, kind: DisplayKind, width: u32, height: u32) -> Self {
        Self {
            id,
            kind,
            width,
            height,
            render_size: (width, height),
            layers: LayerStore::new(),
            pending: GeometryChange::FORCE_VALIDATE,
            color_transform_supported: true,
            recomposition: RecompositionMode::Normal,
            client: CompositionGroup::new(crate::group::GroupKind::Client),
            secondary: CompositionGroup::new(crate::group::GroupKind::Secondary),
            last: None,
            realloc_epoch: 0,
            frame_index: 0,
        }
    }

    /// Display id.
    #[must_use]
    pub fn id(&self) -> DisplayId {
        self.id
    }

    /// Display kind.
    #[must_use]
    pub fn kind(&self) -> DisplayKind {
        self.kind
    }

    /// Panel resolution.
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Size of the client target buffer.
    ///
    /// Equals the panel size unless the display can scale a smaller target.
    #[must_use]
    pub fn render_size(&self) -> (u32, u32) {
        self.render_size
    }

    /// The layers, in z-order.
    #[must_use]
    pub fn layers(&self) -> &LayerStore {
        &self.layers
    }

    /// Mutable access for the layer setters.
    pub fn layers_mut(&mut self) -> &mut LayerStore {
        &mut self.layers
    }

    /// Client composition group decided by the last pass.
    #[must_use]
    pub fn client_group(&self) -> &CompositionGroup {
        &self.client
    }

    /// Secondary composition group decided by the last pass.
    #[must_use]
    pub fn secondary_group(&self) -> &CompositionGroup {
        &self.secondary
    }

    /// Result of the last pass.
    #[must_use]
    pub fn last_result(&self) -> Option<&FrameResult> {
        self.last.as_ref()
    }

    /// Frames validated so far.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Changes the panel resolution.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.render_size = (width, height);
            self.pending |= GeometryChange::RESOLUTION;
        }
    }

    /// Sets the client target size. Ignored unless the display supports
    /// DDI scaling.
    pub fn set_render_size(&mut self, width: u32, height: u32) {
        if !self.kind.supports_ddi_scale() {
            return;
        }
        let size = (width.min(self.width), height.min(self.height));
        if size != self.render_size {
            self.render_size = size;
            self.pending |= GeometryChange::RESOLUTION;
        }
    }

    /// Records whether the current color transform can be applied by the
    /// hardware.
    pub fn set_color_transform_supported(&mut self, supported: bool) {
        if supported != self.color_transform_supported {
            self.color_transform_supported = supported;
            self.pending |= GeometryChange::COLOR_TRANSFORM;
        }
    }

    /// Switches low-activity grouping on or off.
    pub fn set_recomposition_mode(&mut self, mode: RecompositionMode) {
        if mode != self.recomposition {
            self.recomposition = mode;
            self.pending |= GeometryChange::FORCE_VALIDATE;
        }
    }

    /// Current low-activity mode.
    #[must_use]
    pub fn recomposition_mode(&self) -> RecompositionMode {
        self.recomposition
    }

    /// Marks the display as turned on or off; either way the next frame
    /// needs a full pass.
    pub fn note_power_change(&mut self) {
        self.pending |= GeometryChange::POWER;
    }

    /// Forces a full pass on the next validate.
    pub fn force_validate(&mut self) {
        self.pending |= GeometryChange::FORCE_VALIDATE;
    }

    /// Whether the next validate must run a full pass.
    #[must_use]
    pub fn needs_validate(&self) -> bool {
        self.last.is_none() || !self.pending.is_empty() || !self.layers.geometry().is_empty()
    }
}
