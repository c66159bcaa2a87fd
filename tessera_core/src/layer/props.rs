// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Caller-set layer attributes and the per-layer result of a pass.

use kurbo::Rect;

use crate::engine::EngineId;
use crate::format::{BlendMode, Compression, HdrKind, ImageDesc, PixelFormat, Transform};
use crate::reason::RejectReason;

/// The buffer currently attached to a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    /// Pixel layout.
    pub format: PixelFormat,
    /// Compression.
    pub compression: Compression,
    /// Allocated width.
    pub width: u32,
    /// Allocated height.
    pub height: u32,
    /// Whether the buffer is DRM-protected.
    pub protected: bool,
}

impl BufferDesc {
    /// An uncompressed, unprotected buffer.
    #[must_use]
    pub const fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            compression: Compression::None,
            width,
            height,
            protected: false,
        }
    }

    /// Marks the buffer as protected.
    #[must_use]
    pub const fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Sets the compression.
    #[must_use]
    pub const fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

/// What a layer shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LayerContent {
    /// Nothing attached yet.
    #[default]
    Empty,
    /// A buffer.
    Buffer(BufferDesc),
    /// A solid ARGB color.
    SolidColor(u32),
}

/// Composition type the compositor asked for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RequestedComposition {
    /// Hardware if possible.
    #[default]
    Device,
    /// Must be composed by the client.
    Client,
    /// A cursor; hardware if possible, in a cursor window.
    Cursor,
}

/// Overlay priority hint. Higher tiers are assigned first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OverlayPriority {
    /// No hint.
    #[default]
    None,
    /// Low.
    Low,
    /// Medium.
    Mid,
    /// High.
    High,
    /// Must get hardware before anything else.
    Max,
}

/// Attributes set through the [`LayerStore`](super::LayerStore) setters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerProps {
    /// Attached content.
    pub content: LayerContent,
    /// Sub-pixel crop within the buffer; empty means the whole buffer.
    pub source_crop: Rect,
    /// Destination on the display.
    pub display_frame: Rect,
    /// Orientation.
    pub transform: Transform,
    /// Blending with layers below.
    pub blend: BlendMode,
    /// Global alpha multiplier.
    pub plane_alpha: f32,
    /// HDR signalling.
    pub hdr: HdrKind,
    /// Compositor-mandated composition type.
    pub requested: RequestedComposition,
    /// Overlay priority hint.
    pub priority: OverlayPriority,
    /// Measured update rate in frames per second; 0 when unknown.
    pub fps: u32,
}

impl Default for LayerProps {
    fn default() -> Self {
        Self {
            content: LayerContent::Empty,
            source_crop: Rect::ZERO,
            display_frame: Rect::ZERO,
            transform: Transform::empty(),
            blend: BlendMode::Premultiplied,
            plane_alpha: 1.0,
            hdr: HdrKind::Sdr,
            requested: RequestedComposition::Device,
            priority: OverlayPriority::None,
            fps: 0,
        }
    }
}

impl LayerProps {
    /// The hop source: buffer format plus crop. `None` without a buffer.
    #[must_use]
    pub fn source_image(&self) -> Option<ImageDesc> {
        let LayerContent::Buffer(buf) = self.content else {
            return None;
        };
        let crop = if self.source_crop.is_zero_area() {
            Rect::new(0.0, 0.0, f64::from(buf.width), f64::from(buf.height))
        } else {
            self.source_crop
        };
        Some(ImageDesc {
            format: buf.format,
            compression: buf.compression,
            rect: crop,
            transform: self.transform,
            hdr: self.hdr,
            protected: buf.protected,
        })
    }

    /// The hop destination on the display.
    #[must_use]
    pub fn frame_image(&self) -> ImageDesc {
        ImageDesc {
            rect: self.display_frame,
            ..ImageDesc::plain(PixelFormat::DEFAULT_RGB, 0, 0)
        }
    }

    /// Whether the layer fully hides what is beneath its frame.
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        let format_opaque = match self.content {
            LayerContent::Buffer(buf) => !buf.format.has_alpha(),
            LayerContent::SolidColor(argb) => argb >> 24 == 0xff,
            LayerContent::Empty => false,
        };
        self.plane_alpha >= 1.0 && (self.blend == BlendMode::None || format_opaque)
    }

    /// Whether the layer overwrites without blending but may carry
    /// translucent pixels, so layers beneath it must not be blended in
    /// separately.
    #[must_use]
    pub fn overwrites_translucently(&self) -> bool {
        self.blend == BlendMode::None && !self.is_opaque_content()
    }

    fn is_opaque_content(&self) -> bool {
        self.plane_alpha >= 1.0
            && match self.content {
                LayerContent::Buffer(buf) => !buf.format.has_alpha(),
                LayerContent::SolidColor(argb) => argb >> 24 == 0xff,
                LayerContent::Empty => false,
            }
    }

    /// Whether the content is a solid color.
    #[must_use]
    pub fn is_solid_color(&self) -> bool {
        matches!(self.content, LayerContent::SolidColor(_))
    }
}

/// Final composition path for a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Composition {
    /// Composed by the client into the client target.
    Client,
    /// Scanned out by its own window.
    Device,
    /// Blended by the secondary compositor.
    Secondary,
}

/// What the last pass decided for a layer.
///
/// Reset at the start of every pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LayerOutcome {
    /// Composition path; `None` before the first pass.
    pub composition: Option<Composition>,
    /// Window index, for device layers.
    pub window: Option<u8>,
    /// Scan-out engine, for device layers.
    pub otf: Option<EngineId>,
    /// Intermediate engine, for device layers behind an M2M hop and for
    /// secondary layers.
    pub m2m: Option<EngineId>,
    /// Why the layer is not on a hardware path.
    pub reject: RejectReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_image_defaults_to_full_buffer() {
        let props = LayerProps {
            content: LayerContent::Buffer(BufferDesc::new(PixelFormat::Nv12, 1920, 1080)),
            ..LayerProps::default()
        };
        let img = props.source_image().unwrap();
        assert_eq!((img.width(), img.height()), (1920, 1080));
        assert_eq!(img.format, PixelFormat::Nv12);
    }

    #[test]
    fn solid_color_has_no_source() {
        let props = LayerProps {
            content: LayerContent::SolidColor(0xff00_00ff),
            ..LayerProps::default()
        };
        assert!(props.source_image().is_none());
        assert!(props.is_solid_color());
        assert!(props.is_opaque(), "alpha byte is 0xff");
    }

    #[test]
    fn overwrite_with_alpha_is_translucent() {
        let mut props = LayerProps {
            content: LayerContent::Buffer(BufferDesc::new(PixelFormat::Rgba8888, 64, 64)),
            blend: BlendMode::None,
            ..LayerProps::default()
        };
        assert!(props.overwrites_translucently());
        props.content = LayerContent::Buffer(BufferDesc::new(PixelFormat::Rgbx8888, 64, 64));
        assert!(!props.overwrites_translucently(), "no alpha channel");
        props.plane_alpha = 0.5;
        assert!(props.overwrites_translucently(), "plane alpha below one");
    }

    #[test]
    fn priority_tiers_order() {
        assert!(OverlayPriority::Max > OverlayPriority::High);
        assert!(OverlayPriority::Low > OverlayPriority::None);
    }
}
