// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel formats, buffer compression, and the per-layer presentation
//! attributes the classifier checks against engine restrictions.

use core::fmt;

use kurbo::Rect;

// ---------------------------------------------------------------------------
// Pixel formats
// ---------------------------------------------------------------------------

/// Pixel layout of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PixelFormat {
    /// 8-bit RGBA.
    Rgba8888,
    /// 8-bit RGB with an ignored alpha byte.
    Rgbx8888,
    /// 8-bit BGRA.
    Bgra8888,
    /// 16-bit packed RGB.
    Rgb565,
    /// 10-bit RGB with 2-bit alpha.
    Rgba1010102,
    /// Half-float RGBA.
    RgbaFp16,
    /// 4:2:0 YUV, interleaved CbCr plane.
    Nv12,
    /// 4:2:0 YUV, interleaved CrCb plane.
    Nv21,
    /// 4:2:0 YUV, three planes.
    Yv12,
    /// 4:2:0 YUV, 10 bits per sample.
    P010,
}

impl PixelFormat {
    /// All formats, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Rgba8888,
        Self::Rgbx8888,
        Self::Bgra8888,
        Self::Rgb565,
        Self::Rgba1010102,
        Self::RgbaFp16,
        Self::Nv12,
        Self::Nv21,
        Self::Yv12,
        Self::P010,
    ];

    /// Default intermediate format when an RGB source must be converted.
    pub const DEFAULT_RGB: Self = Self::Rgba8888;

    /// Default intermediate format when a YUV source must be converted.
    pub const DEFAULT_YUV: Self = Self::Nv12;

    /// Whether the format is a subsampled YUV layout.
    #[must_use]
    pub const fn is_yuv(self) -> bool {
        matches!(self, Self::Nv12 | Self::Nv21 | Self::Yv12 | Self::P010)
    }

    /// Whether samples carry more than 8 bits of precision.
    #[must_use]
    pub const fn is_10bit(self) -> bool {
        matches!(self, Self::Rgba1010102 | Self::RgbaFp16 | Self::P010)
    }

    /// Whether the format carries a meaningful alpha channel.
    #[must_use]
    pub const fn has_alpha(self) -> bool {
        matches!(
            self,
            Self::Rgba8888 | Self::Bgra8888 | Self::Rgba1010102 | Self::RgbaFp16
        )
    }

    /// Average bits per pixel across all planes.
    #[must_use]
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8888 | Self::Rgbx8888 | Self::Bgra8888 | Self::Rgba1010102 => 32,
            Self::Rgb565 => 16,
            Self::RgbaFp16 => 64,
            Self::Nv12 | Self::Nv21 | Self::Yv12 => 12,
            Self::P010 => 24,
        }
    }

    /// Required alignment of crop origin and size, in pixels.
    ///
    /// Chroma-subsampled layouts need even coordinates.
    #[must_use]
    pub const fn alignment(self) -> u32 {
        if self.is_yuv() { 2 } else { 1 }
    }

    /// Format an M2M engine should emit when this format has to be
    /// converted for a downstream OTF engine.
    #[must_use]
    pub const fn conversion_target(self) -> Self {
        if self.is_10bit() {
            Self::Rgba1010102
        } else {
            Self::DEFAULT_RGB
        }
    }

    pub(crate) const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

bitflags::bitflags! {
    /// A set of [`PixelFormat`]s, one bit per variant.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct FormatSet: u16 {
        /// [`PixelFormat::Rgba8888`].
        const RGBA8888 = PixelFormat::Rgba8888.bit();
        /// [`PixelFormat::Rgbx8888`].
        const RGBX8888 = PixelFormat::Rgbx8888.bit();
        /// [`PixelFormat::Bgra8888`].
        const BGRA8888 = PixelFormat::Bgra8888.bit();
        /// [`PixelFormat::Rgb565`].
        const RGB565 = PixelFormat::Rgb565.bit();
        /// [`PixelFormat::Rgba1010102`].
        const RGBA1010102 = PixelFormat::Rgba1010102.bit();
        /// [`PixelFormat::RgbaFp16`].
        const RGBA_FP16 = PixelFormat::RgbaFp16.bit();
        /// [`PixelFormat::Nv12`].
        const NV12 = PixelFormat::Nv12.bit();
        /// [`PixelFormat::Nv21`].
        const NV21 = PixelFormat::Nv21.bit();
        /// [`PixelFormat::Yv12`].
        const YV12 = PixelFormat::Yv12.bit();
        /// [`PixelFormat::P010`].
        const P010 = PixelFormat::P010.bit();

        /// Every 8-bit RGB layout.
        const RGB_8BIT = Self::RGBA8888.bits() | Self::RGBX8888.bits()
            | Self::BGRA8888.bits() | Self::RGB565.bits();
        /// Every YUV layout.
        const YUV = Self::NV12.bits() | Self::NV21.bits() | Self::YV12.bits() | Self::P010.bits();
    }
}

impl FormatSet {
    /// Whether `format` is a member of the set.
    #[must_use]
    pub const fn supports(self, format: PixelFormat) -> bool {
        self.bits() & format.bit() != 0
    }
}

impl From<PixelFormat> for FormatSet {
    fn from(format: PixelFormat) -> Self {
        Self::from_bits_retain(format.bit())
    }
}

/// Lossless framebuffer compression applied to a buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Compression {
    /// Linear, uncompressed.
    #[default]
    None,
    /// Arm frame buffer compression.
    Afbc,
    /// Samsung bandwidth compression.
    Sbwc,
}

// ---------------------------------------------------------------------------
// Presentation attributes
// ---------------------------------------------------------------------------

bitflags::bitflags! {
    /// Buffer orientation applied before scan-out.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Transform: u8 {
        /// Mirror horizontally.
        const FLIP_H = 1 << 0;
        /// Mirror vertically.
        const FLIP_V = 1 << 1;
        /// Rotate 90 degrees clockwise (applied after flips).
        const ROT_90 = 1 << 2;
        /// Rotate 180 degrees.
        const ROT_180 = Self::FLIP_H.bits() | Self::FLIP_V.bits();
        /// Rotate 270 degrees.
        const ROT_270 = Self::ROT_180.bits() | Self::ROT_90.bits();
    }
}

impl Transform {
    /// Whether source width and height swap on the way to the destination.
    #[must_use]
    pub const fn swaps_axes(self) -> bool {
        self.contains(Self::ROT_90)
    }
}

/// How a layer combines with the layers beneath it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// No blending; the layer overwrites what is below.
    None,
    /// Source color is already multiplied by alpha.
    #[default]
    Premultiplied,
    /// Source color is multiplied by alpha during blending.
    Coverage,
}

/// Transfer characteristics of the layer's content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HdrKind {
    /// Standard dynamic range.
    #[default]
    Sdr,
    /// HDR10 with static metadata.
    Hdr10,
    /// HDR10+ with dynamic per-frame metadata.
    Hdr10Plus,
    /// Hybrid log-gamma.
    Hlg,
}

impl HdrKind {
    /// Whether the content needs an HDR-capable engine.
    #[must_use]
    pub const fn is_hdr(self) -> bool {
        !matches!(self, Self::Sdr)
    }
}

// ---------------------------------------------------------------------------
// Image descriptors
// ---------------------------------------------------------------------------

/// Geometry and format of one end of an engine hop.
///
/// As a source, `rect` is the crop inside the buffer. As a destination,
/// `rect` is where the engine writes (the display frame for OTF engines, the
/// intermediate buffer extent for M2M engines).
#[derive(Clone, Copy, PartialEq)]
pub struct ImageDesc {
    /// Pixel layout.
    pub format: PixelFormat,
    /// Buffer compression.
    pub compression: Compression,
    /// Crop (source) or placement (destination).
    pub rect: Rect,
    /// Orientation applied on the way through the engine.
    pub transform: Transform,
    /// HDR signalling carried by the content.
    pub hdr: HdrKind,
    /// Whether the buffer is DRM-protected.
    pub protected: bool,
}

impl ImageDesc {
    /// A plain, uncompressed SDR image covering `width` x `height`.
    #[must_use]
    pub fn plain(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            compression: Compression::None,
            rect: Rect::new(0.0, 0.0, f64::from(width), f64::from(height)),
            transform: Transform::empty(),
            hdr: HdrKind::Sdr,
            protected: false,
        }
    }

    /// Width in whole pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        whole_px(self.rect.width())
    }

    /// Height in whole pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        whole_px(self.rect.height())
    }

    /// Pixel count of the rect.
    #[must_use]
    pub fn pixels(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }
}

impl fmt::Debug for ImageDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}{} {}x{}@({},{})",
            self.format,
            match self.compression {
                Compression::None => "",
                Compression::Afbc => "/afbc",
                Compression::Sbwc => "/sbwc",
            },
            self.width(),
            self.height(),
            self.rect.x0,
            self.rect.y0,
        )
    }
}

/// Truncates a non-negative coordinate span to whole pixels.
#[expect(
    clippy::cast_possible_truncation,
    reason = "spans are clamped to the u32 range first"
)]
pub(crate) fn whole_px(v: f64) -> u32 {
    v.clamp(0.0, f64::from(u32::MAX)) as u32
}
