// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Immutable per-engine-type capability records.
//!
//! A [`RestrictionCatalog`] is built once at startup, either from a table the
//! display driver reports (through a [`RestrictionSource`]) or from the
//! compiled-in [`RestrictionCatalog::builtin`] table, and never mutated
//! afterwards. Every feasibility check in the crate funnels through
//! [`RestrictionEntry::check`].

use alloc::vec::Vec;

use crate::format::{Compression, FormatSet, HdrKind, ImageDesc, Transform};
use crate::reason::RejectReason;

// ---------------------------------------------------------------------------
// Engine types
// ---------------------------------------------------------------------------

/// A physical composition unit type.
///
/// Several logical engine instances may share one physical type; capacity is
/// accounted per physical type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PhysicalType {
    /// Graphics-only display channel (RGB, no scaling).
    DppG,
    /// Video display channel with a scaler.
    DppVg,
    /// Video display channel with scaler, HDR and secure path.
    DppVgf,
    /// Memory-to-memory scaler.
    Msc,
    /// Memory-to-memory 2D blitter, able to blend several sources.
    G2d,
}

impl PhysicalType {
    /// Number of physical types.
    pub const COUNT: usize = 5;

    /// All physical types, in declaration order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::DppG,
        Self::DppVg,
        Self::DppVgf,
        Self::Msc,
        Self::G2d,
    ];

    /// Whether units of this type scan out directly to a display channel.
    #[must_use]
    pub const fn is_otf(self) -> bool {
        matches!(self, Self::DppG | Self::DppVg | Self::DppVgf)
    }

    /// Position in [`Self::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

bitflags::bitflags! {
    /// A set of [`PhysicalType`]s.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct EngineMask: u8 {
        /// [`PhysicalType::DppG`].
        const DPP_G = 1 << 0;
        /// [`PhysicalType::DppVg`].
        const DPP_VG = 1 << 1;
        /// [`PhysicalType::DppVgf`].
        const DPP_VGF = 1 << 2;
        /// [`PhysicalType::Msc`].
        const MSC = 1 << 3;
        /// [`PhysicalType::G2d`].
        const G2D = 1 << 4;

        /// Every OTF type.
        const OTF = Self::DPP_G.bits() | Self::DPP_VG.bits() | Self::DPP_VGF.bits();
        /// Every M2M type.
        const M2M = Self::MSC.bits() | Self::G2D.bits();
    }
}

impl From<PhysicalType> for EngineMask {
    fn from(ty: PhysicalType) -> Self {
        Self::from_bits_retain(1 << ty.index())
    }
}

bitflags::bitflags! {
    /// Optional hardware features of an engine type.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct EngineCaps: u16 {
        /// Decodes AFBC-compressed sources.
        const AFBC = 1 << 0;
        /// Decodes SBWC-compressed sources.
        const SBWC = 1 << 1;
        /// Tone-maps HDR10 and HLG.
        const HDR10 = 1 << 2;
        /// Applies HDR10+ dynamic metadata.
        const HDR10_PLUS = 1 << 3;
        /// Reads protected buffers.
        const DRM = 1 << 4;
        /// Rotates and flips.
        const ROTATION = 1 << 5;
        /// Scales between source and destination.
        const SCALE = 1 << 6;
        /// Blends several sources into one destination in one pass.
        const BLEND = 1 << 7;
        /// Fills with a solid color without a source buffer.
        const COLOR_FILL = 1 << 8;
    }
}

// ---------------------------------------------------------------------------
// Restriction entries
// ---------------------------------------------------------------------------

/// Size and alignment bounds for one side of an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SizeLimits {
    /// Minimum width in pixels.
    pub min_width: u32,
    /// Minimum height in pixels.
    pub min_height: u32,
    /// Maximum width in pixels.
    pub max_width: u32,
    /// Maximum height in pixels.
    pub max_height: u32,
    /// Required alignment of width and height, multiplied by the format's
    /// own alignment.
    pub size_align: u32,
    /// Required alignment of the origin, multiplied by the format's own
    /// alignment.
    pub pos_align: u32,
}

impl SizeLimits {
    /// Aligns `v` up to this side's size alignment for `fmt_align`.
    #[must_use]
    pub const fn align_size(&self, v: u32, fmt_align: u32) -> u32 {
        let a = self.size_align * fmt_align;
        if a <= 1 { v } else { v.div_ceil(a) * a }
    }

    fn check(&self, img: &ImageDesc) -> RejectReason {
        let (w, h) = (img.width(), img.height());
        let fmt_align = img.format.alignment();
        let size_align = self.size_align.max(1) * fmt_align;
        let pos_align = self.pos_align.max(1) * fmt_align;
        let x = crate::format::whole_px(img.rect.x0);
        let y = crate::format::whole_px(img.rect.y0);
        if w < self.min_width
            || h < self.min_height
            || w > self.max_width
            || h > self.max_height
            || w % size_align != 0
            || h % size_align != 0
            || x % pos_align != 0
            || y % pos_align != 0
        {
            RejectReason::UNSUPPORTED_SIZE
        } else {
            RejectReason::empty()
        }
    }
}

/// Permitted scale ratios, expressed as integer factors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScaleLimits {
    /// Largest source:destination ratio.
    pub max_downscale: u32,
    /// Largest destination:source ratio.
    pub max_upscale: u32,
}

impl ScaleLimits {
    /// No scaling in either direction.
    pub const NONE: Self = Self {
        max_downscale: 1,
        max_upscale: 1,
    };
}

/// Pixels-per-cycle throughput model for a shared engine type.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CapacityModel {
    /// Budget the type may spend per frame; 1.0 means the full frame time.
    pub max_capacity: f32,
    /// Engine clock in MHz.
    pub clock_mhz: u32,
    /// Pixels per cycle for RGB sources.
    pub ppc_rgb: f32,
    /// Pixels per cycle for YUV sources.
    pub ppc_yuv: f32,
    /// Multiplier applied to the pixel rate when rotating.
    pub rotation_factor: f32,
}

impl CapacityModel {
    /// Fraction of a frame this hop occupies at `refresh_hz`.
    ///
    /// The larger of source and destination pixel counts is processed.
    #[must_use]
    pub fn required(&self, src: &ImageDesc, dst: &ImageDesc, refresh_hz: f32) -> f32 {
        let mut ppc = if src.format.is_yuv() {
            self.ppc_yuv
        } else {
            self.ppc_rgb
        };
        if src.transform.swaps_axes() {
            ppc *= self.rotation_factor;
        }
        let pixels = src.pixels().max(dst.pixels()) as f32;
        let cycles_per_frame = self.clock_mhz as f32 * 1_000_000.0 / refresh_hz.max(1.0);
        if ppc <= 0.0 || cycles_per_frame <= 0.0 {
            return f32::INFINITY;
        }
        pixels / ppc / cycles_per_frame
    }
}

/// Capability record for one [`PhysicalType`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RestrictionEntry {
    /// Which physical type this record describes.
    pub physical: PhysicalType,
    /// Readable source formats.
    pub formats: FormatSet,
    /// Optional features.
    pub caps: EngineCaps,
    /// Source crop bounds.
    pub src: SizeLimits,
    /// Destination bounds.
    pub dst: SizeLimits,
    /// Scale bounds (ignored without [`EngineCaps::SCALE`]).
    pub scale: ScaleLimits,
    /// How many sources one instance can take per frame.
    pub max_sources: u32,
    /// Throughput model; `None` for OTF types, which are never shared.
    pub capacity: Option<CapacityModel>,
}

impl RestrictionEntry {
    /// Checks whether a hop from `src` to `dst` is physically realizable on
    /// this engine type, ignoring capacity.
    ///
    /// Returns the empty set on success.
    #[must_use]
    pub fn check(&self, src: &ImageDesc, dst: &ImageDesc) -> RejectReason {
        let mut reasons = self.check_source(src);
        reasons |= self.dst.check(&ImageDesc {
            // Destination alignment is in output pixels, which are RGB.
            format: crate::format::PixelFormat::DEFAULT_RGB,
            ..*dst
        });
        reasons |= self.check_scale(src, dst);
        reasons
    }

    /// Checks only the properties of the source: format, compression,
    /// content flags, and crop bounds.
    #[must_use]
    pub fn check_source(&self, src: &ImageDesc) -> RejectReason {
        let mut reasons = RejectReason::empty();
        if !self.formats.supports(src.format) {
            reasons |= RejectReason::UNSUPPORTED_FORMAT;
        }
        let compression_cap = match src.compression {
            Compression::None => EngineCaps::empty(),
            Compression::Afbc => EngineCaps::AFBC,
            Compression::Sbwc => EngineCaps::SBWC,
        };
        if !self.caps.contains(compression_cap) {
            reasons |= RejectReason::UNSUPPORTED_COMPRESSION;
        }
        let hdr_cap = match src.hdr {
            HdrKind::Sdr => EngineCaps::empty(),
            HdrKind::Hdr10 | HdrKind::Hlg => EngineCaps::HDR10,
            HdrKind::Hdr10Plus => EngineCaps::HDR10_PLUS,
        };
        if !self.caps.contains(hdr_cap) {
            reasons |= RejectReason::UNSUPPORTED_HDR;
        }
        if src.protected && !self.caps.contains(EngineCaps::DRM) {
            reasons |= RejectReason::UNSUPPORTED_DRM;
        }
        if src.transform != Transform::empty() && !self.caps.contains(EngineCaps::ROTATION) {
            reasons |= RejectReason::UNSUPPORTED_ROTATION;
        }
        reasons | self.src.check(src)
    }

    fn check_scale(&self, src: &ImageDesc, dst: &ImageDesc) -> RejectReason {
        let (mut sw, mut sh) = (src.width(), src.height());
        if src.transform.swaps_axes() {
            core::mem::swap(&mut sw, &mut sh);
        }
        let (dw, dh) = (dst.width(), dst.height());
        if sw == dw && sh == dh {
            return RejectReason::empty();
        }
        let limits = if self.caps.contains(EngineCaps::SCALE) {
            self.scale
        } else {
            ScaleLimits::NONE
        };
        let fits = |s: u32, d: u32| {
            let (s, d) = (u64::from(s), u64::from(d));
            // Integer-exact ratio checks: s / d <= down and d / s <= up.
            d > 0
                && s > 0
                && s <= d * u64::from(limits.max_downscale)
                && d <= s * u64::from(limits.max_upscale)
        };
        if fits(sw, dw) && fits(sh, dh) {
            RejectReason::empty()
        } else {
            RejectReason::UNSUPPORTED_SCALE
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A driver-provided capability table.
pub trait RestrictionSource {
    /// Error reported when the table cannot be read.
    type Error: core::fmt::Debug;

    /// Reads every entry the driver reports.
    fn query(&self) -> Result<Vec<RestrictionEntry>, Self::Error>;
}

/// Where the entries of a catalog came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogOrigin {
    /// The compiled-in table.
    Builtin,
    /// A driver query.
    Queried,
}

/// One [`RestrictionEntry`] per physical type.
#[derive(Clone, Debug)]
pub struct RestrictionCatalog {
    entries: Vec<RestrictionEntry>,
    origin: CatalogOrigin,
}

impl RestrictionCatalog {
    /// Builds a catalog from explicit entries.
    ///
    /// Later entries for the same type replace earlier ones.
    #[must_use]
    pub fn from_entries(entries: Vec<RestrictionEntry>) -> Self {
        let mut deduped: Vec<RestrictionEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(slot) = deduped.iter_mut().find(|e| e.physical == entry.physical) {
                *slot = entry;
            } else {
                deduped.push(entry);
            }
        }
        deduped.sort_by_key(|e| e.physical);
        Self {
            entries: deduped,
            origin: CatalogOrigin::Queried,
        }
    }

    /// Loads from a driver source, falling back to the builtin table when
    /// the query fails or reports nothing.
    pub fn load<S: RestrictionSource>(source: &S) -> Self {
        match source.query() {
            Ok(entries) if !entries.is_empty() => {
                log::debug!("restriction table: {} queried entries", entries.len());
                Self::from_entries(entries)
            }
            Ok(_) => {
                log::warn!("restriction query returned no entries; using builtin table");
                Self::builtin()
            }
            Err(err) => {
                log::warn!("restriction query failed ({err:?}); using builtin table");
                Self::builtin()
            }
        }
    }

    /// Returns the record for `physical`, if the platform has that type.
    #[must_use]
    pub fn get(&self, physical: PhysicalType) -> Option<&RestrictionEntry> {
        self.entries.iter().find(|e| e.physical == physical)
    }

    /// All records, ordered by type.
    #[must_use]
    pub fn entries(&self) -> &[RestrictionEntry] {
        &self.entries
    }

    /// Where the records came from.
    #[must_use]
    pub fn origin(&self) -> CatalogOrigin {
        self.origin
    }

    /// The compiled-in table for a typical mobile display processor.
    #[must_use]
    pub fn builtin() -> Self {
        const OTF_SRC: SizeLimits = SizeLimits {
            min_width: 16,
            min_height: 8,
            max_width: 4096,
            max_height: 4096,
            size_align: 1,
            pos_align: 1,
        };
        const OTF_DST: SizeLimits = SizeLimits {
            min_width: 16,
            min_height: 8,
            max_width: 4096,
            max_height: 4096,
            size_align: 1,
            pos_align: 1,
        };
        const M2M_SRC: SizeLimits = SizeLimits {
            min_width: 16,
            min_height: 16,
            max_width: 8192,
            max_height: 8192,
            size_align: 1,
            pos_align: 1,
        };
        const M2M_DST: SizeLimits = SizeLimits {
            min_width: 16,
            min_height: 16,
            max_width: 8192,
            max_height: 8192,
            size_align: 2,
            pos_align: 1,
        };
        let rgb = FormatSet::RGB_8BIT | FormatSet::RGBA1010102;
        let entries = alloc::vec![
            RestrictionEntry {
                physical: PhysicalType::DppG,
                formats: rgb,
                caps: EngineCaps::AFBC,
                src: OTF_SRC,
                dst: OTF_DST,
                scale: ScaleLimits::NONE,
                max_sources: 1,
                capacity: None,
            },
            RestrictionEntry {
                physical: PhysicalType::DppVg,
                formats: rgb | FormatSet::NV12 | FormatSet::NV21 | FormatSet::YV12,
                caps: EngineCaps::AFBC | EngineCaps::SCALE,
                src: OTF_SRC,
                dst: OTF_DST,
                scale: ScaleLimits {
                    max_downscale: 2,
                    max_upscale: 8,
                },
                max_sources: 1,
                capacity: None,
            },
            RestrictionEntry {
                physical: PhysicalType::DppVgf,
                formats: rgb | FormatSet::YUV | FormatSet::RGBA_FP16,
                caps: EngineCaps::AFBC
                    | EngineCaps::SBWC
                    | EngineCaps::SCALE
                    | EngineCaps::HDR10
                    | EngineCaps::HDR10_PLUS
                    | EngineCaps::DRM,
                src: OTF_SRC,
                dst: OTF_DST,
                scale: ScaleLimits {
                    max_downscale: 4,
                    max_upscale: 8,
                },
                max_sources: 1,
                capacity: None,
            },
            RestrictionEntry {
                physical: PhysicalType::Msc,
                formats: rgb | FormatSet::YUV,
                caps: EngineCaps::SBWC
                    | EngineCaps::SCALE
                    | EngineCaps::ROTATION
                    | EngineCaps::HDR10
                    | EngineCaps::DRM,
                src: M2M_SRC,
                dst: M2M_DST,
                scale: ScaleLimits {
                    max_downscale: 16,
                    max_upscale: 8,
                },
                max_sources: 4,
                capacity: Some(CapacityModel {
                    max_capacity: 1.0,
                    clock_mhz: 600,
                    ppc_rgb: 2.0,
                    ppc_yuv: 2.0,
                    rotation_factor: 1.0,
                }),
            },
            RestrictionEntry {
                physical: PhysicalType::G2d,
                formats: rgb | FormatSet::NV12 | FormatSet::NV21 | FormatSet::YV12,
                caps: EngineCaps::AFBC
                    | EngineCaps::SCALE
                    | EngineCaps::ROTATION
                    | EngineCaps::BLEND
                    | EngineCaps::COLOR_FILL,
                src: M2M_SRC,
                dst: M2M_DST,
                scale: ScaleLimits {
                    max_downscale: 16,
                    max_upscale: 8,
                },
                max_sources: 16,
                capacity: Some(CapacityModel {
                    max_capacity: 1.0,
                    clock_mhz: 667,
                    ppc_rgb: 4.0,
                    ppc_yuv: 2.0,
                    rotation_factor: 0.5,
                }),
            },
        ];
        Self {
            entries,
            origin: CatalogOrigin::Builtin,
        }
    }
}
