// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Two-hop placements: an M2M scaler writes an intermediate image that a
//! channel scans out.

use alloc::vec::Vec;

use kurbo::Rect;

use super::pass::{Pass, PassLayer, Placement};
use crate::engine::{Engine, LogicalType};
use crate::format::{Compression, FormatSet, HdrKind, ImageDesc, PixelFormat, Transform};
use crate::pool::{Claim, ResourcePool};
use crate::realloc::ReallocGate;
use crate::reason::RejectReason;
use crate::restriction::{EngineCaps, EngineMask, RestrictionCatalog, RestrictionEntry, ScaleLimits};

/// Intermediate images to try, best first.
///
/// Formats: the source format if some channel reads it, then the RGB
/// format it converts to (10-bit for 10-bit or HDR content), then the
/// default RGB format. Size:
/// the destination size, unless the scaler can not reach it in one hop, in
/// which case it scales as far as it can and the channel does the rest.
pub(super) fn intermediates(
    src: &ImageDesc,
    dst: &ImageDesc,
    m2m: &RestrictionEntry,
    catalog: &RestrictionCatalog,
) -> Vec<ImageDesc> {
    let channel_formats = catalog
        .entries()
        .iter()
        .filter(|e| e.physical.is_otf())
        .fold(FormatSet::empty(), |acc, e| acc | e.formats);

    let mut formats: Vec<PixelFormat> = Vec::with_capacity(3);
    if channel_formats.supports(src.format) {
        formats.push(src.format);
    }
    let converted = if src.hdr.is_hdr() {
        PixelFormat::Rgba1010102
    } else {
        src.format.conversion_target()
    };
    if !formats.contains(&converted) {
        formats.push(converted);
    }
    if !formats.contains(&PixelFormat::DEFAULT_RGB) {
        formats.push(PixelFormat::DEFAULT_RGB);
    }

    let (mut sw, mut sh) = (src.width(), src.height());
    if src.transform.swaps_axes() {
        core::mem::swap(&mut sw, &mut sh);
    }
    let limits = if m2m.caps.contains(EngineCaps::SCALE) {
        m2m.scale
    } else {
        ScaleLimits::NONE
    };
    let reach = |s: u32, d: u32| -> u32 {
        let down = limits.max_downscale.max(1);
        let up = limits.max_upscale.max(1);
        if u64::from(d) * u64::from(down) < u64::from(s) {
            s.div_ceil(down)
        } else if u64::from(d) > u64::from(s) * u64::from(up) {
            s.saturating_mul(up)
        } else {
            d
        }
    };
    let (w, h) = (reach(sw, dst.width()), reach(sh, dst.height()));

    formats
        .into_iter()
        .map(|format| {
            let align = format.alignment();
            let (w, h) = (m2m.dst.align_size(w, align), m2m.dst.align_size(h, align));
            ImageDesc {
                format,
                compression: Compression::None,
                rect: Rect::new(0.0, 0.0, f64::from(w), f64::from(h)),
                transform: Transform::empty(),
                hdr: if format.is_10bit() { src.hdr } else { HdrKind::Sdr },
                protected: src.protected,
            }
        })
        .collect()
}

/// Finds a scaler plus channel for `layer`.
///
/// Scalers held by a lower-priority display are reported through
/// `claims` so the holder yields them on its next pass.
pub(super) fn plan_chain(
    pass: &Pass<'_>,
    layer: &PassLayer,
    pool: &ResourcePool,
    gate: &ReallocGate,
    claims: &mut Vec<Claim>,
) -> Result<Placement, RejectReason> {
    let Some(src) = layer.props.source_image() else {
        return Err(RejectReason::UNSUPPORTED_FORMAT);
    };
    let dst = layer.props.frame_image();

    let mut scalers: Vec<&Engine> = pool
        .engines()
        .iter()
        .filter(|e| {
            e.desc.logical == LogicalType::Scaler
                && layer.cap.m2m.contains(EngineMask::from(e.desc.physical))
        })
        .collect();
    if scalers.is_empty() {
        return Err(RejectReason::INSUFFICIENT_ENGINE);
    }
    scalers.sort_by_key(|e| {
        (
            e.reserved_for != Some(pass.display),
            e.desc.physical.index(),
            e.id,
        )
    });

    let mut reasons = RejectReason::empty();
    for scaler in scalers {
        if !scaler.available_to(pass.display) {
            reasons |= RejectReason::INSUFFICIENT_ENGINE;
            if let Some((holder, priority)) = scaler.owner {
                if holder != pass.display && priority < pass.priority {
                    claims.push(Claim {
                        physical: scaler.desc.physical,
                        display: pass.display,
                        priority: pass.priority,
                    });
                }
            }
            continue;
        }
        if gate.is_reallocating(scaler.id) {
            reasons |= RejectReason::PENDING_REALLOCATION;
            continue;
        }
        let Some(entry) = pool.catalog().get(scaler.desc.physical) else {
            continue;
        };
        for mid in intermediates(&src, &dst, entry, pool.catalog()) {
            let capacity = match pool.check_assignable(
                scaler.id,
                pass.display,
                &src,
                &mid,
                pass.cfg.refresh_hz,
            ) {
                Ok(capacity) => capacity,
                Err(r) => {
                    reasons |= r;
                    continue;
                }
            };
            match pass.pick_otf(pool, EngineMask::OTF, &mid, &dst) {
                Ok(otf) => {
                    return Ok(Placement::Chain {
                        m2m: scaler.id,
                        src,
                        mid,
                        otf,
                        capacity,
                    });
                }
                Err(r) => reasons |= r,
            }
        }
    }
    Err(reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restriction::PhysicalType;

    fn msc() -> RestrictionEntry {
        RestrictionCatalog::builtin()
            .get(PhysicalType::Msc)
            .cloned()
            .unwrap()
    }

    #[test]
    fn native_format_first() {
        let cat = RestrictionCatalog::builtin();
        let src = ImageDesc::plain(PixelFormat::Rgba8888, 6000, 1080);
        let dst = ImageDesc::plain(PixelFormat::DEFAULT_RGB, 1920, 1080);
        let mids = intermediates(&src, &dst, &msc(), &cat);
        assert_eq!(mids.len(), 1, "native is the default RGB format");
        assert_eq!(mids[0].format, PixelFormat::Rgba8888);
        assert_eq!((mids[0].width(), mids[0].height()), (1920, 1080));
    }

    #[test]
    fn hdr_keeps_ten_bits_before_rgb() {
        let cat = RestrictionCatalog::builtin();
        let mut src = ImageDesc::plain(PixelFormat::P010, 3840, 2160);
        src.hdr = HdrKind::Hdr10;
        let dst = ImageDesc::plain(PixelFormat::DEFAULT_RGB, 1920, 1080);
        let formats: Vec<PixelFormat> = intermediates(&src, &dst, &msc(), &cat)
            .iter()
            .map(|m| m.format)
            .collect();
        assert_eq!(
            formats,
            [
                PixelFormat::P010,
                PixelFormat::Rgba1010102,
                PixelFormat::DEFAULT_RGB
            ]
        );
    }

    #[test]
    fn size_is_aligned_for_the_scaler() {
        let cat = RestrictionCatalog::builtin();
        let src = ImageDesc::plain(PixelFormat::Rgba8888, 1000, 1000);
        let dst = ImageDesc::plain(PixelFormat::DEFAULT_RGB, 333, 333);
        let mid = &intermediates(&src, &dst, &msc(), &cat)[0];
        assert_eq!((mid.width(), mid.height()), (334, 334));
    }

    #[test]
    fn beyond_scaler_reach_stops_short() {
        let cat = RestrictionCatalog::builtin();
        let src = ImageDesc::plain(PixelFormat::Rgba8888, 64, 64);
        let dst = ImageDesc::plain(PixelFormat::DEFAULT_RGB, 1024, 1024);
        let mid = &intermediates(&src, &dst, &msc(), &cat)[0];
        assert_eq!(mid.width(), 512, "8x up, the channel does the rest");
    }

    #[test]
    fn rotation_happens_in_the_scaler() {
        let cat = RestrictionCatalog::builtin();
        let mut src = ImageDesc::plain(PixelFormat::Rgba8888, 1080, 1920);
        src.transform = Transform::ROT_90;
        let dst = ImageDesc::plain(PixelFormat::DEFAULT_RGB, 1920, 1080);
        let mid = &intermediates(&src, &dst, &msc(), &cat)[0];
        assert!(mid.transform.is_empty());
        assert_eq!((mid.width(), mid.height()), (1920, 1080));
    }
}
