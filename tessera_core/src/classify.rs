// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Which engine types can take a layer.
//!
//! Classification depends only on the layer's own attributes and the
//! restriction catalog, so results are cached on the store and recomputed
//! only for layers whose GEOMETRY channel was drained.

use crate::layer::{LayerContent, LayerProps, LayerStore};
use crate::reason::RejectReason;
use crate::restriction::{EngineCaps, EngineMask, PhysicalType, RestrictionCatalog};

/// Cached classification of one layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capability {
    /// OTF types that can scan the layer out as-is.
    pub direct: EngineMask,
    /// M2M types that can read the layer.
    pub m2m: EngineMask,
    /// Whether the secondary compositor can blend the layer.
    pub secondary: bool,
    /// Why each type rejected the layer; empty for accepting types.
    pub per_engine: [RejectReason; PhysicalType::COUNT],
}

impl Capability {
    /// The rejection recorded for `ty`.
    #[must_use]
    pub fn reason(&self, ty: PhysicalType) -> RejectReason {
        self.per_engine[ty.index()]
    }

    /// Whether any hardware path exists at all.
    #[must_use]
    pub fn has_hardware_path(&self) -> bool {
        !self.direct.is_empty() || !self.m2m.is_empty() || self.secondary
    }

    /// Union of all per-type rejections.
    #[must_use]
    pub fn all_reasons(&self) -> RejectReason {
        self.per_engine
            .iter()
            .fold(RejectReason::empty(), |acc, r| acc | *r)
    }
}

/// Classifies one layer against every type in the catalog.
#[must_use]
pub fn classify(props: &LayerProps, catalog: &RestrictionCatalog) -> Capability {
    let mut cap = Capability::default();
    let dst = props.frame_image();

    let src = match props.content {
        LayerContent::Empty => {
            cap.per_engine = [RejectReason::UNSUPPORTED_FORMAT; PhysicalType::COUNT];
            return cap;
        }
        LayerContent::SolidColor(_) => {
            // Channels fill solid colors without reading memory.
            for entry in catalog.entries() {
                let ty = entry.physical;
                if ty.is_otf() {
                    cap.direct |= EngineMask::from(ty);
                } else if entry.caps.contains(EngineCaps::COLOR_FILL | EngineCaps::BLEND) {
                    cap.secondary = true;
                } else {
                    cap.per_engine[ty.index()] = RejectReason::UNSUPPORTED_FORMAT;
                }
            }
            return cap;
        }
        LayerContent::Buffer(_) => match props.source_image() {
            Some(src) => src,
            None => return cap,
        },
    };

    for entry in catalog.entries() {
        let ty = entry.physical;
        if ty.is_otf() {
            let reasons = entry.check(&src, &dst);
            if reasons.is_empty() {
                cap.direct |= EngineMask::from(ty);
            }
            cap.per_engine[ty.index()] = reasons;
        } else {
            let reasons = entry.check_source(&src);
            if reasons.is_empty() {
                cap.m2m |= EngineMask::from(ty);
                if entry.caps.contains(EngineCaps::BLEND) && entry.check(&src, &dst).is_empty() {
                    cap.secondary = true;
                }
            }
            cap.per_engine[ty.index()] = reasons;
        }
    }
    cap
}

/// Classifies every live layer whose cache was invalidated.
///
/// Returns how many layers were classified.
pub fn refresh(store: &mut LayerStore, catalog: &RestrictionCatalog) -> usize {
    let mut classified = 0;
    for z in 0..store.z_order().len() {
        let idx = store.z_order()[z];
        if store.capability_at(idx).is_none() {
            let cap = classify(store.props_at(idx), catalog);
            store.set_capability_at(idx, cap);
            classified += 1;
        }
    }
    if classified > 0 {
        log::trace!("classified {classified} layers");
    }
    classified
}

#[cfg(test)]
mod tests {
    use kurbo::Rect;

    use super::*;
    use crate::format::{HdrKind, PixelFormat, Transform};
    use crate::layer::BufferDesc;

    fn layer(buf: BufferDesc, frame: Rect) -> LayerProps {
        LayerProps {
            content: LayerContent::Buffer(buf),
            display_frame: frame,
            ..LayerProps::default()
        }
    }

    fn full_hd() -> Rect {
        Rect::new(0.0, 0.0, 1920.0, 1080.0)
    }

    #[test]
    fn rgb_layer_fits_every_channel() {
        let cat = RestrictionCatalog::builtin();
        let cap = classify(
            &layer(BufferDesc::new(PixelFormat::Rgba8888, 1920, 1080), full_hd()),
            &cat,
        );
        assert_eq!(cap.direct, EngineMask::OTF);
        assert_eq!(cap.m2m, EngineMask::M2M);
        assert!(cap.secondary);
        assert!(cap.all_reasons().is_empty());
    }

    #[test]
    fn yuv_on_graphics_channel_is_a_format_rejection() {
        let cat = RestrictionCatalog::builtin();
        let cap = classify(
            &layer(BufferDesc::new(PixelFormat::Nv12, 1920, 1080), full_hd()),
            &cat,
        );
        assert!(!cap.direct.contains(EngineMask::DPP_G));
        assert_eq!(
            cap.reason(PhysicalType::DppG),
            RejectReason::UNSUPPORTED_FORMAT
        );
        assert!(cap.direct.contains(EngineMask::DPP_VG));
    }

    #[test]
    fn wide_source_needs_m2m() {
        let cat = RestrictionCatalog::builtin();
        let cap = classify(
            &layer(BufferDesc::new(PixelFormat::Rgba8888, 6000, 1080), full_hd()),
            &cat,
        );
        assert!(cap.direct.is_empty(), "every channel caps width at 4096");
        assert!(
            !cap.reason(PhysicalType::DppG)
                .contains(RejectReason::UNSUPPORTED_FORMAT),
            "size, not format"
        );
        assert!(cap.m2m.contains(EngineMask::MSC));
        assert!(
            cap.reason(PhysicalType::DppVgf)
                .contains(RejectReason::UNSUPPORTED_SIZE)
        );
    }

    #[test]
    fn protected_hdr_only_on_secure_channel() {
        let cat = RestrictionCatalog::builtin();
        let mut props = layer(
            BufferDesc::new(PixelFormat::P010, 1920, 1080).protected(),
            full_hd(),
        );
        props.hdr = HdrKind::Hdr10;
        let cap = classify(&props, &cat);
        assert_eq!(cap.direct, EngineMask::DPP_VGF);
        assert!(!cap.secondary, "blitter has no secure path");
    }

    #[test]
    fn rotation_needs_m2m() {
        let cat = RestrictionCatalog::builtin();
        let mut props = layer(
            BufferDesc::new(PixelFormat::Rgba8888, 1080, 1920),
            full_hd(),
        );
        props.transform = Transform::ROT_90;
        let cap = classify(&props, &cat);
        assert!(cap.direct.is_empty());
        assert!(cap.m2m.contains(EngineMask::MSC | EngineMask::G2D));
    }

    #[test]
    fn solid_color_goes_straight_to_channels() {
        let cat = RestrictionCatalog::builtin();
        let props = LayerProps {
            content: LayerContent::SolidColor(0xff10_2030),
            display_frame: full_hd(),
            ..LayerProps::default()
        };
        let cap = classify(&props, &cat);
        assert_eq!(cap.direct, EngineMask::OTF);
        assert!(cap.m2m.is_empty());
    }

    #[test]
    fn empty_layer_has_no_path() {
        let cat = RestrictionCatalog::builtin();
        let cap = classify(&LayerProps::default(), &cat);
        assert!(!cap.has_hardware_path());
    }

    #[test]
    fn refresh_only_touches_invalidated_layers() {
        let cat = RestrictionCatalog::builtin();
        let mut store = LayerStore::new();
        let a = store.create_layer();
        let b = store.create_layer();
        store.set_buffer(a, BufferDesc::new(PixelFormat::Rgba8888, 64, 64));
        store.set_buffer(b, BufferDesc::new(PixelFormat::Rgba8888, 64, 64));
        let _ = store.take_changes();
        assert_eq!(refresh(&mut store, &cat), 2);
        assert_eq!(refresh(&mut store, &cat), 0, "cached");

        store.set_display_frame(b, Rect::new(0.0, 0.0, 64.0, 64.0));
        let _ = store.take_changes();
        assert_eq!(refresh(&mut store, &cat), 1);
    }
}
