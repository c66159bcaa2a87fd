// Copyright 2026 the Tessera Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Restriction catalogs as JSON.
//!
//! Lets a board bring-up describe its engine types in a file instead of a
//! driver query, and lets the active catalog be dumped for comparison.

use std::io::Write;

use tessera_core::restriction::{RestrictionCatalog, RestrictionEntry, RestrictionSource};

/// A [`RestrictionSource`] backed by a JSON array of entries.
#[derive(Clone, Debug)]
pub struct JsonSource {
    text: String,
}

impl JsonSource {
    /// Wraps `text`; it is parsed on every query.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl RestrictionSource for JsonSource {
    type Error = serde_json::Error;

    fn query(&self) -> Result<Vec<RestrictionEntry>, Self::Error> {
        serde_json::from_str(&self.text)
    }
}

/// Parses `text` into a catalog.
///
/// Unlike [`RestrictionCatalog::load`], a malformed document is an error
/// rather than a silent fallback to the builtin table.
pub fn load_catalog_json(text: &str) -> Result<RestrictionCatalog, serde_json::Error> {
    let entries: Vec<RestrictionEntry> = serde_json::from_str(text)?;
    Ok(RestrictionCatalog::from_entries(entries))
}

/// Writes the entries of `catalog` as a pretty-printed JSON array.
pub fn write_catalog<W: Write>(
    writer: W,
    catalog: &RestrictionCatalog,
) -> Result<(), serde_json::Error> {
    serde_json::to_writer_pretty(writer, catalog.entries())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::restriction::{CatalogOrigin, PhysicalType};

    fn builtin_json() -> String {
        let mut buf = Vec::new();
        write_catalog(&mut buf, &RestrictionCatalog::builtin()).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn dumped_builtin_parses_back() {
        let catalog = load_catalog_json(&builtin_json()).unwrap();
        assert_eq!(catalog.origin(), CatalogOrigin::Queried);
        assert_eq!(catalog.entries(), RestrictionCatalog::builtin().entries());
    }

    #[test]
    fn json_source_feeds_load() {
        let catalog = RestrictionCatalog::load(&JsonSource::new(builtin_json()));
        assert_eq!(catalog.origin(), CatalogOrigin::Queried);
        assert!(catalog.get(PhysicalType::Msc).is_some());
    }

    #[test]
    fn malformed_source_falls_back_to_builtin() {
        let catalog = RestrictionCatalog::load(&JsonSource::new("{ not json"));
        assert_eq!(catalog.origin(), CatalogOrigin::Builtin);
        assert!(load_catalog_json("{ not json").is_err());
    }
}
