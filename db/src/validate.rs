//! Database-wide consistency checks.

use std::fmt;

use device_config_core::{FirmwareVersion, format_id};

use crate::index::IndexEntry;

/// Two entries claiming the same device for overlapping firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlap {
    pub first: IndexEntry,
    pub second: IndexEntry,
}

impl fmt::Display for Overlap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{} is declared by {} ({}) and {} ({}) with overlapping firmware versions",
            format_id(self.first.manufacturer_id),
            format_id(self.first.product_type),
            format_id(self.first.product_id),
            self.first.filename,
            self.first.firmware_version,
            self.second.filename,
            self.second.firmware_version
        )
    }
}

fn firmware_overlaps(a: &FirmwareVersion, b: &FirmwareVersion) -> bool {
    match (a, b) {
        (FirmwareVersion::Range(a), FirmwareVersion::Range(b)) => a.overlaps(b),
        (FirmwareVersion::Unversioned, FirmwareVersion::Unversioned) => true,
        _ => false,
    }
}

/// Finds every pair of entries that declare the same manufacturer, product
/// type and product id with overlapping firmware, unless one of them is
/// marked `preferred`.
///
/// Meant for the embedded index; user-supplied documents are allowed to
/// shadow embedded ones.
pub fn find_overlaps(entries: &[IndexEntry]) -> Vec<Overlap> {
    let mut overlaps = Vec::new();
    for (i, first) in entries.iter().enumerate() {
        for second in &entries[i + 1..] {
            let same_device = first.manufacturer_id == second.manufacturer_id
                && first.product_type == second.product_type
                && first.product_id == second.product_id;
            if same_device
                && !first.preferred
                && !second.preferred
                && firmware_overlaps(&first.firmware_version, &second.firmware_version)
            {
                overlaps.push(Overlap {
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        }
    }
    overlaps
}
