//! Device identity and hexadecimal identifier helpers.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serializer};

use crate::logic::{Context, LogicValue};

static STRICT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-f]{4}$").expect("static regex must compile"));

/// Parses a document identifier such as `"0x0086"`.
///
/// Document keys must use exactly four lowercase hex digits with a `0x`
/// prefix. Returns `None` for anything else.
pub fn parse_hex_id(text: &str) -> Option<u16> {
    if !STRICT_ID_RE.is_match(text) {
        return None;
    }
    u16::from_str_radix(&text[2..], 16).ok()
}

/// Parses user-supplied identifiers leniently: `0x`-prefixed hex of any
/// case with up to four digits, or a plain decimal number.
pub fn parse_id_lenient(text: &str) -> Option<u16> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) if !hex.is_empty() && hex.len() <= 4 => u16::from_str_radix(hex, 16).ok(),
        Some(_) => None,
        None => text.parse::<u16>().ok(),
    }
}

/// Formats an identifier the way documents and the index spell it.
///
/// ```
/// assert_eq!(device_config_core::format_id(0x86), "0x0086");
/// ```
pub fn format_id(id: u16) -> String {
    format!("0x{id:04x}")
}

/// Serde adapter storing a `u16` as a `"0x0086"` string.
pub mod hex_id {
    use super::*;

    pub fn serialize<S: Serializer>(id: &u16, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_id(*id))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_hex_id(&text).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "\"{text}\" is not a 4-digit lowercase hex identifier"
            ))
        })
    }
}

/// Identity of a physical device, used both as a lookup key and as the
/// variable context for `$if` conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub manufacturer_id: u16,
    pub product_type: u16,
    pub product_id: u16,
    pub firmware_version: Option<String>,
}

impl DeviceId {
    pub fn new(manufacturer_id: u16, product_type: u16, product_id: u16) -> Self {
        Self {
            manufacturer_id,
            product_type,
            product_id,
            firmware_version: None,
        }
    }

    /// Sets the firmware version reported by the device.
    pub fn with_firmware(mut self, version: impl Into<String>) -> Self {
        self.firmware_version = Some(version.into());
        self
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            format_id(self.manufacturer_id),
            format_id(self.product_type),
            format_id(self.product_id)
        )?;
        if let Some(fw) = &self.firmware_version {
            write!(f, " (firmware {fw})")?;
        }
        Ok(())
    }
}

impl Context for DeviceId {
    fn get(&self, name: &str) -> Option<LogicValue> {
        match name {
            "manufacturerId" => Some(LogicValue::Number(f64::from(self.manufacturer_id))),
            "productType" => Some(LogicValue::Number(f64::from(self.product_type))),
            "productId" => Some(LogicValue::Number(f64::from(self.product_id))),
            "firmwareVersion" => self.firmware_version.clone().map(LogicValue::String),
            _ => None,
        }
    }
}
