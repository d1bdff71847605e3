//! Conditional device configuration model and condition language.
//!
//! This crate is I/O-free. It turns an import-resolved JSON device document
//! into typed structures and evaluates them for a concrete device:
//!
//! - [`ConditionalDeviceConfig`]: a parsed document whose fields may carry
//!   `$if`-guarded variants.
//! - [`DeviceConfig`]: the same document evaluated for one [`DeviceId`].
//! - [`ParamInformation`], [`AssociationConfig`], [`EndpointConfig`],
//!   [`CompatConfig`] and [`DeviceMetadata`]: the evaluated sub-objects.
//! - [`logic`]: the condition language used by `$if`.
//! - [`conditional`]: the [`Evaluate`] trait shared by every field.
//!
//! Errors are [`ConfigError`] values carrying a filename-qualified message
//! and a machine-readable [`ConfigErrorKind`].
//!
//! # Example
//!
//! ```
//! use device_config_core::*;
//! use serde_json::json;
//!
//! let document = json!({
//!     "manufacturer": "Acme",
//!     "manufacturerId": "0x0001",
//!     "label": "SW1",
//!     "description": [
//!         { "$if": "firmwareVersion < 2.0", "value": "Wall switch" },
//!         "Wall switch with scene support"
//!     ],
//!     "devices": [{ "productType": "0x0001", "productId": "0x0002" }],
//!     "firmwareVersion": { "min": "1.0", "max": "255.255" }
//! });
//!
//! let config = ConditionalDeviceConfig::parse("0x0001/sw1.json", &document, true).unwrap();
//! let device = DeviceId::new(0x0001, 0x0001, 0x0002).with_firmware("1.4");
//! assert_eq!(config.evaluate(Some(&device)).unwrap().description, "Wall switch");
//! ```

mod associations;
mod compat;
pub mod conditional;
mod device;
mod endpoints;
mod error;
mod ids;
pub mod json;
pub mod logic;
mod metadata;
mod params;
pub mod version;

pub use associations::{AssociationConfig, MultiChannel};
pub use compat::{CompatConfig, EndpointSelection, FloatEncoding, MapBasicSet, WakeupQuery};
pub use conditional::{Conditional, Evaluate, Guarded};
pub use device::{ConditionalDeviceConfig, DeviceConfig, DeviceRef};
pub use endpoints::{ConditionalEndpointConfig, EndpointConfig};
pub use error::{ConfigError, ConfigErrorKind, Result};
pub use ids::{DeviceId, format_id, hex_id, parse_hex_id, parse_id_lenient};
pub use metadata::{CommentLevel, ConditionalDeviceMetadata, DeviceComment, DeviceMetadata};
pub use params::{ConditionalParamInformation, ParamInformation, ParamKey, ParamOption};
pub use version::{FirmwareVersion, FirmwareVersionRange};
