//! The device document: parsed once into a [`ConditionalDeviceConfig`],
//! then evaluated per device into a [`DeviceConfig`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::associations::{AssociationConfig, ConditionalAssociationMap, parse_associations};
use crate::compat::{CompatConfig, parse_compat};
use crate::conditional::{Conditional, Evaluate, parse_conditional_value};
use crate::endpoints::{ConditionalEndpointMap, EndpointConfig, parse_endpoints};
use crate::error::Result;
use crate::ids::{DeviceId, hex_id, parse_hex_id};
use crate::json::{Location, ObjectReader};
use crate::metadata::{ConditionalDeviceMetadata, DeviceMetadata};
use crate::params::{ConditionalParamMap, ParamInformation, ParamKey, parse_param_information};
use crate::version::{FirmwareVersion, FirmwareVersionRange};

/// One `(productType, productId)` pair covered by a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRef {
    #[serde(with = "hex_id")]
    pub product_type: u16,
    #[serde(with = "hex_id")]
    pub product_id: u16,
}

const TOP_LEVEL_PROPERTIES: &[&str] = &[
    "manufacturer",
    "manufacturerId",
    "label",
    "description",
    "devices",
    "firmwareVersion",
    "preferred",
    "endpoints",
    "associations",
    "paramInformation",
    "proprietary",
    "compat",
    "metadata",
];

/// A parsed but unevaluated device document.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalDeviceConfig {
    pub filename: String,
    /// Shipped with the database rather than supplied by the user.
    pub is_embedded: bool,
    pub manufacturer: Conditional<String>,
    pub manufacturer_id: u16,
    pub label: Conditional<String>,
    pub description: Conditional<String>,
    pub devices: Vec<DeviceRef>,
    pub firmware_version: FirmwareVersion,
    pub preferred: bool,
    pub endpoints: ConditionalEndpointMap,
    pub associations: ConditionalAssociationMap,
    pub param_information: ConditionalParamMap,
    pub proprietary: Option<Value>,
    pub compat: Option<Conditional<CompatConfig>>,
    pub metadata: Option<ConditionalDeviceMetadata>,
}

/// A device document evaluated for one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub filename: String,
    #[serde(skip)]
    pub is_embedded: bool,
    pub manufacturer: String,
    #[serde(with = "hex_id")]
    pub manufacturer_id: u16,
    pub label: String,
    pub description: String,
    pub devices: Vec<DeviceRef>,
    pub firmware_version: FirmwareVersion,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub preferred: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub endpoints: BTreeMap<u8, EndpointConfig>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub associations: BTreeMap<u8, AssociationConfig>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub param_information: BTreeMap<ParamKey, ParamInformation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proprietary: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compat: Option<CompatConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DeviceMetadata>,
}

impl DeviceConfig {
    /// Looks up a parameter by number and optional bit mask.
    pub fn param(&self, key: &ParamKey) -> Option<&ParamInformation> {
        self.param_information.get(key)
    }

    /// All partial parameters sharing `parameter`, ordered by mask.
    pub fn partial_params(&self, parameter: u16) -> impl Iterator<Item = &ParamInformation> {
        self.param_information
            .iter()
            .filter(move |(key, _)| key.parameter == parameter && key.is_partial())
            .map(|(_, param)| param)
    }
}

fn parse_id(reader: &ObjectReader<'_, '_>, key: &str) -> Result<u16> {
    let text = reader.string(key)?;
    parse_hex_id(&text).ok_or_else(|| {
        reader
            .at(key)
            .invalid(format!("\"{text}\" must be a lowercase 4-digit hex id like 0x00ab"))
    })
}

fn parse_firmware_version(location: &Location<'_>, value: &Value) -> Result<FirmwareVersion> {
    if value == &Value::Bool(false) {
        return Ok(FirmwareVersion::Unversioned);
    }
    let reader = location
        .object(value)
        .map_err(|_| location.invalid("must be an object with min and max, or false"))?;
    reader.reject_unknown(&["min", "max"])?;
    let range = FirmwareVersionRange::new(reader.string("min")?, reader.string("max")?)
        .map_err(|err| Location::root(location.file).invalid(err.message()))?;
    Ok(FirmwareVersion::Range(range))
}

fn parse_string_field(reader: &ObjectReader<'_, '_>, key: &str) -> Result<Conditional<String>> {
    match reader.get(key) {
        Some(value) => parse_conditional_value(&reader.at(key), value, |loc, v| loc.string(v)),
        None => Err(reader.invalid(format!("is missing the required property \"{key}\""))),
    }
}

impl ConditionalDeviceConfig {
    /// Parses an import-resolved document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`](crate::ConfigError::Invalid) with a
    /// message prefixed by `filename` on any structural violation.
    pub fn parse(filename: &str, document: &Value, is_embedded: bool) -> Result<Self> {
        let root = Location::root(filename);
        let reader = root
            .object(document)
            .map_err(|_| root.invalid("the document must be an object"))?;
        reader.reject_unknown(TOP_LEVEL_PROPERTIES)?;

        let manufacturer_id = parse_id(&reader, "manufacturerId")?;

        let devices_location = reader.at("devices");
        let devices = match reader.get("devices") {
            Some(Value::Array(items)) if !items.is_empty() => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let device = devices_location.index(i).object(item)?;
                    device.reject_unknown(&["productType", "productId"])?;
                    Ok(DeviceRef {
                        product_type: parse_id(&device, "productType")?,
                        product_id: parse_id(&device, "productId")?,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(devices_location.invalid("must be a non-empty array")),
        };

        let firmware_version = match reader.get("firmwareVersion") {
            Some(value) => parse_firmware_version(&reader.at("firmwareVersion"), value)?,
            None => {
                return Err(reader.invalid("is missing the required property \"firmwareVersion\""));
            }
        };

        let endpoints = reader
            .get("endpoints")
            .map(|value| parse_endpoints(&reader.at("endpoints"), value))
            .transpose()?
            .unwrap_or_default();
        let associations = reader
            .get("associations")
            .map(|value| parse_associations(&reader.at("associations"), value))
            .transpose()?
            .unwrap_or_default();
        let param_information = reader
            .get("paramInformation")
            .map(|value| parse_param_information(&reader.at("paramInformation"), value))
            .transpose()?
            .unwrap_or_default();

        let proprietary = match reader.get("proprietary") {
            Some(value @ Value::Object(_)) => Some(value.clone()),
            Some(_) => return Err(reader.at("proprietary").invalid("must be an object")),
            None => None,
        };

        let compat = reader
            .get("compat")
            .map(|value| parse_compat(&reader.at("compat"), value))
            .transpose()?;
        let metadata = reader
            .get("metadata")
            .map(|value| ConditionalDeviceMetadata::parse(&reader.at("metadata"), value))
            .transpose()?;

        Ok(Self {
            filename: filename.to_string(),
            is_embedded,
            manufacturer: parse_string_field(&reader, "manufacturer")?,
            manufacturer_id,
            label: parse_string_field(&reader, "label")?,
            description: parse_string_field(&reader, "description")?,
            devices,
            firmware_version,
            preferred: reader.flag("preferred")?,
            endpoints,
            associations,
            param_information,
            proprietary,
            compat,
            metadata,
        })
    }

    /// Returns `true` if this document declares the device's identity.
    /// Firmware is not checked.
    pub fn covers(&self, device_id: &DeviceId) -> bool {
        self.manufacturer_id == device_id.manufacturer_id
            && self.devices.iter().any(|d| {
                d.product_type == device_id.product_type && d.product_id == device_id.product_id
            })
    }

    fn required(&self, field: &str, value: Option<String>) -> Result<String> {
        value.ok_or_else(|| {
            Location::root(&self.filename)
                .child(field)
                .invalid("has no variant that applies to this device")
        })
    }

    /// Evaluates every conditional field for `device_id`. Without an
    /// identity every condition counts as satisfied.
    pub fn evaluate(&self, device_id: Option<&DeviceId>) -> Result<DeviceConfig> {
        Ok(DeviceConfig {
            filename: self.filename.clone(),
            is_embedded: self.is_embedded,
            manufacturer: self.required("manufacturer", self.manufacturer.evaluate(device_id)?)?,
            manufacturer_id: self.manufacturer_id,
            label: self.required("label", self.label.evaluate(device_id)?)?,
            description: self.required("description", self.description.evaluate(device_id)?)?,
            devices: self.devices.clone(),
            firmware_version: self.firmware_version.clone(),
            preferred: self.preferred,
            endpoints: self.endpoints.evaluate(device_id)?.unwrap_or_default(),
            associations: self.associations.evaluate(device_id)?.unwrap_or_default(),
            param_information: self.param_information.evaluate(device_id)?.unwrap_or_default(),
            proprietary: self.proprietary.clone(),
            compat: self.compat.evaluate(device_id)?,
            metadata: self.metadata.evaluate(device_id)?,
        })
    }
}
