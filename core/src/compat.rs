//! Compatibility flags that work around device firmware quirks.
//!
//! A document's `compat` block may be a single object or a list of
//! `$if`-guarded variants, so different firmware ranges of the same device
//! can carry different workarounds.

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::conditional::{Conditional, Evaluate, parse_conditional_object};
use crate::error::Result;
use crate::ids::DeviceId;
use crate::json::{Location, ObjectReader};

/// How incoming Basic CC Set commands are mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MapBasicSet {
    #[serde(rename = "report")]
    Report,
    #[serde(rename = "event")]
    Event,
    #[serde(rename = "Binary Sensor")]
    BinarySensor,
    #[serde(rename = "auto")]
    Auto,
}

impl MapBasicSet {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "report" => Some(MapBasicSet::Report),
            "event" => Some(MapBasicSet::Event),
            "Binary Sensor" => Some(MapBasicSet::BinarySensor),
            "auto" => Some(MapBasicSet::Auto),
            _ => None,
        }
    }
}

/// `"*"` or an explicit list of endpoint indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSelection {
    All,
    Only(Vec<u8>),
}

impl Serialize for EndpointSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            EndpointSelection::All => serializer.serialize_str("*"),
            EndpointSelection::Only(indices) => indices.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FloatEncoding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u8>,
}

/// A command to send whenever the device wakes up: CC name, method name,
/// then the method arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WakeupQuery {
    pub command_class: String,
    pub method: String,
    pub args: Vec<Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatConfig {
    #[serde(skip_serializing_if = "is_false")]
    pub disable_basic_mapping: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub disable_strict_entry_control_data_validation: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub disable_strict_measurement_validation: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub force_notification_idle_reset: bool,
    #[serde(rename = "preserveRootApplicationCCValueIDs", skip_serializing_if = "is_false")]
    pub preserve_root_application_cc_value_ids: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub skip_configuration_name_query: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub skip_configuration_info_query: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub treat_basic_set_as_event: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub treat_multilevel_switch_set_as_event: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub treat_destination_endpoint_as_source: bool,
    #[serde(rename = "useUTCInTimeParametersCC", skip_serializing_if = "is_false")]
    pub use_utc_in_time_parameters_cc: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_root_reports_to_endpoint: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_value_refresh_delay_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_timeout: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_scene_controller_group_count: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_basic_set: Option<MapBasicSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_float_encoding: Option<FloatEncoding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_endpoints: Option<EndpointSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_endpoints: Option<EndpointSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub query_on_wakeup: Vec<WakeupQuery>,
}

const FLAGS: &[&str] = &[
    "disableBasicMapping",
    "disableStrictEntryControlDataValidation",
    "disableStrictMeasurementValidation",
    "forceNotificationIdleReset",
    "preserveRootApplicationCCValueIDs",
    "skipConfigurationNameQuery",
    "skipConfigurationInfoQuery",
    "treatBasicSetAsEvent",
    "treatMultilevelSwitchSetAsEvent",
    "treatDestinationEndpointAsSource",
    "useUTCInTimeParametersCC",
];

const VALUES: &[&str] = &[
    "mapRootReportsToEndpoint",
    "manualValueRefreshDelayMs",
    "reportTimeout",
    "forceSceneControllerGroupCount",
    "mapBasicSet",
    "overrideFloatEncoding",
    "preserveEndpoints",
    "removeEndpoints",
    "queryOnWakeup",
];

impl CompatConfig {
    pub fn parse(reader: &ObjectReader<'_, '_>) -> Result<Self> {
        let allowed: Vec<&str> = FLAGS.iter().chain(VALUES).copied().collect();
        reader.reject_unknown(&allowed)?;

        let mut compat = CompatConfig {
            disable_basic_mapping: reader.flag("disableBasicMapping")?,
            disable_strict_entry_control_data_validation: reader
                .flag("disableStrictEntryControlDataValidation")?,
            disable_strict_measurement_validation: reader
                .flag("disableStrictMeasurementValidation")?,
            force_notification_idle_reset: reader.flag("forceNotificationIdleReset")?,
            preserve_root_application_cc_value_ids: reader
                .flag("preserveRootApplicationCCValueIDs")?,
            skip_configuration_name_query: reader.flag("skipConfigurationNameQuery")?,
            skip_configuration_info_query: reader.flag("skipConfigurationInfoQuery")?,
            treat_basic_set_as_event: reader.flag("treatBasicSetAsEvent")?,
            treat_multilevel_switch_set_as_event: reader
                .flag("treatMultilevelSwitchSetAsEvent")?,
            treat_destination_endpoint_as_source: reader
                .flag("treatDestinationEndpointAsSource")?,
            use_utc_in_time_parameters_cc: reader.flag("useUTCInTimeParametersCC")?,
            map_root_reports_to_endpoint: reader
                .opt_integer_in("mapRootReportsToEndpoint", 1..=127)?
                .map(|n| n as u8),
            manual_value_refresh_delay_ms: reader
                .opt_integer_in("manualValueRefreshDelayMs", 0..=i64::from(u32::MAX))?
                .map(|n| n as u32),
            report_timeout: reader
                .opt_integer_in("reportTimeout", 1..=10000)?
                .map(|n| n as u16),
            force_scene_controller_group_count: reader
                .opt_integer_in("forceSceneControllerGroupCount", 0..=255)?
                .map(|n| n as u8),
            ..CompatConfig::default()
        };

        if let Some(text) = reader.opt_string("mapBasicSet")? {
            compat.map_basic_set = Some(MapBasicSet::parse(&text).ok_or_else(|| {
                reader
                    .at("mapBasicSet")
                    .invalid("must be \"report\", \"event\", \"Binary Sensor\" or \"auto\"")
            })?);
        }

        if let Some(value) = reader.get("overrideFloatEncoding") {
            let encoding = reader.at("overrideFloatEncoding").object(value)?;
            encoding.reject_unknown(&["precision", "size"])?;
            let precision = encoding.opt_integer_in("precision", 0..=7)?.map(|n| n as u8);
            let size = encoding.opt_integer_in("size", 1..=4)?.map(|n| n as u8);
            if precision.is_none() && size.is_none() {
                return Err(encoding.invalid("must declare precision or size"));
            }
            compat.override_float_encoding = Some(FloatEncoding { precision, size });
        }

        if let Some(value) = reader.get("preserveEndpoints") {
            compat.preserve_endpoints =
                Some(parse_endpoint_selection(&reader.at("preserveEndpoints"), value)?);
        }
        if let Some(value) = reader.get("removeEndpoints") {
            compat.remove_endpoints =
                Some(parse_endpoint_selection(&reader.at("removeEndpoints"), value)?);
        }
        if let Some(value) = reader.get("queryOnWakeup") {
            compat.query_on_wakeup = parse_wakeup_queries(&reader.at("queryOnWakeup"), value)?;
        }

        Ok(compat)
    }
}

fn parse_endpoint_selection(location: &Location<'_>, value: &Value) -> Result<EndpointSelection> {
    match value {
        Value::String(s) if s == "*" => Ok(EndpointSelection::All),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item.as_u64() {
                Some(n @ 1..=127) => Ok(n as u8),
                _ => Err(location.index(i).invalid("must be an endpoint index between 1 and 127")),
            })
            .collect::<Result<Vec<_>>>()
            .map(EndpointSelection::Only),
        _ => Err(location.invalid("must be \"*\" or an array of endpoint indices")),
    }
}

fn parse_wakeup_queries(location: &Location<'_>, value: &Value) -> Result<Vec<WakeupQuery>> {
    let Value::Array(items) = value else {
        return Err(location.invalid("must be an array"));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let entry = location.index(i);
            match item.as_array().map(Vec::as_slice) {
                Some([Value::String(cc), Value::String(method), args @ ..]) => Ok(WakeupQuery {
                    command_class: cc.clone(),
                    method: method.clone(),
                    args: args.to_vec(),
                }),
                _ => Err(entry.invalid("must be an array starting with a CC name and a method name")),
            }
        })
        .collect()
}

impl Evaluate for CompatConfig {
    type Output = CompatConfig;

    fn evaluate(&self, _device_id: Option<&DeviceId>) -> Result<Option<CompatConfig>> {
        Ok(Some(self.clone()))
    }
}

/// Parses a `compat` block, either a single object or a variant list.
pub fn parse_compat(location: &Location<'_>, value: &Value) -> Result<Conditional<CompatConfig>> {
    parse_conditional_object(location, value, CompatConfig::parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<Conditional<CompatConfig>> {
        parse_compat(&Location::root("dev.json").child("compat"), &value)
    }

    #[test]
    fn test_parse_typed_fields() {
        let compat = parse(json!({
            "treatBasicSetAsEvent": true,
            "mapBasicSet": "Binary Sensor",
            "reportTimeout": 2000,
            "preserveEndpoints": "*",
            "removeEndpoints": [2, 3],
            "overrideFloatEncoding": { "precision": 1 },
            "queryOnWakeup": [["Battery", "get"], ["Configuration", "get", 5]]
        }))
        .unwrap();
        let compat = compat.evaluate(None).unwrap().unwrap();
        assert!(compat.treat_basic_set_as_event);
        assert_eq!(compat.map_basic_set, Some(MapBasicSet::BinarySensor));
        assert_eq!(compat.preserve_endpoints, Some(EndpointSelection::All));
        assert_eq!(compat.remove_endpoints, Some(EndpointSelection::Only(vec![2, 3])));
        assert_eq!(compat.query_on_wakeup[1].args, vec![json!(5)]);

        let json = serde_json::to_value(&compat).unwrap();
        assert_eq!(json["mapBasicSet"], json!("Binary Sensor"));
        assert_eq!(json["preserveEndpoints"], json!("*"));
        assert!(json.get("disableBasicMapping").is_none());
    }

    #[test]
    fn test_variants_per_firmware() {
        let compat = parse(json!([
            { "$if": "firmwareVersion < 1.5", "disableBasicMapping": true },
            { "reportTimeout": 5000 }
        ]))
        .unwrap();
        let old = DeviceId::new(1, 2, 3).with_firmware("1.2");
        let new = DeviceId::new(1, 2, 3).with_firmware("1.5");
        assert!(compat.evaluate(Some(&old)).unwrap().unwrap().disable_basic_mapping);
        let newer = compat.evaluate(Some(&new)).unwrap().unwrap();
        assert!(!newer.disable_basic_mapping);
        assert_eq!(newer.report_timeout, Some(5000));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(parse(json!({ "unknownFlag": true })).is_err());
        assert!(parse(json!({ "reportTimeout": 0 })).is_err());
        assert!(parse(json!({ "disableBasicMapping": false })).is_err());
        assert!(parse(json!({ "mapBasicSet": "sometimes" })).is_err());
        assert!(parse(json!({ "overrideFloatEncoding": {} })).is_err());
        assert!(parse(json!({ "queryOnWakeup": [["Battery"]] })).is_err());
    }
}
