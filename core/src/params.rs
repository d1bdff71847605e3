//! Configuration parameter definitions.
//!
//! Parameters are keyed by number, optionally followed by a bit mask for
//! partial parameters (`"10[0x0c]"`). The bounds of a partial parameter
//! are relative to the rightmost set bit of its mask: a value `v` is stored
//! as `v << mask.trailing_zeros()`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::conditional::{
    Conditional, Evaluate, Guarded, parse_conditional_object, parse_guarded_list,
    parse_guarded_object,
};
use crate::error::{ConfigError, Result};
use crate::ids::DeviceId;
use crate::json::{CONDITION_KEY, Location, ObjectReader};

static PARAM_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:\[0x([0-9a-fA-F]+)\])?$").expect("static regex must compile")
});

/// Parameter number plus optional bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamKey {
    pub parameter: u16,
    pub value_bit_mask: Option<u32>,
}

impl ParamKey {
    pub fn new(parameter: u16) -> Self {
        Self {
            parameter,
            value_bit_mask: None,
        }
    }

    pub fn partial(parameter: u16, value_bit_mask: u32) -> Self {
        Self {
            parameter,
            value_bit_mask: Some(value_bit_mask),
        }
    }

    pub fn is_partial(&self) -> bool {
        self.value_bit_mask.is_some()
    }

    /// Position of the rightmost set bit of the mask, or 0.
    pub fn shift(&self) -> u32 {
        self.value_bit_mask.map_or(0, u32::trailing_zeros)
    }
}

impl FromStr for ParamKey {
    type Err = String;

    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        let caps = PARAM_KEY_RE
            .captures(text)
            .ok_or_else(|| format!("\"{text}\" is not a valid parameter key"))?;
        let parameter = caps[1]
            .parse::<u16>()
            .map_err(|_| format!("parameter number in \"{text}\" is out of range"))?;
        let value_bit_mask = match caps.get(2) {
            Some(mask) => {
                let mask = u32::from_str_radix(mask.as_str(), 16)
                    .map_err(|_| format!("bit mask in \"{text}\" is out of range"))?;
                if mask == 0 {
                    return Err(format!("bit mask in \"{text}\" must not be zero"));
                }
                Some(mask)
            }
            None => None,
        };
        Ok(Self {
            parameter,
            value_bit_mask,
        })
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value_bit_mask {
            Some(mask) => write!(f, "{}[0x{mask:02x}]", self.parameter),
            None => write!(f, "{}", self.parameter),
        }
    }
}

impl Serialize for ParamKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One predefined value of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamOption {
    pub value: i64,
    pub label: String,
}

impl Evaluate for ParamOption {
    type Output = ParamOption;

    fn evaluate(&self, _device_id: Option<&DeviceId>) -> Result<Option<ParamOption>> {
        Ok(Some(self.clone()))
    }
}

/// Unevaluated parameter definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalParamInformation {
    filename: String,
    pub key: ParamKey,
    pub label: String,
    pub description: Option<String>,
    pub value_size: u8,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub default_value: Option<i64>,
    pub unsigned: bool,
    pub unit: Option<String>,
    pub read_only: bool,
    pub write_only: bool,
    pub allow_manual_entry: bool,
    pub options: Vec<Guarded<ParamOption>>,
}

/// Evaluated parameter definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamInformation {
    pub parameter_number: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_bit_mask: Option<u32>,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value_size: u8,
    pub min_value: i64,
    pub max_value: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<i64>,
    pub unsigned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub read_only: bool,
    pub write_only: bool,
    pub allow_manual_entry: bool,
    pub options: Vec<ParamOption>,
}

const PARAM_PROPERTIES: &[&str] = &[
    "label",
    "description",
    "valueSize",
    "minValue",
    "maxValue",
    "defaultValue",
    "unsigned",
    "unit",
    "readOnly",
    "writeOnly",
    "allowManualEntry",
    "options",
];

impl ConditionalParamInformation {
    /// Parses one parameter object.
    pub fn parse(key: ParamKey, reader: &ObjectReader<'_, '_>) -> Result<Self> {
        reader.reject_unknown(PARAM_PROPERTIES)?;

        let label = reader.string("label")?;
        let description = reader.opt_string("description")?;
        let value_size = reader
            .opt_integer_in("valueSize", 1..=4)?
            .ok_or_else(|| reader.invalid("is missing the required property \"valueSize\""))?
            as u8;
        let unsigned = reader.flag("unsigned")?;
        let unit = reader.opt_string("unit")?;
        let read_only = reader.flag("readOnly")?;
        let write_only = reader.flag("writeOnly")?;
        if read_only && write_only {
            return Err(reader.invalid("readOnly and writeOnly are mutually exclusive"));
        }

        let allow_manual_entry = match reader.opt_bool("allowManualEntry")? {
            Some(true) if read_only => {
                return Err(reader
                    .at("allowManualEntry")
                    .invalid("must be false or omitted for readOnly parameters"));
            }
            Some(value) => value,
            None => !read_only,
        };

        let min_value = reader.opt_integer("minValue")?;
        let max_value = reader.opt_integer("maxValue")?;
        if (min_value.is_none() || max_value.is_none()) && allow_manual_entry {
            return Err(reader.invalid(
                "must declare minValue and maxValue unless allowManualEntry is false",
            ));
        }

        let default_value = reader.opt_integer("defaultValue")?;
        if default_value.is_none() && !read_only {
            return Err(reader.invalid("is missing the required property \"defaultValue\""));
        }

        if let Some(mask) = key.value_bit_mask {
            if mask > max_unsigned(value_size) as u32 {
                return Err(reader.invalid(format!(
                    "bit mask 0x{mask:x} does not fit into valueSize {value_size}"
                )));
            }
        }

        let options = match reader.get("options") {
            Some(value @ Value::Array(_)) => {
                parse_guarded_list(&reader.at("options"), value, |option| {
                    option.reject_unknown(&["value", "label"])?;
                    Ok(ParamOption {
                        value: option.integer("value")?,
                        label: option.string("label")?,
                    })
                })?
            }
            Some(_) => return Err(reader.at("options").invalid("must be an array")),
            None => Vec::new(),
        };

        Ok(Self {
            filename: reader.location.file.to_string(),
            key,
            label,
            description,
            value_size,
            min_value,
            max_value,
            default_value,
            unsigned,
            unit,
            read_only,
            write_only,
            allow_manual_entry,
            options,
        })
    }

    fn invalid(&self, message: impl fmt::Display) -> ConfigError {
        ConfigError::invalid(
            &self.filename,
            format!("paramInformation.{} {message}", self.key),
        )
    }

    /// Checks that `value` is representable by this parameter.
    fn check_value(&self, name: &str, value: i64) -> Result<()> {
        if let Some(mask) = self.key.value_bit_mask {
            let shifted = i64::from(mask >> self.key.shift());
            if value >= 0 && value & shifted != value {
                return Err(self.invalid(format!(
                    "{name} {value} does not fit into the bit mask 0x{mask:x}"
                )));
            }
            let bits = mask.count_ones();
            let (min, max) = if self.unsigned {
                (0, shifted)
            } else {
                let half = 1i64 << (bits - 1);
                (-half, half - 1)
            };
            if value < min || value > max {
                let kind = if self.unsigned { "unsigned" } else { "signed" };
                return Err(self.invalid(format!(
                    "{name} {value} does not fit into the {bits} {kind} bits of the bit mask 0x{mask:x}"
                )));
            }
            return Ok(());
        }

        let (min, max) = if self.unsigned {
            (0, max_unsigned(self.value_size))
        } else {
            let half = 1i64 << (8 * i64::from(self.value_size) - 1);
            (-half, half - 1)
        };
        if value < min || value > max {
            let kind = if self.unsigned { "unsigned" } else { "signed" };
            return Err(self.invalid(format!(
                "{name} {value} is outside the {kind} range of valueSize {} ({min}..={max})",
                self.value_size
            )));
        }
        Ok(())
    }
}

fn max_unsigned(value_size: u8) -> i64 {
    (1i64 << (8 * i64::from(value_size))) - 1
}

impl Evaluate for ConditionalParamInformation {
    type Output = ParamInformation;

    fn evaluate(&self, device_id: Option<&DeviceId>) -> Result<Option<ParamInformation>> {
        let options = self.options.evaluate(device_id)?.unwrap_or_default();

        let min_value = match self.min_value {
            Some(min) => min,
            None => options
                .iter()
                .map(|o| o.value)
                .min()
                .ok_or_else(|| self.invalid("has no minValue and no options to infer it from"))?,
        };
        let max_value = match self.max_value {
            Some(max) => max,
            None => options
                .iter()
                .map(|o| o.value)
                .max()
                .ok_or_else(|| self.invalid("has no maxValue and no options to infer it from"))?,
        };
        if min_value > max_value {
            return Err(self.invalid(format!(
                "minValue {min_value} must not be greater than maxValue {max_value}"
            )));
        }

        self.check_value("minValue", min_value)?;
        self.check_value("maxValue", max_value)?;
        if let Some(default) = self.default_value {
            self.check_value("defaultValue", default)?;
        }
        for option in &options {
            self.check_value("option value", option.value)?;
        }

        Ok(Some(ParamInformation {
            parameter_number: self.key.parameter,
            value_bit_mask: self.key.value_bit_mask,
            label: self.label.clone(),
            description: self.description.clone(),
            value_size: self.value_size,
            min_value,
            max_value,
            default_value: self.default_value,
            unsigned: self.unsigned,
            unit: self.unit.clone(),
            read_only: self.read_only,
            write_only: self.write_only,
            allow_manual_entry: self.allow_manual_entry,
            options,
        }))
    }
}

/// Unevaluated `paramInformation` block.
pub type ConditionalParamMap = BTreeMap<ParamKey, Conditional<ConditionalParamInformation>>;

fn parse_key(location: &Location<'_>, text: &str) -> Result<ParamKey> {
    text.parse::<ParamKey>()
        .map_err(|reason| location.invalid(reason))
}

/// Parses `paramInformation`, written either as a map keyed by parameter
/// key or as an array of objects tagged with `"#"`.
///
/// In the array form the same key may appear several times; the entries
/// become variants of one parameter in source order.
pub fn parse_param_information(location: &Location<'_>, value: &Value) -> Result<ConditionalParamMap> {
    let mut params = ConditionalParamMap::new();
    match value {
        Value::Object(map) => {
            for (text, item) in map {
                let item_location = location.child(text);
                let key = parse_key(&item_location, text)?;
                let param = parse_conditional_object(&item_location, item, |reader| {
                    ConditionalParamInformation::parse(key, reader)
                })?;
                params.insert(key, param);
            }
        }
        Value::Array(items) => {
            let mut grouped: BTreeMap<ParamKey, Vec<(usize, Guarded<ConditionalParamInformation>)>> =
                BTreeMap::new();
            for (i, item) in items.iter().enumerate() {
                let item_location = location.index(i);
                let reader = item_location.object(item)?;
                let key = parse_key(&reader.at("#"), &reader.string("#")?)?;
                let parse = |reader: &ObjectReader<'_, '_>| {
                    ConditionalParamInformation::parse(key, reader)
                };
                let variant = parse_guarded_object(&item_location, item, &parse)?;
                grouped.entry(key).or_default().push((i, variant));
            }
            for (key, mut variants) in grouped {
                if let Some((_, rest)) = variants.split_last() {
                    if let Some((i, _)) = rest.iter().find(|(_, v)| v.condition.is_none()) {
                        return Err(location.index(*i).invalid(format!(
                            "must have a \"{CONDITION_KEY}\" condition because parameter {key} is declared again later"
                        )));
                    }
                }
                let param = if variants.len() == 1 && variants[0].1.condition.is_none() {
                    Conditional::Fixed(variants.remove(0).1.value)
                } else {
                    Conditional::Variants(variants.into_iter().map(|(_, v)| v).collect())
                };
                params.insert(key, param);
            }
        }
        _ => return Err(location.invalid("must be an object or an array")),
    }

    for key in params.keys() {
        if !key.is_partial()
            && params
                .keys()
                .any(|other| other.parameter == key.parameter && other.is_partial())
        {
            return Err(location.invalid(format!(
                "declares parameter {} both as a whole and as partial parameters",
                key.parameter
            )));
        }
    }

    Ok(params)
}
