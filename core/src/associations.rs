//! Association group definitions.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::conditional::{Conditional, Evaluate, parse_conditional_object};
use crate::error::Result;
use crate::ids::DeviceId;
use crate::json::{Location, ObjectReader};

/// Whether reports to a group use multi channel encapsulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MultiChannel {
    /// Decided at runtime from the device's capabilities.
    #[default]
    Auto,
    Always,
    Never,
}

impl Serialize for MultiChannel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MultiChannel::Auto => serializer.serialize_str("auto"),
            MultiChannel::Always => serializer.serialize_bool(true),
            MultiChannel::Never => serializer.serialize_bool(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationConfig {
    pub group_id: u8,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub max_nodes: u8,
    /// The controller must be added to this group on inclusion.
    pub is_lifeline: bool,
    pub multi_channel: MultiChannel,
}

impl AssociationConfig {
    pub fn parse(group_id: u8, reader: &ObjectReader<'_, '_>) -> Result<Self> {
        reader.reject_unknown(&["label", "description", "maxNodes", "isLifeline", "multiChannel"])?;

        let max_nodes = reader
            .opt_integer_in("maxNodes", 1..=255)?
            .ok_or_else(|| reader.invalid("is missing the required property \"maxNodes\""))?;
        let multi_channel = match reader.get("multiChannel") {
            None => MultiChannel::Auto,
            Some(Value::Bool(true)) => MultiChannel::Always,
            Some(Value::Bool(false)) => MultiChannel::Never,
            Some(Value::String(s)) if s == "auto" => MultiChannel::Auto,
            Some(_) => {
                return Err(reader
                    .at("multiChannel")
                    .invalid("must be true, false or \"auto\""));
            }
        };

        Ok(Self {
            group_id,
            label: reader.string("label")?,
            description: reader.opt_string("description")?,
            max_nodes: max_nodes as u8,
            is_lifeline: reader.flag("isLifeline")?,
            multi_channel,
        })
    }
}

impl Evaluate for AssociationConfig {
    type Output = AssociationConfig;

    fn evaluate(&self, _device_id: Option<&DeviceId>) -> Result<Option<AssociationConfig>> {
        Ok(Some(self.clone()))
    }
}

pub type ConditionalAssociationMap = BTreeMap<u8, Conditional<AssociationConfig>>;

/// Parses an `associations` object keyed by decimal group id.
pub fn parse_associations(location: &Location<'_>, value: &Value) -> Result<ConditionalAssociationMap> {
    let reader = location.object(value)?;
    let mut groups = ConditionalAssociationMap::new();
    for (key, item) in reader.map {
        let group_id = location.decimal_key(key, 1..=255)? as u8;
        let group = parse_conditional_object(&location.child(key), item, |reader| {
            AssociationConfig::parse(group_id, reader)
        })?;
        groups.insert(group_id, group);
    }
    Ok(groups)
}
