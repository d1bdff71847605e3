//! Per-endpoint overrides.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::associations::{AssociationConfig, ConditionalAssociationMap, parse_associations};
use crate::conditional::{Conditional, Evaluate, parse_conditional_object};
use crate::error::Result;
use crate::ids::DeviceId;
use crate::json::{Location, ObjectReader};

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalEndpointConfig {
    pub index: u8,
    pub label: Option<String>,
    pub associations: ConditionalAssociationMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub index: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub associations: BTreeMap<u8, AssociationConfig>,
}

impl ConditionalEndpointConfig {
    pub fn parse(index: u8, reader: &ObjectReader<'_, '_>) -> Result<Self> {
        reader.reject_unknown(&["label", "associations"])?;
        let associations = match reader.get("associations") {
            Some(value) => parse_associations(&reader.at("associations"), value)?,
            None => ConditionalAssociationMap::new(),
        };
        Ok(Self {
            index,
            label: reader.opt_string("label")?,
            associations,
        })
    }
}

impl Evaluate for ConditionalEndpointConfig {
    type Output = EndpointConfig;

    fn evaluate(&self, device_id: Option<&DeviceId>) -> Result<Option<EndpointConfig>> {
        Ok(Some(EndpointConfig {
            index: self.index,
            label: self.label.clone(),
            associations: self.associations.evaluate(device_id)?.unwrap_or_default(),
        }))
    }
}

pub type ConditionalEndpointMap = BTreeMap<u8, Conditional<ConditionalEndpointConfig>>;

/// Parses an `endpoints` object keyed by endpoint index. The root endpoint
/// `0` is described by the document itself and cannot appear here.
pub fn parse_endpoints(location: &Location<'_>, value: &Value) -> Result<ConditionalEndpointMap> {
    let reader = location.object(value)?;
    let mut endpoints = ConditionalEndpointMap::new();
    for (key, item) in reader.map {
        if key == "0" {
            return Err(location
                .child(key)
                .invalid("the root endpoint must not be configured under endpoints"));
        }
        let index = location.decimal_key(key, 1..=127)? as u8;
        let endpoint = parse_conditional_object(&location.child(key), item, |reader| {
            ConditionalEndpointConfig::parse(index, reader)
        })?;
        endpoints.insert(index, endpoint);
    }
    Ok(endpoints)
}
