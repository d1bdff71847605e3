//! Values that may carry `$if`-guarded variants.
//!
//! Every field of a device document is either a plain value or a list of
//! guarded variants. All of them are evaluated through the single
//! [`Evaluate`] trait, which knows four shapes:
//!
//! 1. plain values return themselves,
//! 2. a [`Guarded`] value returns its payload if its condition holds,
//! 3. a `Vec` concatenates every payload that applies,
//! 4. a `BTreeMap` drops entries that do not apply and disappears when
//!    nothing is left.
//!
//! A missing condition, or evaluating without a [`DeviceId`], counts as
//! satisfied. [`Conditional`] picks the first applicable variant.
//!
//! # Examples
//!
//! ```
//! use device_config_core::conditional::{Conditional, Evaluate, parse_conditional_value};
//! use device_config_core::json::Location;
//! use device_config_core::DeviceId;
//! use serde_json::json;
//!
//! let raw = json!([{ "$if": "firmwareVersion < 1.0", "value": "A" }, "B"]);
//! let label: Conditional<String> =
//!     parse_conditional_value(&Location::root("dev.json"), &raw, |loc, v| loc.string(v)).unwrap();
//!
//! let old = DeviceId::new(1, 2, 3).with_firmware("0.5");
//! let new = DeviceId::new(1, 2, 3).with_firmware("1.0");
//! assert_eq!(label.evaluate(Some(&old)).unwrap().as_deref(), Some("A"));
//! assert_eq!(label.evaluate(Some(&new)).unwrap().as_deref(), Some("B"));
//! ```

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::Result;
use crate::ids::DeviceId;
use crate::json::{CONDITION_KEY, Location, ObjectReader};
use crate::logic::Rule;

/// Deep evaluation against an optional device identity.
///
/// `Ok(None)` means the node does not apply to the device.
pub trait Evaluate {
    type Output;

    fn evaluate(&self, device_id: Option<&DeviceId>) -> Result<Option<Self::Output>>;
}

/// Evaluates any conditional node. Shorthand for [`Evaluate::evaluate`].
pub fn evaluate_deep<N: Evaluate + ?Sized>(
    node: &N,
    device_id: Option<&DeviceId>,
) -> Result<Option<N::Output>> {
    node.evaluate(device_id)
}

macro_rules! impl_plain_evaluate {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Evaluate for $ty {
                type Output = $ty;

                fn evaluate(&self, _device_id: Option<&DeviceId>) -> Result<Option<$ty>> {
                    Ok(Some(self.clone()))
                }
            }
        )*
    };
}

impl_plain_evaluate!(String, bool, u8, u16, u32, i32, i64, f64, Value);

/// A parsed `$if` expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    rule: Rule,
}

impl Condition {
    /// Parses `expression`, reporting errors against `location`.
    pub fn parse(location: &Location<'_>, expression: &str) -> Result<Self> {
        let rule = Rule::parse(expression)
            .map_err(|err| location.child(CONDITION_KEY).invalid(err.message()))?;
        Ok(Self {
            source: expression.to_string(),
            rule,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Returns `true` when there is no identity to check against, or the
    /// identity satisfies the rule.
    pub fn applies(&self, device_id: Option<&DeviceId>) -> bool {
        device_id.is_none_or(|id| self.rule.matches(id))
    }
}

/// A value with an optional condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Guarded<T> {
    pub condition: Option<Condition>,
    pub value: T,
}

impl<T> Guarded<T> {
    pub fn unconditional(value: T) -> Self {
        Self {
            condition: None,
            value,
        }
    }

    pub fn applies(&self, device_id: Option<&DeviceId>) -> bool {
        self.condition
            .as_ref()
            .is_none_or(|condition| condition.applies(device_id))
    }
}

impl<T: Evaluate> Evaluate for Guarded<T> {
    type Output = T::Output;

    fn evaluate(&self, device_id: Option<&DeviceId>) -> Result<Option<T::Output>> {
        if self.applies(device_id) {
            self.value.evaluate(device_id)
        } else {
            Ok(None)
        }
    }
}

impl<T: Evaluate> Evaluate for Vec<T> {
    type Output = Vec<T::Output>;

    fn evaluate(&self, device_id: Option<&DeviceId>) -> Result<Option<Vec<T::Output>>> {
        let mut out = Vec::with_capacity(self.len());
        for item in self {
            if let Some(value) = item.evaluate(device_id)? {
                out.push(value);
            }
        }
        Ok(Some(out))
    }
}

impl<K: Ord + Clone, T: Evaluate> Evaluate for BTreeMap<K, T> {
    type Output = BTreeMap<K, T::Output>;

    fn evaluate(&self, device_id: Option<&DeviceId>) -> Result<Option<Self::Output>> {
        let mut out = BTreeMap::new();
        for (key, item) in self {
            if let Some(value) = item.evaluate(device_id)? {
                out.insert(key.clone(), value);
            }
        }
        Ok((!out.is_empty()).then_some(out))
    }
}

impl<T: Evaluate> Evaluate for Option<T> {
    type Output = T::Output;

    fn evaluate(&self, device_id: Option<&DeviceId>) -> Result<Option<T::Output>> {
        match self {
            Some(value) => value.evaluate(device_id),
            None => Ok(None),
        }
    }
}

/// A value, or an ordered list of guarded variants of it.
#[derive(Debug, Clone, PartialEq)]
pub enum Conditional<T> {
    Fixed(T),
    Variants(Vec<Guarded<T>>),
}

impl<T> Conditional<T> {
    /// Iterates over every variant payload, regardless of conditions.
    pub fn values(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        match self {
            Conditional::Fixed(value) => Box::new(std::iter::once(value)),
            Conditional::Variants(variants) => Box::new(variants.iter().map(|g| &g.value)),
        }
    }
}

impl<T: Evaluate> Evaluate for Conditional<T> {
    type Output = T::Output;

    /// Returns the first variant that applies. Later variants are not
    /// evaluated.
    fn evaluate(&self, device_id: Option<&DeviceId>) -> Result<Option<T::Output>> {
        match self {
            Conditional::Fixed(value) => value.evaluate(device_id),
            Conditional::Variants(variants) => {
                for variant in variants {
                    if let Some(value) = variant.evaluate(device_id)? {
                        return Ok(Some(value));
                    }
                }
                Ok(None)
            }
        }
    }
}

fn parse_condition(reader: &ObjectReader<'_, '_>) -> Result<Option<Condition>> {
    reader
        .opt_string(CONDITION_KEY)?
        .map(|expr| Condition::parse(&reader.location, &expr))
        .transpose()
}

/// Every variant but the last must be guarded, and the last must not be.
fn check_variant_discipline<T>(location: &Location<'_>, variants: &[Guarded<T>]) -> Result<()> {
    let Some((last, rest)) = variants.split_last() else {
        return Err(location.invalid("must not be an empty list of variants"));
    };
    if let Some(pos) = rest.iter().position(|v| v.condition.is_none()) {
        return Err(location.index(pos).invalid(format!(
            "must have a \"{CONDITION_KEY}\" condition because it is not the last variant"
        )));
    }
    if last.condition.is_some() {
        return Err(location.index(rest.len()).invalid(format!(
            "is the last variant and must not have a \"{CONDITION_KEY}\" condition"
        )));
    }
    Ok(())
}

fn is_value_wrapper(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.contains_key(CONDITION_KEY) || map.contains_key("value"))
}

fn parse_value_variant<T>(
    location: &Location<'_>,
    value: &Value,
    parse: &impl Fn(&Location<'_>, &Value) -> Result<T>,
) -> Result<Guarded<T>> {
    if !is_value_wrapper(value) {
        return Ok(Guarded::unconditional(parse(location, value)?));
    }
    let reader = location.object(value)?;
    reader.reject_unknown(&["value"])?;
    let condition = parse_condition(&reader)?;
    let Some(inner) = reader.get("value") else {
        return Err(reader.invalid("is missing the required property \"value\""));
    };
    Ok(Guarded {
        condition,
        value: parse(&reader.at("value"), inner)?,
    })
}

/// Parses a scalar field that may be written as a plain value, as a single
/// `{ "$if", "value" }` object, or as a list of such variants ending in an
/// unguarded one.
pub fn parse_conditional_value<T>(
    location: &Location<'_>,
    value: &Value,
    parse: impl Fn(&Location<'_>, &Value) -> Result<T>,
) -> Result<Conditional<T>> {
    match value {
        Value::Array(items) => {
            let variants = items
                .iter()
                .enumerate()
                .map(|(i, item)| parse_value_variant(&location.index(i), item, &parse))
                .collect::<Result<Vec<_>>>()?;
            check_variant_discipline(location, &variants)?;
            Ok(Conditional::Variants(variants))
        }
        _ => {
            let variant = parse_value_variant(location, value, &parse)?;
            if variant.condition.is_some() {
                Ok(Conditional::Variants(vec![variant]))
            } else {
                Ok(Conditional::Fixed(variant.value))
            }
        }
    }
}

/// Parses one object whose own `$if` key guards it.
pub fn parse_guarded_object<T>(
    location: &Location<'_>,
    value: &Value,
    parse: &impl Fn(&ObjectReader<'_, '_>) -> Result<T>,
) -> Result<Guarded<T>> {
    let reader = location.object(value)?;
    Ok(Guarded {
        condition: parse_condition(&reader)?,
        value: parse(&reader)?,
    })
}

/// Parses an object-typed field: a single object (optionally guarded by
/// its own `$if`) or a list of objects ending in an unguarded one.
pub fn parse_conditional_object<T>(
    location: &Location<'_>,
    value: &Value,
    parse: impl Fn(&ObjectReader<'_, '_>) -> Result<T>,
) -> Result<Conditional<T>> {
    match value {
        Value::Array(items) => {
            let variants = items
                .iter()
                .enumerate()
                .map(|(i, item)| parse_guarded_object(&location.index(i), item, &parse))
                .collect::<Result<Vec<_>>>()?;
            check_variant_discipline(location, &variants)?;
            Ok(Conditional::Variants(variants))
        }
        _ => {
            let variant = parse_guarded_object(location, value, &parse)?;
            if variant.condition.is_some() {
                Ok(Conditional::Variants(vec![variant]))
            } else {
                Ok(Conditional::Fixed(variant.value))
            }
        }
    }
}

/// Parses a list field where every entry may carry its own `$if` and all
/// matching entries are kept. A single object is treated as a one-element
/// list.
pub fn parse_guarded_list<T>(
    location: &Location<'_>,
    value: &Value,
    parse: impl Fn(&ObjectReader<'_, '_>) -> Result<T>,
) -> Result<Vec<Guarded<T>>> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_guarded_object(&location.index(i), item, &parse))
            .collect(),
        Value::Object(_) => Ok(vec![parse_guarded_object(location, value, &parse)?]),
        _ => Err(location.invalid("must be an object or an array of objects")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn string_field(raw: &Value) -> Result<Conditional<String>> {
        parse_conditional_value(&Location::root("dev.json").child("label"), raw, |loc, v| {
            loc.string(v)
        })
    }

    fn fw(version: &str) -> DeviceId {
        DeviceId::new(0x0086, 0x0002, 0x0064).with_firmware(version)
    }

    #[test]
    fn test_first_match_wins() {
        let label = string_field(&json!([
            { "$if": "firmwareVersion < 1.0", "value": "A" },
            "B"
        ]))
        .unwrap();
        assert_eq!(label.evaluate(Some(&fw("0.5"))).unwrap(), Some("A".into()));
        assert_eq!(label.evaluate(Some(&fw("1.0"))).unwrap(), Some("B".into()));
    }

    #[test]
    fn test_no_identity_satisfies_every_condition() {
        let label = string_field(&json!([
            { "$if": "firmwareVersion >= 2.0", "value": "new" },
            "old"
        ]))
        .unwrap();
        assert_eq!(label.evaluate(None).unwrap(), Some("new".into()));
    }

    #[test]
    fn test_plain_value_is_fixed() {
        let label = string_field(&json!("Plain")).unwrap();
        assert_eq!(label, Conditional::Fixed("Plain".to_string()));
    }

    #[test]
    fn test_single_guarded_value() {
        let label = string_field(&json!({ "$if": "productId === 0x0065", "value": "X" })).unwrap();
        assert_eq!(label.evaluate(Some(&fw("1.0"))).unwrap(), None);
        let other = DeviceId::new(0x0086, 0x0002, 0x0065);
        assert_eq!(label.evaluate(Some(&other)).unwrap(), Some("X".into()));
    }

    #[test]
    fn test_non_terminal_variant_requires_condition() {
        let err = string_field(&json!(["A", "B"])).unwrap_err();
        assert!(err.to_string().contains("label[0] must have a \"$if\""));
    }

    #[test]
    fn test_terminal_variant_must_not_have_condition() {
        let err = string_field(&json!([
            { "$if": "firmwareVersion < 1.0", "value": "A" },
            { "$if": "firmwareVersion >= 1.0", "value": "B" }
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("label[1] is the last variant"));
    }

    #[test]
    fn test_invalid_condition_is_reported_with_location() {
        let err = string_field(&json!([{ "$if": "firmwareVersion >", "value": "A" }, "B"]))
            .unwrap_err();
        assert!(err.to_string().starts_with("dev.json: label[0].$if"));
    }

    #[test]
    fn test_list_keeps_all_matches() {
        let list = parse_guarded_list(
            &Location::root("dev.json").child("comments"),
            &json!([
                { "$if": "firmwareVersion < 2.0", "text": "a" },
                { "text": "b" },
                { "$if": "firmwareVersion >= 2.0", "text": "c" }
            ]),
            |reader| reader.string("text"),
        )
        .unwrap();
        assert_eq!(
            list.evaluate(Some(&fw("1.0"))).unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(list.evaluate(None).unwrap().map(|v| v.len()), Some(3));
    }

    #[test]
    fn test_map_drops_inapplicable_entries() {
        let guarded = |expr: Option<&str>, value: &str| Guarded {
            condition: expr.map(|e| Condition::parse(&Location::root("dev.json"), e).unwrap()),
            value: value.to_string(),
        };
        let mut map = BTreeMap::new();
        map.insert(1u8, guarded(Some("firmwareVersion >= 2.0"), "late"));
        map.insert(2u8, guarded(None, "always"));
        let out = map.evaluate(Some(&fw("1.0"))).unwrap().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[&2], "always");

        let mut only_late = BTreeMap::new();
        only_late.insert(1u8, guarded(Some("firmwareVersion >= 2.0"), "late"));
        assert_eq!(only_late.evaluate(Some(&fw("1.0"))).unwrap(), None);
    }
}
