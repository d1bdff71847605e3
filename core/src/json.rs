//! Typed, filename-qualified accessors over raw JSON document trees.

use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};

/// Key of the `$if` guard on conditional items.
pub const CONDITION_KEY: &str = "$if";

/// Position inside a document, used to qualify error messages.
#[derive(Debug, Clone)]
pub struct Location<'a> {
    pub file: &'a str,
    pub path: String,
}

impl<'a> Location<'a> {
    pub fn root(file: &'a str) -> Self {
        Self {
            file,
            path: String::new(),
        }
    }

    /// Location of `key` below this one.
    pub fn child(&self, key: impl std::fmt::Display) -> Self {
        let path = if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.path)
        };
        Self {
            file: self.file,
            path,
        }
    }

    /// Location of the array element at `index`.
    pub fn index(&self, index: usize) -> Self {
        Self {
            file: self.file,
            path: format!("{}[{index}]", self.path),
        }
    }

    /// Builds an [`ConfigError::Invalid`] naming the file and path.
    pub fn invalid(&self, message: impl std::fmt::Display) -> ConfigError {
        if self.path.is_empty() {
            ConfigError::invalid(self.file, message)
        } else {
            ConfigError::invalid(self.file, format!("{} {message}", self.path))
        }
    }

    /// Views `value` as an object.
    pub fn object<'v>(&self, value: &'v Value) -> Result<ObjectReader<'a, 'v>> {
        match value {
            Value::Object(map) => Ok(ObjectReader {
                location: self.clone(),
                map,
            }),
            _ => Err(self.invalid("must be an object")),
        }
    }

    pub fn string(&self, value: &Value) -> Result<String> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.invalid("must be a string"))
    }

    pub fn integer(&self, value: &Value) -> Result<i64> {
        value
            .as_i64()
            .ok_or_else(|| self.invalid("must be an integer"))
    }

    /// Parses a decimal map key such as an association group or endpoint
    /// index. Anything but ASCII digits is rejected.
    pub fn decimal_key(&self, key: &str, range: std::ops::RangeInclusive<u32>) -> Result<u32> {
        let location = self.child(key);
        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
            return Err(location.invalid("is not a valid decimal key"));
        }
        match key.parse::<u32>() {
            Ok(n) if range.contains(&n) => Ok(n),
            _ => Err(location.invalid(format!(
                "key must be between {} and {}",
                range.start(),
                range.end()
            ))),
        }
    }
}

/// Read access to one JSON object with validation helpers.
#[derive(Debug, Clone)]
pub struct ObjectReader<'a, 'v> {
    pub location: Location<'a>,
    pub map: &'v Map<String, Value>,
}

impl<'a, 'v> ObjectReader<'a, 'v> {
    pub fn get(&self, key: &str) -> Option<&'v Value> {
        self.map.get(key)
    }

    pub fn at(&self, key: &str) -> Location<'a> {
        self.location.child(key)
    }

    pub fn invalid(&self, message: impl std::fmt::Display) -> ConfigError {
        self.location.invalid(message)
    }

    /// Rejects keys outside `allowed`. `$if` and `#` are always allowed.
    pub fn reject_unknown(&self, allowed: &[&str]) -> Result<()> {
        for key in self.map.keys() {
            if key == CONDITION_KEY || key == "#" || allowed.contains(&key.as_str()) {
                continue;
            }
            return Err(self.invalid(format!("has unknown property \"{key}\"")));
        }
        Ok(())
    }

    pub fn string(&self, key: &str) -> Result<String> {
        match self.get(key) {
            Some(value) => self.at(key).string(value),
            None => Err(self.invalid(format!("is missing the required property \"{key}\""))),
        }
    }

    pub fn opt_string(&self, key: &str) -> Result<Option<String>> {
        self.get(key)
            .map(|value| self.at(key).string(value))
            .transpose()
    }

    pub fn integer(&self, key: &str) -> Result<i64> {
        match self.get(key) {
            Some(value) => self.at(key).integer(value),
            None => Err(self.invalid(format!("is missing the required property \"{key}\""))),
        }
    }

    pub fn opt_integer(&self, key: &str) -> Result<Option<i64>> {
        self.get(key)
            .map(|value| self.at(key).integer(value))
            .transpose()
    }

    /// Integer that must lie within `range`.
    pub fn opt_integer_in(
        &self,
        key: &str,
        range: std::ops::RangeInclusive<i64>,
    ) -> Result<Option<i64>> {
        let value = self.opt_integer(key)?;
        if let Some(n) = value {
            if !range.contains(&n) {
                return Err(self.at(key).invalid(format!(
                    "must be between {} and {}",
                    range.start(),
                    range.end()
                )));
            }
        }
        Ok(value)
    }

    pub fn opt_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(self.at(key).invalid("must be a boolean")),
        }
    }

    /// A flag that must be `true` or omitted. `false` is rejected so that
    /// an accidental negation cannot slip through.
    pub fn flag(&self, key: &str) -> Result<bool> {
        match self.get(key) {
            None => Ok(false),
            Some(Value::Bool(true)) => Ok(true),
            Some(_) => Err(self.at(key).invalid("must be true or omitted")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_messages_include_file_and_path() {
        let value = json!({ "label": 5 });
        let root = Location::root("dev.json");
        let reader = root.child("paramInformation").child("1").object(&value).unwrap();
        let err = reader.string("label").unwrap_err();
        assert_eq!(
            err.to_string(),
            "dev.json: paramInformation.1.label must be a string"
        );
    }

    #[test]
    fn test_flag_rejects_false() {
        let value = json!({ "preferred": false, "readOnly": true });
        let reader = Location::root("dev.json").object(&value).unwrap();
        assert!(reader.flag("preferred").is_err());
        assert!(reader.flag("readOnly").unwrap());
        assert!(!reader.flag("writeOnly").unwrap());
    }

    #[test]
    fn test_reject_unknown_allows_condition() {
        let value = json!({ "$if": "firmwareVersion > 1.0", "label": "x", "bogus": 1 });
        let reader = Location::root("dev.json").object(&value).unwrap();
        let err = reader.reject_unknown(&["label"]).unwrap_err();
        assert!(err.to_string().contains("\"bogus\""));
        assert!(reader.reject_unknown(&["label", "bogus"]).is_ok());
    }

    #[test]
    fn test_missing_required_property() {
        let value = json!({});
        let reader = Location::root("dev.json").object(&value).unwrap();
        let err = reader.integer("valueSize").unwrap_err();
        assert_eq!(
            err.to_string(),
            "dev.json: is missing the required property \"valueSize\""
        );
    }
}
