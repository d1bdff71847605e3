//! Human-readable device metadata: instructions and comments.

use serde::Serialize;
use serde_json::Value;

use crate::conditional::{Conditional, Evaluate, Guarded, parse_conditional_value, parse_guarded_list};
use crate::error::Result;
use crate::ids::DeviceId;
use crate::json::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceComment {
    pub level: CommentLevel,
    pub text: String,
}

impl Evaluate for DeviceComment {
    type Output = DeviceComment;

    fn evaluate(&self, _device_id: Option<&DeviceId>) -> Result<Option<DeviceComment>> {
        Ok(Some(self.clone()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionalDeviceMetadata {
    pub wakeup: Option<Conditional<String>>,
    pub inclusion: Option<Conditional<String>>,
    pub exclusion: Option<Conditional<String>>,
    pub reset: Option<Conditional<String>>,
    pub manual: Option<Conditional<String>>,
    pub comments: Vec<Guarded<DeviceComment>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wakeup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inclusion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<DeviceComment>,
}

const TEXT_FIELDS: [&str; 5] = ["wakeup", "inclusion", "exclusion", "reset", "manual"];

impl ConditionalDeviceMetadata {
    pub fn parse(location: &Location<'_>, value: &Value) -> Result<Self> {
        let reader = location.object(value)?;
        let mut allowed = TEXT_FIELDS.to_vec();
        allowed.push("comments");
        reader.reject_unknown(&allowed)?;

        let text = |key: &str| {
            reader
                .get(key)
                .map(|value| parse_conditional_value(&reader.at(key), value, |loc, v| loc.string(v)))
                .transpose()
        };

        let comments = match reader.get("comments") {
            Some(value) => parse_guarded_list(&reader.at("comments"), value, |comment| {
                comment.reject_unknown(&["level", "text"])?;
                let level = match comment.string("level")?.as_str() {
                    "info" => CommentLevel::Info,
                    "warning" => CommentLevel::Warning,
                    "error" => CommentLevel::Error,
                    _ => {
                        return Err(comment
                            .at("level")
                            .invalid("must be \"info\", \"warning\" or \"error\""));
                    }
                };
                Ok(DeviceComment {
                    level,
                    text: comment.string("text")?,
                })
            })?,
            None => Vec::new(),
        };

        Ok(Self {
            wakeup: text("wakeup")?,
            inclusion: text("inclusion")?,
            exclusion: text("exclusion")?,
            reset: text("reset")?,
            manual: text("manual")?,
            comments,
        })
    }
}

impl Evaluate for ConditionalDeviceMetadata {
    type Output = DeviceMetadata;

    fn evaluate(&self, device_id: Option<&DeviceId>) -> Result<Option<DeviceMetadata>> {
        Ok(Some(DeviceMetadata {
            wakeup: self.wakeup.evaluate(device_id)?,
            inclusion: self.inclusion.evaluate(device_id)?,
            exclusion: self.exclusion.evaluate(device_id)?,
            reset: self.reset.evaluate(device_id)?,
            manual: self.manual.evaluate(device_id)?,
            comments: self.comments.evaluate(device_id)?.unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<ConditionalDeviceMetadata> {
        ConditionalDeviceMetadata::parse(&Location::root("dev.json").child("metadata"), &value)
    }

    #[test]
    fn test_comments_keep_every_match() {
        let metadata = parse(json!({
            "inclusion": "Press the button three times",
            "comments": [
                { "level": "warning", "text": "Old firmware drops reports" , "$if": "firmwareVersion < 1.2" },
                { "level": "info", "text": "Battery powered" }
            ]
        }))
        .unwrap();

        let old = DeviceId::new(1, 2, 3).with_firmware("1.1");
        let new = DeviceId::new(1, 2, 3).with_firmware("1.2");
        let old = metadata.evaluate(Some(&old)).unwrap().unwrap();
        let new = metadata.evaluate(Some(&new)).unwrap().unwrap();
        assert_eq!(old.comments.len(), 2);
        assert_eq!(old.comments[0].level, CommentLevel::Warning);
        assert_eq!(new.comments.len(), 1);
        assert_eq!(new.inclusion.as_deref(), Some("Press the button three times"));
    }

    #[test]
    fn test_single_comment_object() {
        let metadata = parse(json!({ "comments": { "level": "error", "text": "Unsupported" } }))
            .unwrap();
        let evaluated = metadata.evaluate(None).unwrap().unwrap();
        assert_eq!(evaluated.comments[0].text, "Unsupported");
    }

    #[test]
    fn test_conditional_instructions() {
        let metadata = parse(json!({
            "reset": [
                { "$if": "firmwareVersion >= 2.0", "value": "Hold for 10 seconds" },
                "Hold for 20 seconds"
            ]
        }))
        .unwrap();
        let id = DeviceId::new(1, 2, 3).with_firmware("1.0");
        let evaluated = metadata.evaluate(Some(&id)).unwrap().unwrap();
        assert_eq!(evaluated.reset.as_deref(), Some("Hold for 20 seconds"));
    }

    #[test]
    fn test_rejects_bad_comment_level() {
        let err = parse(json!({ "comments": [{ "level": "fatal", "text": "x" }] })).unwrap_err();
        assert!(err.to_string().contains("metadata.comments[0].level"));
    }
}
