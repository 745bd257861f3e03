//! Worklist of (image, old tag, new tag) entries.
//!
//! The worklist file is a JSON or YAML array. Two key styles are accepted:
//!
//! ```json
//! [
//!   { "Image": "myimage", "Old Version": "r1", "New Version": "r2" },
//!   { "image": "registry/image", "old_ver": "0.61.0", "new_ver": "0.63.0" }
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{DeltaError, Result};

/// One validated unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Image name, possibly with a registry prefix (e.g. "registry/image")
    pub image: String,
    /// Tag currently deployed on the target
    pub old_version: String,
    /// Tag to bring the target up to
    pub new_version: String,
}

impl ImageEntry {
    pub fn new(
        image: impl Into<String>,
        old_version: impl Into<String>,
        new_version: impl Into<String>,
    ) -> Self {
        Self {
            image: image.into(),
            old_version: old_version.into(),
            new_version: new_version.into(),
        }
    }
}

impl std::fmt::Display for ImageEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} -> {})",
            self.image, self.old_version, self.new_version
        )
    }
}

/// Keys accepted for each field, in lookup order.
const IMAGE_KEYS: &[&str] = &["image", "Image"];
const OLD_VERSION_KEYS: &[&str] = &["old_version", "Old Version", "old_ver"];
const NEW_VERSION_KEYS: &[&str] = &["new_version", "New Version", "new_ver"];

/// A worklist entry as written in the file, before validation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RawEntry {
    pub image: Option<String>,
    pub old_version: Option<String>,
    pub new_version: Option<String>,
    /// Set when the entry could not be read at all (not a mapping, or a
    /// field holding a list or map).
    #[serde(skip)]
    pub malformed: Option<String>,
}

impl RawEntry {
    /// Read one entry from a parsed document value.
    ///
    /// Numeric values are taken as text, so `Old Version: 1.24` reads as
    /// `"1.24"`. Anything unusable is recorded and reported by [`validate`].
    ///
    /// [`validate`]: RawEntry::validate
    pub fn from_value(value: &serde_json::Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self {
                malformed: Some(format!("entry is not a mapping: {}", value)),
                ..Default::default()
            };
        };

        let mut problems = Vec::new();
        let mut field = |keys: &[&str]| -> Option<String> {
            let (key, value) = keys
                .iter()
                .find_map(|k| map.get(*k).map(|v| (*k, v)))?;
            match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                other => {
                    problems.push(format!("{} has unsupported value {}", key, other));
                    None
                }
            }
        };

        let image = field(IMAGE_KEYS);
        let old_version = field(OLD_VERSION_KEYS);
        let new_version = field(NEW_VERSION_KEYS);
        let malformed = (!problems.is_empty())
            .then(|| format!("{} in entry {}", problems.join(", "), value));

        Self {
            image,
            old_version,
            new_version,
            malformed,
        }
    }

    /// Validate required fields, rejecting missing or blank values.
    pub fn validate(&self) -> Result<ImageEntry> {
        if let Some(reason) = &self.malformed {
            return Err(DeltaError::InputError(reason.clone()));
        }

        fn field<'a>(value: &'a Option<String>, name: &str, raw: &RawEntry) -> Result<&'a str> {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => Ok(v),
                _ => Err(DeltaError::InputError(format!(
                    "missing {} in entry {}",
                    name,
                    serde_json::to_string(raw).unwrap_or_default()
                ))),
            }
        }

        Ok(ImageEntry::new(
            field(&self.image, "image", self)?,
            field(&self.old_version, "old version", self)?,
            field(&self.new_version, "new version", self)?,
        ))
    }
}

/// Parsed worklist file.
#[derive(Debug, Clone, Default)]
pub struct WorkList {
    pub entries: Vec<RawEntry>,
}

impl WorkList {
    /// Load a worklist from a JSON or YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeltaError::Config(format!(
                "Failed to read worklist {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content, path.extension().and_then(|e| e.to_str()))
    }

    /// Parse worklist content; `extension` selects JSON for `"json"`, YAML otherwise.
    ///
    /// Only the top-level shape can fail the whole file. Each item is read on
    /// its own so one bad entry does not hide the others.
    pub fn parse(content: &str, extension: Option<&str>) -> Result<Self> {
        let items: Vec<serde_json::Value> = match extension {
            Some("json") => serde_json::from_str(content)?,
            _ => serde_yaml::from_str(content)?,
        };
        Ok(Self {
            entries: items.iter().map(RawEntry::from_value).collect(),
        })
    }

    /// Validate every entry, preserving file order.
    pub fn validated(&self) -> Vec<Result<ImageEntry>> {
        self.entries.iter().map(RawEntry::validate).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(list: &WorkList) -> Vec<ImageEntry> {
        list.validated().into_iter().filter_map(Result::ok).collect()
    }

    #[test]
    fn test_parse_title_case_keys() {
        let list = WorkList::parse(
            r#"[{"Image": "myimage", "Old Version": "r1", "New Version": "r2"}]"#,
            Some("json"),
        )
        .unwrap();
        let results = list.validated();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].as_ref().unwrap(),
            &ImageEntry::new("myimage", "r1", "r2")
        );
    }

    #[test]
    fn test_parse_snake_case_keys() {
        let list = WorkList::parse(
            r#"[{"image": "registry/image", "old_ver": "0.61.0", "new_ver": "0.63.0"}]"#,
            Some("json"),
        )
        .unwrap();
        let valid = valid(&list);
        assert_eq!(valid[0].image, "registry/image");
        assert_eq!(valid[0].old_version, "0.61.0");
        assert_eq!(valid[0].new_version, "0.63.0");
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = "- image: nginx\n  old_version: '1.24'\n  new_version: '1.25'\n";
        let list = WorkList::parse(yaml, Some("yaml")).unwrap();
        assert_eq!(valid(&list), vec![ImageEntry::new("nginx", "1.24", "1.25")]);
    }

    #[test]
    fn test_numeric_tags_read_as_text() {
        let list = WorkList::parse(
            r#"[{"Image": "nginx", "Old Version": 1.24, "New Version": 2}]"#,
            Some("json"),
        )
        .unwrap();
        assert_eq!(valid(&list), vec![ImageEntry::new("nginx", "1.24", "2")]);

        let yaml = "- image: nginx\n  old_ver: 1.24\n  new_ver: 1.25\n";
        let list = WorkList::parse(yaml, None).unwrap();
        assert_eq!(valid(&list), vec![ImageEntry::new("nginx", "1.24", "1.25")]);
    }

    #[test]
    fn test_bad_entry_does_not_hide_neighbours() {
        let list = WorkList::parse(
            r#"[
                {"Image": "a", "Old Version": "1", "New Version": "2"},
                "garbage",
                {"Image": "b", "Old Version": ["1"], "New Version": "2"},
                {"Image": "c", "Old Version": "1", "New Version": "2"}
            ]"#,
            Some("json"),
        )
        .unwrap();
        let results = list.validated();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap().image, "a");
        assert!(matches!(
            results[1],
            Err(DeltaError::InputError(ref m)) if m.contains("not a mapping")
        ));
        assert!(matches!(
            results[2],
            Err(DeltaError::InputError(ref m)) if m.contains("Old Version")
        ));
        assert_eq!(results[3].as_ref().unwrap().image, "c");
    }

    #[test]
    fn test_missing_fields_are_input_errors() {
        let list = WorkList::parse(
            r#"[
                {"Image": "a", "Old Version": "1"},
                {"Image": "", "Old Version": "1", "New Version": "2"},
                {"Image": "b", "Old Version": "1", "New Version": "2"}
            ]"#,
            Some("json"),
        )
        .unwrap();
        let results = list.validated();
        assert_eq!(results.len(), 3);
        assert_eq!(results[2].as_ref().unwrap().image, "b");
        for result in &results[..2] {
            assert!(matches!(result, Err(DeltaError::InputError(_))));
        }
        assert!(results[0]
            .as_ref()
            .unwrap_err()
            .to_string()
            .contains("new version"));
    }

    #[test]
    fn test_invalid_json() {
        let err = WorkList::parse("{not a list", Some("json")).unwrap_err();
        assert!(matches!(err, DeltaError::Serialization(_)));
    }

    #[test]
    fn test_top_level_must_be_a_list() {
        let err = WorkList::parse(r#"{"Image": "a"}"#, Some("json")).unwrap_err();
        assert!(matches!(err, DeltaError::Serialization(_)));
    }

    #[test]
    fn test_entry_display() {
        let entry = ImageEntry::new("registry/app", "r1", "r2");
        assert_eq!(entry.to_string(), "registry/app (r1 -> r2)");
    }
}
