//! Queryable view over one or more settings documents

use super::document::{SettingsDocument, merge_values};
use crate::error::{CascadeError, CascadeResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A document plus the file it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationSource {
    pub path: Option<PathBuf>,
    pub document: SettingsDocument,
}

/// Layered configuration. Sources are added lowest precedence first; a later
/// source overrides earlier ones for the same key, objects merging key by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigurationRoot {
    sources: Vec<ConfigurationSource>,
}

impl ConfigurationRoot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root over the given files; files that are missing or blank are skipped
    pub fn from_files<I, P>(paths: I) -> CascadeResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut root = Self::new();
        for path in paths {
            let path = path.as_ref();
            if let Some(document) = SettingsDocument::load(path)? {
                root.sources.push(ConfigurationSource {
                    path: Some(path.to_path_buf()),
                    document,
                });
            }
        }
        Ok(root)
    }

    /// Append a source with the highest precedence so far
    pub fn add_document(&mut self, document: SettingsDocument) {
        self.sources.push(ConfigurationSource {
            path: None,
            document,
        });
    }

    pub fn with_document(mut self, document: SettingsDocument) -> Self {
        self.add_document(document);
        self
    }

    pub fn sources(&self) -> &[ConfigurationSource] {
        &self.sources
    }

    /// Raw value for `key`, layered across every source
    pub fn get_raw(&self, key: &str) -> Option<Value> {
        let mut found: Option<Value> = None;
        for source in &self.sources {
            let Some(value) = source.document.get(key) else {
                continue;
            };
            match found.as_mut() {
                Some(existing) => merge_values(existing, value),
                None if !value.is_null() => found = Some(value.clone()),
                None => {}
            }
        }
        found
    }

    /// Typed value for `key`.
    ///
    /// `Ok(None)` when the key is absent or `null`, `Err` when the value is
    /// present but cannot be converted.
    pub fn try_get<T: ConfigValue>(&self, key: &str) -> CascadeResult<Option<T>> {
        match self.get_raw(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_config(&value)
                .map(Some)
                .map_err(|reason| CascadeError::invalid_field(key, reason)),
        }
    }

    /// Typed value for `key`, falling back to the type's default on absence
    /// or conversion failure. Prefer [`try_get`](Self::try_get) when the
    /// difference matters.
    pub fn get_value<T: FallbackValue>(&self, key: &str) -> T {
        match self.try_get::<T>(key) {
            Ok(Some(value)) => value,
            Ok(None) => {
                tracing::debug!(key, "configuration key absent, using fallback value");
                T::fallback()
            }
            Err(e) => {
                tracing::warn!(key, "configuration value unusable, using fallback value: {}", e);
                T::fallback()
            }
        }
    }

    /// Deserialize a sub-tree (or scalar) into any serde type
    pub fn bind<T: DeserializeOwned>(&self, key: &str) -> CascadeResult<Option<T>> {
        match self.get_raw(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| CascadeError::invalid_field(key, e.to_string())),
        }
    }

    /// Sub-tree at `key` as a document
    pub fn section(&self, key: &str) -> Option<SettingsDocument> {
        match self.get_raw(key)? {
            value @ Value::Object(_) => SettingsDocument::from_value(value).ok(),
            _ => None,
        }
    }

    /// All sources merged into one document
    pub fn snapshot(&self) -> SettingsDocument {
        let mut merged = SettingsDocument::new();
        for source in &self.sources {
            merged.merge_from(&source.document);
        }
        merged
    }
}

/// Conversion from a raw configuration value.
///
/// Configuration files frequently store scalars as strings, so string values
/// are also parsed as JSON literals (`"true"`, `"42"`).
pub trait ConfigValue: Sized {
    fn from_config(value: &Value) -> Result<Self, String>;
}

/// Types with a legacy fallback used by `get_value` when a key is absent
pub trait FallbackValue: ConfigValue {
    fn fallback() -> Self;
}

fn from_json<T: DeserializeOwned>(value: &Value) -> Result<T, String> {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(converted) => Ok(converted),
        Err(e) => match value {
            Value::String(text) => serde_json::from_str::<T>(text.trim()).map_err(|_| e.to_string()),
            _ => Err(e.to_string()),
        },
    }
}

macro_rules! config_value_via_serde {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ConfigValue for $ty {
                fn from_config(value: &Value) -> Result<Self, String> {
                    from_json(value)
                }
            }
        )*
    };
}

config_value_via_serde!(bool, i32, i64, u16, u32, u64, usize, f64, PathBuf, Value);

impl ConfigValue for String {
    fn from_config(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(text) => Ok(text.clone()),
            Value::Bool(_) | Value::Number(_) => Ok(value.to_string()),
            other => Err(format!("expected a string, found {other}")),
        }
    }
}

impl ConfigValue for DateTime<Utc> {
    fn from_config(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(text) => DateTime::parse_from_rfc3339(text.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| format!("invalid RFC 3339 timestamp {text:?}: {e}")),
            other => Err(format!("expected a timestamp string, found {other}")),
        }
    }
}

/// Durations accept humantime strings (`"1day"`, `"90s"`) or a number of seconds
impl ConfigValue for Duration {
    fn from_config(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(number) => number
                .as_f64()
                .ok_or_else(|| format!("invalid duration in seconds: {number}"))
                .and_then(|secs| {
                    Duration::try_from_secs_f64(secs)
                        .map_err(|e| format!("invalid duration in seconds: {number}: {e}"))
                }),
            Value::String(text) => {
                if let Ok(secs) = text.trim().parse::<u64>() {
                    return Ok(Duration::from_secs(secs));
                }
                humantime_serde::deserialize(Value::String(text.trim().to_string()))
                    .map_err(|e: serde_json::Error| format!("invalid duration {text:?}: {e}"))
            }
            other => Err(format!("expected a duration, found {other}")),
        }
    }
}

impl<T: ConfigValue> ConfigValue for Option<T> {
    fn from_config(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_config(other).map(Some),
        }
    }
}

impl FallbackValue for bool {
    fn fallback() -> Self {
        false
    }
}

impl FallbackValue for i32 {
    fn fallback() -> Self {
        i32::MIN
    }
}

impl FallbackValue for i64 {
    fn fallback() -> Self {
        i64::MIN
    }
}

impl FallbackValue for f64 {
    fn fallback() -> Self {
        f64::MIN
    }
}

impl FallbackValue for String {
    fn fallback() -> Self {
        String::new()
    }
}

impl FallbackValue for DateTime<Utc> {
    fn fallback() -> Self {
        DateTime::<Utc>::MIN_UTC
    }
}

impl FallbackValue for Duration {
    fn fallback() -> Self {
        Duration::ZERO
    }
}

impl<T: ConfigValue> FallbackValue for Option<T> {
    fn fallback() -> Self {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root(layers: &[Value]) -> ConfigurationRoot {
        layers.iter().fold(ConfigurationRoot::new(), |root, layer| {
            root.with_document(SettingsDocument::from_value(layer.clone()).unwrap())
        })
    }

    #[test]
    fn later_sources_override_earlier_ones() {
        let root = root(&[
            json!({ "Name": "base", "Section": { "A": 1, "B": 2 } }),
            json!({ "Name": "user", "Section": { "B": 20 } }),
        ]);

        assert_eq!(root.get_raw("Name"), Some(json!("user")));
        assert_eq!(root.get_raw("Section"), Some(json!({ "A": 1, "B": 20 })));
        assert_eq!(root.get_raw("section:a"), Some(json!(1)));
    }

    #[test]
    fn null_does_not_hide_lower_layers() {
        let root = root(&[json!({ "Name": "base" }), json!({ "Name": null })]);
        assert_eq!(root.get_raw("Name"), Some(json!("base")));
    }

    #[test]
    fn try_get_distinguishes_absent_from_invalid() {
        let root = root(&[json!({ "Count": "many", "Flag": "true", "Port": 5432 })]);

        assert_eq!(root.try_get::<i32>("Missing").unwrap(), None);
        assert_eq!(root.try_get::<bool>("Flag").unwrap(), Some(true));
        assert_eq!(root.try_get::<u16>("Port").unwrap(), Some(5432));

        match root.try_get::<i32>("Count").unwrap_err() {
            CascadeError::InvalidInput { field, .. } => assert_eq!(field.as_deref(), Some("Count")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn get_value_fallback_table() {
        let root = root(&[json!({ "NotANumber": "abc" })]);

        assert!(!root.get_value::<bool>("missing.key"));
        assert_eq!(root.get_value::<i32>("missing.key"), i32::MIN);
        assert_eq!(root.get_value::<i64>("missing.key"), i64::MIN);
        assert_eq!(root.get_value::<f64>("missing.key"), f64::MIN);
        assert_eq!(root.get_value::<String>("missing.key"), "");
        assert_eq!(
            root.get_value::<DateTime<Utc>>("missing.key"),
            DateTime::<Utc>::MIN_UTC
        );
        assert_eq!(root.get_value::<Option<u64>>("missing.key"), None);
        assert_eq!(root.get_value::<Duration>("missing.key"), Duration::ZERO);

        // conversion failures degrade the same way
        assert_eq!(root.get_value::<i32>("NotANumber"), i32::MIN);
    }

    #[test]
    fn converts_string_encoded_values() {
        let root = root(&[json!({
            "When": "2024-05-01T12:30:00Z",
            "Life": "1day",
            "Secs": 90,
            "SecsText": "45",
            "Ratio": "0.5"
        })]);

        let when: DateTime<Utc> = root.get_value("When");
        assert_eq!(when.to_rfc3339(), "2024-05-01T12:30:00+00:00");
        assert_eq!(root.get_value::<Duration>("Life"), Duration::from_secs(86_400));
        assert_eq!(root.get_value::<Duration>("Secs"), Duration::from_secs(90));
        assert_eq!(root.get_value::<Duration>("SecsText"), Duration::from_secs(45));
        assert_eq!(root.get_value::<f64>("Ratio"), 0.5);
    }

    #[test]
    fn out_of_range_durations_fall_back() {
        let root = root(&[json!({ "CacheLifeTime": 1e20, "Negative": -5 })]);

        assert_eq!(root.get_value::<Duration>("CacheLifeTime"), Duration::ZERO);
        assert!(root.try_get::<Duration>("CacheLifeTime").is_err());
        assert!(root.try_get::<Duration>("Negative").is_err());
    }

    #[test]
    fn section_and_bind() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Pool {
            #[serde(rename = "Size")]
            size: u32,
        }

        let root = root(&[json!({ "Pool": { "Size": 8 }, "Scalar": 1 })]);
        let section = root.section("pool").unwrap();
        assert_eq!(section.get("Size"), Some(&json!(8)));
        assert!(root.section("Scalar").is_none());
        assert_eq!(root.bind::<Pool>("Pool").unwrap(), Some(Pool { size: 8 }));
    }

    #[test]
    fn snapshot_merges_all_sources() {
        let root = root(&[json!({ "A": 1, "L": [1] }), json!({ "B": 2, "L": [2] })]);
        assert_eq!(
            root.snapshot().to_value(),
            json!({ "A": 1, "B": 2, "L": [1, 2] })
        );
    }
}
