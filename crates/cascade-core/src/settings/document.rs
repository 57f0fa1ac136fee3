//! JSON settings documents
//!
//! A document is a JSON object addressed with `:`-separated keys
//! (`ConnectionStrings:Main`). Object keys are matched ASCII
//! case-insensitively, an exact match winning over a case-folded one.

use crate::error::{CascadeError, CascadeResult, ResultExt};
use serde_json::{Map, Value};
use std::path::Path;

use tokio::fs as async_fs;

/// Separator between the segments of a configuration key
pub const KEY_SEPARATOR: char = ':';

/// A JSON object tree loaded from or destined for a settings file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDocument {
    root: Map<String, Value>,
}

impl SettingsDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value, which must be an object
    pub fn from_value(value: Value) -> CascadeResult<Self> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            other => Err(CascadeError::json(format!(
                "settings document must be a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse JSON text; `//` and `/* */` comments are allowed
    pub fn parse(content: &str) -> CascadeResult<Self> {
        let stripped = strip_json_comments(content);
        let value: Value = serde_json::from_str(&stripped)?;
        Self::from_value(value)
    }

    /// Load a settings file. Missing and blank files yield `None`.
    pub fn load(path: impl AsRef<Path>) -> CascadeResult<Option<Self>> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CascadeError::io_with_path(&e, path)),
        };
        Self::parse_file_content(&content, path)
    }

    /// Load a settings file (async version)
    pub async fn load_async(path: impl AsRef<Path>) -> CascadeResult<Option<Self>> {
        let path = path.as_ref();
        let content = match async_fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CascadeError::io_with_path(&e, path)),
        };
        Self::parse_file_content(&content, path)
    }

    fn parse_file_content(content: &str, path: &Path) -> CascadeResult<Option<Self>> {
        if content.trim().is_empty() {
            return Ok(None);
        }
        Self::parse(content)
            .map(Some)
            .with_context(|| format!("parsing {}", path.display()))
    }

    /// Pretty-printed JSON text
    pub fn to_json_string(&self) -> CascadeResult<String> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    /// Write the document, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> CascadeResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CascadeError::io_with_path(&e, parent))?;
        }
        let content = self.to_json_string()?;
        std::fs::write(path, content).map_err(|e| CascadeError::io_with_path(&e, path))
    }

    /// Write the document (async version)
    pub async fn save_async(&self, path: impl AsRef<Path>) -> CascadeResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            async_fs::create_dir_all(parent)
                .await
                .map_err(|e| CascadeError::io_with_path(&e, parent))?;
        }
        let content = self.to_json_string()?;
        async_fs::write(path, content)
            .await
            .map_err(|e| CascadeError::io_with_path(&e, path))
    }

    /// Look up a value by `:`-separated key
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut segments = key.split(KEY_SEPARATOR);
        let first = segments.next()?;
        let mut current = self.root.get(find_key(&self.root, first)?)?;
        for segment in segments {
            let map = current.as_object()?;
            current = map.get(find_key(map, segment)?)?;
        }
        Some(current)
    }

    /// Set a value, creating intermediate objects (and replacing non-object
    /// values standing in the way)
    pub fn set(&mut self, key: &str, value: Value) {
        let segments: Vec<&str> = key.split(KEY_SEPARATOR).collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut current = &mut self.root;
        for segment in parents {
            let name = find_key(current, segment)
                .cloned()
                .unwrap_or_else(|| segment.to_string());
            let slot = current
                .entry(name)
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            current = match slot {
                Value::Object(map) => map,
                _ => return,
            };
        }

        let name = find_key(current, last)
            .cloned()
            .unwrap_or_else(|| last.to_string());
        current.insert(name, value);
    }

    /// Remove a value, returning it when present
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let segments: Vec<&str> = key.split(KEY_SEPARATOR).collect();
        let (last, parents) = segments.split_last()?;

        let mut current = &mut self.root;
        for segment in parents {
            let name = find_key(current, segment)?.clone();
            current = current.get_mut(&name)?.as_object_mut()?;
        }
        let name = find_key(current, last)?.clone();
        current.remove(&name)
    }

    /// Deep-merge `source` into this document.
    ///
    /// Objects merge recursively, arrays are unioned (existing order kept,
    /// missing source items appended), `null` in the source is ignored and
    /// any other source value replaces the existing one.
    pub fn merge_from(&mut self, source: &SettingsDocument) {
        merge_maps(&mut self.root, &source.root);
    }

    /// Top-level keys
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.root.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }
}

impl From<Map<String, Value>> for SettingsDocument {
    fn from(root: Map<String, Value>) -> Self {
        Self { root }
    }
}

impl std::str::FromStr for SettingsDocument {
    type Err = CascadeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn find_key<'a>(map: &'a Map<String, Value>, segment: &str) -> Option<&'a String> {
    if let Some((key, _)) = map.get_key_value(segment) {
        return Some(key);
    }
    map.keys().find(|key| key.eq_ignore_ascii_case(segment))
}

fn merge_maps(dest: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        if value.is_null() {
            continue;
        }
        match find_key(dest, key).cloned() {
            Some(existing) => {
                if let Some(slot) = dest.get_mut(&existing) {
                    merge_values(slot, value);
                }
            }
            None => {
                dest.insert(key.clone(), value.clone());
            }
        }
    }
}

pub(crate) fn merge_values(dest: &mut Value, source: &Value) {
    match (dest, source) {
        (_, Value::Null) => {}
        (Value::Object(dest), Value::Object(source)) => merge_maps(dest, source),
        (Value::Array(dest), Value::Array(source)) => {
            for item in source {
                if !dest.contains(item) {
                    dest.push(item.clone());
                }
            }
        }
        (dest, source) => *dest = source.clone(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Strip JSON comments (`//` and `/* */`) outside string literals
pub(crate) fn strip_json_comments(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }

        if c == '\\' && in_string {
            result.push(c);
            escape_next = true;
            continue;
        }

        if c == '"' {
            in_string = !in_string;
            result.push(c);
            continue;
        }

        if !in_string && c == '/' {
            match chars.peek() {
                Some('/') => {
                    // Line comment, keep the newline
                    while chars.peek().is_some_and(|&ch| ch != '\n') {
                        chars.next();
                    }
                    continue;
                }
                Some('*') => {
                    chars.next();
                    let mut previous = '\0';
                    for ch in chars.by_ref() {
                        if previous == '*' && ch == '/' {
                            break;
                        }
                        previous = ch;
                    }
                    continue;
                }
                _ => {}
            }
        }

        result.push(c);
    }

    result
}
