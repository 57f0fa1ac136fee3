//! `%Token%` placeholders inside connection strings

use std::collections::BTreeMap;
use std::fmt;
use std::path::{MAIN_SEPARATOR, Path};

/// A substitutable token
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placeholder {
    /// `%AppDomain.CurrentDomain.BaseDirectory%`
    BaseDirectory,
    /// `%ApplicationData%`
    ApplicationData,
    /// `%LocalApplicationData%`
    LocalApplicationData,
    /// `%CommonApplicationData%`
    CommonApplicationData,
    /// `%UserProfile%`
    UserProfile,
    /// `%MyDocuments%`
    MyDocuments,
    /// `%AssemblyName%`
    AssemblyName,
    /// `%Name%` registered by the caller
    Custom(String),
}

impl Placeholder {
    /// The literal token searched for in connection strings
    pub fn token(&self) -> String {
        match self {
            Self::BaseDirectory => "%AppDomain.CurrentDomain.BaseDirectory%".to_string(),
            Self::ApplicationData => "%ApplicationData%".to_string(),
            Self::LocalApplicationData => "%LocalApplicationData%".to_string(),
            Self::CommonApplicationData => "%CommonApplicationData%".to_string(),
            Self::UserProfile => "%UserProfile%".to_string(),
            Self::MyDocuments => "%MyDocuments%".to_string(),
            Self::AssemblyName => "%AssemblyName%".to_string(),
            Self::Custom(name) => format!("%{}%", name.trim_matches('%')),
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

/// Replacement values for placeholders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderMap {
    entries: BTreeMap<Placeholder, String>,
}

impl PlaceholderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard tokens for an application living in `base_dir`.
    ///
    /// The base directory is rendered with a trailing separator so that
    /// `%AppDomain.CurrentDomain.BaseDirectory%app.db` yields a path.
    /// Special folders unknown on this platform are left unmapped.
    pub fn standard(base_dir: &Path, application_name: &str) -> Self {
        let mut map = Self::new();
        map.insert(Placeholder::BaseDirectory, with_trailing_separator(base_dir));
        map.insert(Placeholder::AssemblyName, application_name);

        let folders = [
            (Placeholder::ApplicationData, dirs::config_dir()),
            (Placeholder::LocalApplicationData, dirs::data_local_dir()),
            (Placeholder::CommonApplicationData, common_application_data()),
            (Placeholder::UserProfile, dirs::home_dir()),
            (Placeholder::MyDocuments, dirs::document_dir()),
        ];
        for (placeholder, folder) in folders {
            if let Some(folder) = folder {
                map.insert(placeholder, folder.display().to_string());
            }
        }
        map
    }

    pub fn insert(&mut self, placeholder: Placeholder, value: impl Into<String>) {
        self.entries.insert(placeholder, value.into());
    }

    pub fn with(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.insert(placeholder, value);
        self
    }

    /// Register `%name%`
    pub fn with_custom(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(Placeholder::Custom(name.into()), value)
    }

    pub fn get(&self, placeholder: &Placeholder) -> Option<&str> {
        self.entries.get(placeholder).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Placeholder, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Literal replacement of every known token in one left-to-right pass.
    /// Substituted values are not scanned again.
    pub fn apply(&self, input: &str) -> String {
        if !input.contains('%') {
            return input.to_string();
        }
        let tokens: Vec<(String, &str)> = self
            .entries
            .iter()
            .map(|(placeholder, value)| (placeholder.token(), value.as_str()))
            .collect();

        let mut output = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find('%') {
            output.push_str(&rest[..start]);
            let candidate = &rest[start..];
            match tokens
                .iter()
                .find(|(token, _)| candidate.starts_with(token.as_str()))
            {
                Some((token, value)) => {
                    output.push_str(value);
                    rest = &candidate[token.len()..];
                }
                None => {
                    output.push('%');
                    rest = &candidate[1..];
                }
            }
        }
        output.push_str(rest);
        output
    }
}

fn with_trailing_separator(path: &Path) -> String {
    let mut rendered = path.display().to_string();
    if !rendered.ends_with(MAIN_SEPARATOR) && !rendered.ends_with('/') {
        rendered.push(MAIN_SEPARATOR);
    }
    rendered
}

#[cfg(windows)]
fn common_application_data() -> Option<std::path::PathBuf> {
    std::env::var_os("ProgramData").map(std::path::PathBuf::from)
}

#[cfg(not(windows))]
fn common_application_data() -> Option<std::path::PathBuf> {
    Some(std::path::PathBuf::from("/usr/share"))
}
