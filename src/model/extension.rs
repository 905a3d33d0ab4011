use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static EXTENSION_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^.\s]+\.\S+$").expect("valid extension id regex")
});

/// Stable, lower-cased `publisher.name` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExtensionId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid extension id: {0:?} (expected publisher.name)")]
pub struct InvalidExtensionId(pub String);

impl ExtensionId {
    /// Parses `publisher.name`, normalizing case and surrounding whitespace.
    ///
    /// Both parts must be non-empty; the publisher ends at the first dot.
    pub fn parse(raw: &str) -> Result<Self, InvalidExtensionId> {
        let normalized = raw.trim().to_lowercase();
        if EXTENSION_ID_RE.is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(InvalidExtensionId(raw.to_string()))
        }
    }

    pub fn from_parts(publisher: &str, name: &str) -> Result<Self, InvalidExtensionId> {
        Self::parse(&format!("{publisher}.{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn publisher(&self) -> &str {
        self.0.split_once('.').map(|(publisher, _)| publisher).unwrap_or(&self.0)
    }

    pub fn name(&self) -> &str {
        self.0.split_once('.').map(|(_, name)| name).unwrap_or("")
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ExtensionId {
    type Error = InvalidExtensionId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ExtensionId> for String {
    fn from(id: ExtensionId) -> Self {
        id.0
    }
}

/// The catalog's view of one extension, merged from registry and host data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRecord {
    pub id: ExtensionId,
    pub publisher: Option<String>,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub download_url: Option<String>,
    pub readme_url: Option<String>,
    /// Sanitized HTML rendered from the readme markdown.
    pub readme: Option<String>,
    pub installed: bool,
    /// Version reported by the host runtime, if installed.
    pub installed_version: Option<String>,
}

impl ExtensionRecord {
    pub fn new(id: ExtensionId) -> Self {
        Self {
            id,
            publisher: None,
            name: None,
            display_name: None,
            version: None,
            description: None,
            icon_url: None,
            download_url: None,
            readme_url: None,
            readme: None,
            installed: false,
            installed_version: None,
        }
    }

    /// Field-wise overwrite-if-present.
    pub fn apply(&mut self, patch: ExtensionPatch) {
        let ExtensionPatch {
            publisher,
            name,
            display_name,
            version,
            description,
            icon_url,
            download_url,
            readme_url,
            readme,
            installed,
            installed_version,
        } = patch;

        merge(&mut self.publisher, publisher);
        merge(&mut self.name, name);
        merge(&mut self.display_name, display_name);
        merge(&mut self.version, version);
        merge(&mut self.description, description);
        merge(&mut self.icon_url, icon_url);
        merge(&mut self.download_url, download_url);
        merge(&mut self.readme_url, readme_url);
        merge(&mut self.readme, readme);
        if let Some(installed) = installed {
            self.installed = installed;
        }
        if let Some(installed_version) = installed_version {
            self.installed_version = installed_version;
        }
    }

    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(self.id.as_str())
    }

    /// True when the host runs a version other than the registry's latest.
    pub fn is_outdated(&self) -> bool {
        match (&self.installed_version, &self.version) {
            (Some(installed), Some(latest)) => self.installed && installed != latest,
            _ => false,
        }
    }
}

fn merge(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}

/// A partial update to an [`ExtensionRecord`]. `None` means "leave as is".
///
/// `installed_version` is doubly optional so an uninstall can clear it
/// explicitly with `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionPatch {
    pub publisher: Option<String>,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub download_url: Option<String>,
    pub readme_url: Option<String>,
    pub readme: Option<String>,
    pub installed: Option<bool>,
    pub installed_version: Option<Option<String>>,
}

impl ExtensionPatch {
    pub fn installed(version: Option<String>) -> Self {
        Self {
            installed: Some(true),
            installed_version: Some(version),
            ..Default::default()
        }
    }

    pub fn uninstalled() -> Self {
        Self {
            installed: Some(false),
            installed_version: Some(None),
            ..Default::default()
        }
    }

    pub fn readme(html: String) -> Self {
        Self {
            readme: Some(html),
            ..Default::default()
        }
    }
}
