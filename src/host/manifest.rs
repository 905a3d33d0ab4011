use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const MANIFEST_FILE: &str = "plugin.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    /// `publisher.name`.
    pub id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_engine() -> String {
    "vscode".to_string()
}

impl PluginManifest {
    pub fn read(root_dir: &Path) -> Result<Self, String> {
        let manifest_path = root_dir.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&manifest_path)
            .map_err(|err| format!("{}: {err}", manifest_path.display()))?;

        toml::from_str::<PluginManifest>(&raw)
            .map_err(|err| format!("{}: {err}", manifest_path.display()))
    }
}
