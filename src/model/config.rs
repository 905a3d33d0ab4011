use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULTS: &str = include_str!("../../config/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub registry: RegistryConfig,
    pub catalog: CatalogConfig,
    pub plugins: PluginsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub url: String,
    pub search_size: u32,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub debounce_ms: u64,
    /// Host plugins with this engine type belong to the catalog.
    pub extension_engine: String,
    pub readme_extra_tags: Vec<String>,
    /// Zero leaves installed-set refreshes unbounded.
    pub max_concurrent_refreshes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginsConfig {
    pub dirs: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULTS).expect("bundled default config is valid")
    }
}

impl CatalogConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl AppConfig {
    /// Load configuration with layering: defaults → user config.
    pub fn load() -> Result<Self> {
        let user_path = directories::ProjectDirs::from("", "", "extcat")
            .map(|dirs| dirs.config_dir().join("config.toml"));
        Self::load_from(user_path.as_deref())
    }

    pub fn load_from(user_path: Option<&Path>) -> Result<Self> {
        let mut layered: toml::Table = toml::from_str(DEFAULTS)?;

        if let Some(path) = user_path.filter(|path| path.exists()) {
            let user_str = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let user_table: toml::Table = toml::from_str(&user_str)
                .with_context(|| format!("parsing {}", path.display()))?;
            deep_merge(&mut layered, user_table);
        }

        let config: AppConfig = toml::Value::Table(layered).try_into()?;
        if config.catalog.extension_engine.trim().is_empty() {
            return Err(anyhow!("catalog.extension_engine must not be empty"));
        }

        Ok(config)
    }

    pub fn plugin_dirs(&self) -> Vec<PathBuf> {
        self.plugins
            .dirs
            .iter()
            .map(|dir| expand_tilde(Path::new(dir)))
            .collect()
    }
}

fn deep_merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                deep_merge(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

pub fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if !text.starts_with('~') {
        return path.to_path_buf();
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        let home = base_dirs.home_dir().to_string_lossy();
        return PathBuf::from(text.replacen('~', &home, 1));
    }

    path.to_path_buf()
}
