pub mod manifest;
pub mod plugin_dir;

use tokio::sync::broadcast;

pub use plugin_dir::PluginDirHost;

/// A plugin as reported by the host runtime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct HostPlugin {
    pub id: String,
    /// Engine/kind, e.g. `vscode`. Only plugins of the catalog's engine count.
    pub engine: String,
    pub version: Option<String>,
}

/// The runtime that knows which plugins are currently installed.
pub trait HostRuntime: Send + Sync {
    fn plugins(&self) -> Vec<HostPlugin>;

    /// Fires whenever the plugin list changes.
    fn subscribe(&self) -> broadcast::Receiver<()>;
}
