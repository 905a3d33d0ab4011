use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use crate::host::manifest::PluginManifest;
use crate::host::{HostPlugin, HostRuntime};

/// Host runtime backed by plugin directories on disk.
///
/// Every immediate subdirectory of a configured directory holding a
/// `plugin.toml` counts as one installed plugin.
pub struct PluginDirHost {
    dirs: Vec<PathBuf>,
    state: RwLock<ScanState>,
    changes: broadcast::Sender<()>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

#[derive(Debug, Default)]
struct ScanState {
    plugins: Vec<HostPlugin>,
    errors: Vec<String>,
}

impl PluginDirHost {
    pub fn new(dirs: Vec<PathBuf>) -> Arc<Self> {
        let (changes, _) = broadcast::channel(16);
        let host = Arc::new(Self {
            state: RwLock::new(scan(&dirs)),
            dirs,
            changes,
            watcher: Mutex::new(None),
        });

        let state = host.state.read();
        tracing::info!(
            plugins = state.plugins.len(),
            errors = state.errors.len(),
            "plugin directories scanned"
        );
        drop(state);

        host
    }

    /// Starts watching the plugin directories; changes trigger a rescan.
    pub fn watch(self: &Arc<Self>) -> notify::Result<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        if let Some(host) = weak.upgrade() {
                            host.rescan();
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("plugin watcher error: {err}");
                }
            })?;

        for dir in &self.dirs {
            if !dir.is_dir() {
                tracing::warn!("plugin directory does not exist: {}", dir.display());
                continue;
            }
            watcher.watch(dir, RecursiveMode::Recursive)?;
        }

        *self.watcher.lock() = Some(watcher);
        Ok(())
    }

    /// Rescans and notifies subscribers when the plugin list changed.
    pub fn rescan(&self) -> bool {
        let next = scan(&self.dirs);
        let changed = {
            let mut state = self.state.write();
            let changed = state.plugins != next.plugins;
            *state = next;
            changed
        };

        if changed {
            tracing::debug!("plugin set changed");
            let _ = self.changes.send(());
        }
        changed
    }

    pub fn error_notifications(&self) -> Vec<String> {
        self.state.read().errors.clone()
    }
}

impl HostRuntime for PluginDirHost {
    fn plugins(&self) -> Vec<HostPlugin> {
        self.state.read().plugins.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

fn scan(dirs: &[PathBuf]) -> ScanState {
    let mut state = ScanState::default();

    for dir in dirs {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };

        for entry in entries.flatten() {
            let root_dir = entry.path();
            if !root_dir.is_dir() {
                continue;
            }
            match PluginManifest::read(&root_dir) {
                Ok(manifest) => state.plugins.push(HostPlugin {
                    id: manifest.id,
                    engine: manifest.engine,
                    version: manifest.version,
                }),
                Err(err) => state.errors.push(format!("plugin {}: {err}", display_name(&root_dir))),
            }
        }
    }

    state.plugins.sort();
    state.plugins.dedup_by(|a, b| a.id.eq_ignore_ascii_case(&b.id));
    state.errors.sort();
    state
}

fn display_name(root_dir: &Path) -> String {
    root_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root_dir.display().to_string())
}
