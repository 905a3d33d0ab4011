use std::collections::{BTreeSet, VecDeque};
use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use extcat::host::PluginDirHost;
use extcat::{CatalogEvent, ExtensionCatalog, ExtensionId, ExtensionRecord};

use crate::msg::Msg;

const MAX_LISTED: usize = 20;

pub struct App {
    catalog: ExtensionCatalog,
    host: Arc<PluginDirHost>,
    event_tx: mpsc::UnboundedSender<Msg>,
    notifications: VecDeque<String>,
    shown_result: Option<BTreeSet<ExtensionId>>,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        catalog: ExtensionCatalog,
        host: Arc<PluginDirHost>,
        event_tx: mpsc::UnboundedSender<Msg>,
    ) -> Self {
        let mut notifications = VecDeque::new();
        notifications.push_back("type to search, :help for commands".to_string());
        notifications.extend(host.error_notifications());

        Self {
            catalog,
            host,
            event_tx,
            notifications,
            shown_result: None,
            should_quit: false,
        }
    }

    // ── MVU: Update ──────────────────────────────────────────────

    pub fn update(&mut self, msg: Msg) -> Result<()> {
        match msg {
            Msg::Input(line) => self.handle_input(line),
            Msg::Catalog(CatalogEvent::Changed) => self.handle_catalog_changed(),
            Msg::Catalog(CatalogEvent::QueryChanged(query)) => {
                tracing::debug!(query, "query changed");
            }
            Msg::Resolved(id, result) => match result {
                Ok(record) => self.push_details(&record),
                Err(err) => {
                    tracing::warn!(%id, "resolve failed: {err}");
                    self.push_notification(format!("error: {err}"));
                }
            },
            Msg::Quit => self.should_quit = true,
        }
        Ok(())
    }

    fn handle_input(&mut self, line: String) {
        let line = line.trim_end();
        let Some(command) = line.strip_prefix(':') else {
            self.catalog.set_query(line);
            return;
        };

        let (name, arg) = command
            .trim()
            .split_once(char::is_whitespace)
            .map(|(name, arg)| (name, arg.trim()))
            .unwrap_or((command.trim(), ""));

        match name {
            "help" | "h" => {
                let notes = [
                    "commands:",
                    "  <text>                search the registry",
                    "  :show <id> (alias :s) show details and readme",
                    "  :installed (alias :i) list installed extensions",
                    "  :plugins.errors       list unreadable plugin manifests",
                    "  :quit (alias :q)",
                ];
                for note in notes {
                    self.push_notification(note.to_string());
                }
            }
            "show" | "s" => self.show(arg),
            "installed" | "i" => {
                let records = self.catalog.installed_records();
                if records.is_empty() {
                    self.push_notification("installed: none".to_string());
                }
                for record in records {
                    self.push_notification(summary_line(&record));
                }
            }
            "plugins.errors" => {
                let errors = self.host.error_notifications();
                if errors.is_empty() {
                    self.push_notification("plugins: no errors".to_string());
                }
                for error in errors {
                    self.push_notification(error);
                }
            }
            "quit" | "q" => self.should_quit = true,
            _ => self.push_notification(format!("unknown command: {name}")),
        }
    }

    fn show(&mut self, raw_id: &str) {
        let id = match ExtensionId::parse(raw_id) {
            Ok(id) => id,
            Err(err) => {
                self.push_notification(format!("usage: :show <publisher.name> ({err})"));
                return;
            }
        };

        self.push_notification(format!("resolving {id}…"));
        let catalog = self.catalog.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = catalog.resolve(&id).await;
            let _ = tx.send(Msg::Resolved(id, result));
        });
    }

    fn handle_catalog_changed(&mut self) {
        let result = self.catalog.search_result();
        if self.shown_result.as_ref() == Some(&result) {
            return;
        }

        let records = self.catalog.search_result_records();
        self.push_notification(format!(
            "\"{}\": {} result(s)",
            self.catalog.search_query(),
            records.len()
        ));
        for record in records.iter().take(MAX_LISTED) {
            self.push_notification(summary_line(record));
        }
        if records.len() > MAX_LISTED {
            self.push_notification(format!("  … {} more", records.len() - MAX_LISTED));
        }
        self.shown_result = Some(result);
    }

    fn push_details(&mut self, record: &ExtensionRecord) {
        self.push_notification(summary_line(record));
        if let Some(description) = &record.description {
            self.push_notification(format!("  {description}"));
        }
        if let Some(url) = &record.download_url {
            self.push_notification(format!("  download: {url}"));
        }
        match &record.readme {
            Some(readme) => self.push_notification(readme.clone()),
            None => self.push_notification("  (no readme)".to_string()),
        }
    }

    fn push_notification(&mut self, message: String) {
        self.notifications.push_back(message);
    }

    // ── MVU: View ────────────────────────────────────────────────

    pub fn view(&mut self, out: &mut impl Write) -> Result<()> {
        while let Some(line) = self.notifications.pop_front() {
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        Ok(())
    }
}

fn summary_line(record: &ExtensionRecord) -> String {
    let version = record.version.as_deref().unwrap_or("?");
    let marker = if record.is_outdated() {
        " [installed, update available]"
    } else if record.installed {
        " [installed]"
    } else {
        ""
    };
    format!("{} ({}) v{version}{marker}", record.label(), record.id)
}
