use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::catalog::{CatalogError, CatalogEvent, ExtensionCatalog, ProgressSink};
use crate::host::{HostPlugin, HostRuntime};
use crate::model::config::{AppConfig, CatalogConfig};
use crate::model::extension::{ExtensionId, ExtensionPatch};
use crate::registry::{ExtensionDetail, ExtensionSummary, RegistryClient, RegistryError};

#[derive(Clone)]
enum Reply<T> {
    Ok(T),
    NotFound,
    Fail,
}

impl<T: Clone> Reply<T> {
    fn into_result(self, url: &str) -> Result<T, RegistryError> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::NotFound => Err(RegistryError::NotFound { url: url.into() }),
            Reply::Fail => Err(RegistryError::Status {
                status: 503,
                url: url.into(),
            }),
        }
    }
}

#[derive(Default)]
struct FakeRegistry {
    searches: Mutex<HashMap<String, (Duration, Reply<Vec<ExtensionSummary>>)>>,
    details: Mutex<HashMap<ExtensionId, Reply<ExtensionDetail>>>,
    texts: Mutex<HashMap<String, Reply<String>>>,
    search_calls: Mutex<Vec<String>>,
    detail_calls: Mutex<Vec<ExtensionId>>,
    detail_delay: Mutex<Duration>,
    details_in_flight: AtomicUsize,
    max_details_in_flight: AtomicUsize,
}

impl FakeRegistry {
    fn on_search(&self, query: &str, delay_ms: u64, reply: Reply<Vec<ExtensionSummary>>) {
        self.searches
            .lock()
            .insert(query.into(), (Duration::from_millis(delay_ms), reply));
    }

    fn on_detail(&self, id: &str, reply: Reply<ExtensionDetail>) {
        self.details.lock().insert(ext(id), reply);
    }

    fn on_text(&self, url: &str, reply: Reply<String>) {
        self.texts.lock().insert(url.into(), reply);
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn search(&self, query: &str) -> Result<Vec<ExtensionSummary>, RegistryError> {
        self.search_calls.lock().push(query.to_string());
        let entry = self.searches.lock().get(query).cloned();
        let (delay, reply) = entry.unwrap_or((Duration::ZERO, Reply::Ok(Vec::new())));
        tokio::time::sleep(delay).await;
        reply.into_result(query)
    }

    async fn get_extension(&self, id: &ExtensionId) -> Result<ExtensionDetail, RegistryError> {
        self.detail_calls.lock().push(id.clone());
        let in_flight = self.details_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_details_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.detail_delay.lock();
        tokio::time::sleep(delay).await;

        self.details_in_flight.fetch_sub(1, Ordering::SeqCst);
        let reply = self.details.lock().get(id).cloned().unwrap_or(Reply::NotFound);
        reply.into_result(id.as_str())
    }

    async fn fetch_text(&self, url: &str) -> Result<String, RegistryError> {
        let reply = self.texts.lock().get(url).cloned().unwrap_or(Reply::NotFound);
        reply.into_result(url)
    }
}

struct FakeHost {
    plugins: Mutex<Vec<HostPlugin>>,
    changes: broadcast::Sender<()>,
}

impl FakeHost {
    fn new(ids: &[&str]) -> Arc<Self> {
        let (changes, _) = broadcast::channel(8);
        let host = Arc::new(Self {
            plugins: Mutex::new(Vec::new()),
            changes,
        });
        *host.plugins.lock() = ids.iter().map(|id| vscode_plugin(id)).collect();
        host
    }

    fn set_plugins(&self, plugins: Vec<HostPlugin>) {
        *self.plugins.lock() = plugins;
        let _ = self.changes.send(());
    }
}

impl HostRuntime for FakeHost {
    fn plugins(&self) -> Vec<HostPlugin> {
        self.plugins.lock().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

#[derive(Default)]
struct CountingProgress {
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
}

impl ProgressSink for CountingProgress {
    fn start(&self, _label: &str, category: &str) {
        self.started.lock().push(category.to_string());
    }

    fn finish(&self, _label: &str, category: &str) {
        self.finished.lock().push(category.to_string());
    }
}

fn ext(id: &str) -> ExtensionId {
    ExtensionId::parse(id).unwrap()
}

fn ids(raw: &[&str]) -> BTreeSet<ExtensionId> {
    raw.iter().map(|id| ext(id)).collect()
}

fn vscode_plugin(id: &str) -> HostPlugin {
    HostPlugin {
        id: id.to_string(),
        engine: "vscode".into(),
        version: Some("1.0.0".into()),
    }
}

fn summary(publisher: &str, name: &str) -> ExtensionSummary {
    ExtensionSummary {
        publisher: publisher.into(),
        name: name.into(),
        version: Some("2.0.0".into()),
        display_name: Some(format!("{name} display")),
        description: Some(format!("{name} description")),
        icon_url: None,
        download_url: Some(format!("https://x/{name}.vsix")),
    }
}

fn detail(publisher: &str, name: &str, readme_url: Option<&str>) -> ExtensionDetail {
    ExtensionDetail {
        summary: summary(publisher, name),
        readme_url: readme_url.map(Into::into),
    }
}

struct Fixture {
    catalog: ExtensionCatalog,
    registry: Arc<FakeRegistry>,
    host: Arc<FakeHost>,
    progress: Arc<CountingProgress>,
}

fn fixture(installed: &[&str]) -> Fixture {
    fixture_with(&AppConfig::default().catalog, installed)
}

fn fixture_with(config: &CatalogConfig, installed: &[&str]) -> Fixture {
    let registry = Arc::new(FakeRegistry::default());
    let host = FakeHost::new(installed);
    let progress = Arc::new(CountingProgress::default());
    let catalog = ExtensionCatalog::new(
        config,
        registry.clone(),
        host.clone(),
        progress.clone(),
    );
    Fixture {
        catalog,
        registry,
        host,
        progress,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(5)).await;
}

fn count_changes(events: &[CatalogEvent]) -> usize {
    events
        .iter()
        .filter(|event| **event == CatalogEvent::Changed)
        .count()
}

fn count_category(log: &Mutex<Vec<String>>, category: &str) -> usize {
    log.lock().iter().filter(|entry| *entry == category).count()
}

fn drain(rx: &mut broadcast::Receiver<CatalogEvent>) -> Vec<CatalogEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_debounce_runs_one_search_with_last_query() {
    let f = fixture(&[]);
    f.catalog.start().await;

    for query in ["f", "fo", "foo"] {
        f.catalog.set_query(query);
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    settle().await;

    assert_eq!(*f.registry.search_calls.lock(), vec!["foo".to_string()]);
    assert_eq!(f.catalog.query(), "foo");
}

#[tokio::test(start_paused = true)]
async fn test_superseded_response_is_discarded() {
    let f = fixture(&[]);
    f.registry
        .on_search("slow", 1_000, Reply::Ok(vec![summary("acme", "stale")]));
    f.registry
        .on_search("fast", 0, Reply::Ok(vec![summary("acme", "fresh")]));
    f.catalog.start().await;
    let mut rx = f.catalog.subscribe();

    f.catalog.set_query("slow");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*f.registry.search_calls.lock(), vec!["slow".to_string()]);

    f.catalog.set_query("fast");
    settle().await;

    assert_eq!(f.catalog.search_result(), ids(&["acme.fresh"]));
    assert_eq!(f.catalog.search_query(), "fast");
    assert!(f.catalog.get_extension(&ext("acme.stale")).is_none());

    let changes = drain(&mut rx)
        .into_iter()
        .filter(|event| *event == CatalogEvent::Changed)
        .count();
    assert_eq!(changes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_search_keeps_previous_results() {
    let f = fixture(&[]);
    f.registry
        .on_search("foo", 0, Reply::Ok(vec![summary("acme", "foo")]));
    f.registry.on_search("bar", 0, Reply::Fail);
    f.catalog.start().await;

    f.catalog.set_query("foo");
    settle().await;
    f.catalog.set_query("bar");
    settle().await;

    assert_eq!(f.catalog.search_result(), ids(&["acme.foo"]));
}

#[tokio::test(start_paused = true)]
async fn test_blank_query_clears_results_without_registry_call() {
    let f = fixture(&[]);
    f.registry
        .on_search("foo", 0, Reply::Ok(vec![summary("acme", "foo")]));
    f.catalog.start().await;

    f.catalog.set_query("foo");
    settle().await;
    f.catalog.set_query("   ");
    settle().await;

    assert!(f.catalog.search_result().is_empty());
    assert_eq!(*f.registry.search_calls.lock(), vec!["foo".to_string()]);
    assert!(f.catalog.get_extension(&ext("acme.foo")).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_set_query_emits_query_changed_once_per_value() {
    let f = fixture(&[]);
    let mut rx = f.catalog.subscribe();

    f.catalog.set_query("foo");
    f.catalog.set_query("foo");

    assert_eq!(drain(&mut rx), vec![CatalogEvent::QueryChanged("foo".into())]);
}

#[tokio::test(start_paused = true)]
async fn test_search_end_to_end() {
    let f = fixture(&[]);
    f.registry.on_search(
        "foo",
        10,
        Reply::Ok(vec![summary("Acme", "Foo"), summary("acme", "foobar")]),
    );
    f.catalog.start().await;

    f.catalog.set_query("foo");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(f.registry.search_calls.lock().is_empty());
    settle().await;

    assert_eq!(f.catalog.search_result(), ids(&["acme.foo", "acme.foobar"]));

    let foo = f.catalog.get_extension(&ext("acme.foo")).unwrap();
    assert_eq!(foo.display_name.as_deref(), Some("Foo display"));
    assert_eq!(foo.version.as_deref(), Some("2.0.0"));
    assert_eq!(foo.publisher.as_deref(), Some("Acme"));
    assert!(!foo.installed);

    let labels: Vec<String> = f
        .catalog
        .search_result_records()
        .iter()
        .map(|record| record.label().to_string())
        .collect();
    assert_eq!(labels, vec!["Foo display", "foobar display"]);
    assert!(f.progress.started.lock().contains(&"search".to_string()));
    assert_eq!(
        f.progress.started.lock().len(),
        f.progress.finished.lock().len()
    );
}

#[tokio::test(start_paused = true)]
async fn test_installed_set_matches_host_after_reconcile() {
    let f = fixture(&["acme.foo", "Acme.Bar"]);
    {
        let mut plugins = f.host.plugins.lock();
        plugins.push(HostPlugin {
            id: "acme.theme".into(),
            engine: "theia".into(),
            version: None,
        });
    }
    f.registry.on_detail("acme.foo", Reply::Ok(detail("acme", "foo", None)));
    f.catalog.start().await;

    assert_eq!(f.catalog.installed(), ids(&["acme.foo", "acme.bar"]));
    let bar = f.catalog.get_extension(&ext("acme.bar")).unwrap();
    assert!(bar.installed);
    assert_eq!(bar.installed_version.as_deref(), Some("1.0.0"));

    settle().await;
    let foo = f.catalog.get_extension(&ext("acme.foo")).unwrap();
    assert_eq!(foo.version.as_deref(), Some("2.0.0"));
    assert!(foo.installed);
    // Not found in the registry but installed: kept as is.
    assert!(f.catalog.get_extension(&ext("acme.bar")).unwrap().installed);
}

#[tokio::test(start_paused = true)]
async fn test_host_change_refreshes_added_and_removed() {
    let f = fixture(&["acme.foo"]);
    f.registry.on_detail("acme.foo", Reply::Ok(detail("acme", "foo", None)));
    f.registry.on_detail("acme.bar", Reply::Ok(detail("acme", "bar", None)));
    f.catalog.start().await;
    settle().await;
    f.registry.detail_calls.lock().clear();

    f.host.set_plugins(vec![vscode_plugin("acme.bar")]);
    settle().await;

    assert_eq!(f.catalog.installed(), ids(&["acme.bar"]));
    let calls: BTreeSet<ExtensionId> = f.registry.detail_calls.lock().iter().cloned().collect();
    assert_eq!(calls, ids(&["acme.foo", "acme.bar"]));

    let foo = f.catalog.get_extension(&ext("acme.foo")).unwrap();
    assert!(!foo.installed);
    assert_eq!(foo.installed_version, None);
    assert_eq!(foo.display_name.as_deref(), Some("foo display"));
}

#[tokio::test(start_paused = true)]
async fn test_installed_set_swapped_before_refreshes_complete() {
    let f = fixture(&["acme.foo"]);
    f.registry.on_detail("acme.foo", Reply::Fail);

    f.catalog.reconcile_installed().await;

    assert_eq!(f.catalog.installed(), ids(&["acme.foo"]));
    settle().await;
    assert_eq!(f.catalog.installed(), ids(&["acme.foo"]));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_keeps_installed_record_on_not_found() {
    let f = fixture(&[]);
    f.catalog.inner.state.lock().store.upsert(
        ext("acme.foo"),
        ExtensionPatch {
            version: Some("1.0".into()),
            ..ExtensionPatch::installed(Some("1.0".into()))
        },
    );
    let before = f.catalog.get_extension(&ext("acme.foo")).unwrap();

    let refreshed = f.catalog.refresh(&ext("acme.foo")).await;

    assert_eq!(refreshed, Some(before));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_not_found_for_uninstalled_is_absent() {
    let f = fixture(&[]);
    f.catalog.inner.state.lock().store.ensure(ext("acme.foo"));

    assert_eq!(f.catalog.refresh(&ext("acme.foo")).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_transport_error_is_absent() {
    let f = fixture(&[]);
    f.registry.on_detail("acme.foo", Reply::Fail);
    let mut rx = f.catalog.subscribe();

    assert_eq!(f.catalog.refresh(&ext("acme.foo")).await, None);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_resolve_unknown_id_fails() {
    let f = fixture(&[]);

    let err = f.catalog.resolve(&ext("acme.ghost")).await.unwrap_err();
    assert!(matches!(err, CatalogError::CannotResolve { ref id } if *id == ext("acme.ghost")));
}

#[tokio::test(start_paused = true)]
async fn test_resolve_renders_sanitized_readme() {
    let f = fixture(&[]);
    f.registry.on_detail(
        "acme.foo",
        Reply::Ok(detail("acme", "foo", Some("https://x/README.md"))),
    );
    f.registry.on_text(
        "https://x/README.md",
        Reply::Ok("# Foo\n\n<script>alert(1)</script>\n\n![logo](https://x/logo.png)".into()),
    );
    let mut rx = f.catalog.subscribe();

    let record = f.catalog.resolve(&ext("acme.foo")).await.unwrap();

    let readme = record.readme.unwrap();
    assert!(readme.contains("<h1>Foo</h1>"));
    assert!(readme.contains("<img"));
    assert!(!readme.contains("<script"));
    assert_eq!(drain(&mut rx), vec![CatalogEvent::Changed]);
}

#[tokio::test(start_paused = true)]
async fn test_resolve_tolerates_missing_readme() {
    let f = fixture(&[]);
    f.registry.on_detail(
        "acme.foo",
        Reply::Ok(detail("acme", "foo", Some("https://x/README.md"))),
    );

    let record = f.catalog.resolve(&ext("acme.foo")).await.unwrap();

    assert_eq!(record.readme, None);
    assert_eq!(record.version.as_deref(), Some("2.0.0"));
}

#[tokio::test(start_paused = true)]
async fn test_resolve_tolerates_readme_transport_error() {
    let f = fixture(&[]);
    f.registry.on_detail(
        "acme.foo",
        Reply::Ok(detail("acme", "foo", Some("https://x/README.md"))),
    );
    f.registry.on_text("https://x/README.md", Reply::Fail);

    let record = f.catalog.resolve(&ext("acme.foo")).await.unwrap();
    assert_eq!(record.readme, None);
}

#[tokio::test(start_paused = true)]
async fn test_search_keeps_hits_with_punctuated_names() {
    let f = fixture(&[]);
    f.registry.on_search(
        "cpp",
        0,
        Reply::Ok(vec![summary("acme", "C++Tools"), summary("acme", "cpp")]),
    );
    f.catalog.start().await;

    f.catalog.set_query("cpp");
    settle().await;

    assert_eq!(f.catalog.search_result(), ids(&["acme.c++tools", "acme.cpp"]));
    let tools = f.catalog.get_extension(&ext("acme.c++tools")).unwrap();
    assert_eq!(tools.name.as_deref(), Some("C++Tools"));
}

#[tokio::test(start_paused = true)]
async fn test_installed_set_keeps_punctuated_host_ids() {
    let f = fixture(&["ms-vscode.C++Tools", "acme.$foo~bar", "acme.foo"]);

    f.catalog.reconcile_installed().await;

    assert_eq!(
        f.catalog.installed(),
        ids(&["ms-vscode.c++tools", "acme.$foo~bar", "acme.foo"])
    );
}

#[tokio::test(start_paused = true)]
async fn test_bounded_refreshes_run_one_at_a_time() {
    let mut config = AppConfig::default().catalog;
    config.max_concurrent_refreshes = 1;
    let f = fixture_with(&config, &["acme.a", "acme.b", "acme.c"]);
    *f.registry.detail_delay.lock() = Duration::from_millis(100);
    for name in ["a", "b", "c"] {
        f.registry
            .on_detail(&format!("acme.{name}"), Reply::Ok(detail("acme", name, None)));
    }

    f.catalog.reconcile_installed().await;
    assert_eq!(f.catalog.installed(), ids(&["acme.a", "acme.b", "acme.c"]));
    assert!(f.catalog.get_extension(&ext("acme.a")).unwrap().version.is_none());

    settle().await;

    assert_eq!(f.registry.max_details_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(f.registry.detail_calls.lock().len(), 3);
    for id in ["acme.a", "acme.b", "acme.c"] {
        let record = f.catalog.get_extension(&ext(id)).unwrap();
        assert_eq!(record.version.as_deref(), Some("2.0.0"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_refreshes_run_concurrently() {
    let f = fixture(&["acme.a", "acme.b", "acme.c"]);
    *f.registry.detail_delay.lock() = Duration::from_millis(100);

    f.catalog.reconcile_installed().await;
    settle().await;

    assert_eq!(f.registry.max_details_in_flight.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_reconcile_emits_swap_and_refresh_changes() {
    let f = fixture(&["acme.foo", "acme.bar"]);
    f.registry.on_detail("acme.foo", Reply::Ok(detail("acme", "foo", None)));
    f.registry.on_detail("acme.bar", Reply::Ok(detail("acme", "bar", None)));
    let mut rx = f.catalog.subscribe();

    f.catalog.reconcile_installed().await;
    assert_eq!(count_changes(&drain(&mut rx)), 1);

    settle().await;
    assert_eq!(count_changes(&drain(&mut rx)), 1);

    assert_eq!(count_category(&f.progress.started, "installed"), 2);
    assert_eq!(count_category(&f.progress.finished, "installed"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reconcile_with_failing_refreshes_emits_only_swap_change() {
    let f = fixture(&["acme.foo", "acme.bar"]);
    f.registry.on_detail("acme.foo", Reply::Fail);
    let mut rx = f.catalog.subscribe();

    f.catalog.reconcile_installed().await;
    settle().await;

    // acme.bar is unknown to the registry but installed, so it still resolves.
    assert_eq!(count_changes(&drain(&mut rx)), 2);

    // Uninstalled and failing: nothing resolves.
    f.host.plugins.lock().clear();
    f.registry.on_detail("acme.bar", Reply::Fail);
    f.catalog.reconcile_installed().await;
    settle().await;

    assert_eq!(count_changes(&drain(&mut rx)), 1);
    assert_eq!(
        count_category(&f.progress.started, "installed"),
        count_category(&f.progress.finished, "installed")
    );
}
