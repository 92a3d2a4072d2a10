//! Integration tests for the scheduler
//!
//! Several sources share one pool; these tests check that they stay
//! isolated from each other.

use notice_sweep::config::parse_config;
use notice_sweep::crawler::{
    build_scheduler, CrawlEngine, EngineLimits, Fetcher, RetryPolicy, Scheduler, SelectorExtractor,
};
use notice_sweep::output::JsonlLog;
use notice_sweep::source::SourceRegistry;
use notice_sweep::storage::{CursorStore, SqliteCursorStore};
use notice_sweep::SweepError;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SOURCES: &str = r#"
[output]
database-path = "./cursors.db"
records-dir = "./records"

[[source]]
id = "healthy"
base-url = "{base}/ok/"

[source.pagination]
kind = "page-number"
template = "list?page={page}"

[source.listing]
row = "li"
link = "a"
id = { kind = "query", name = "no" }

[[source]]
id = "broken"
base-url = "{base}/down/"

[source.pagination]
kind = "page-number"
template = "list?page={page}"

[source.listing]
row = "li"
link = "a"
id = { kind = "query", name = "no" }
"#;

struct Setup {
    scheduler: Scheduler,
    store: Arc<SqliteCursorStore>,
    records: TempDir,
}

fn setup(server: &MockServer, max_pages: u32) -> Setup {
    let config = parse_config(&SOURCES.replace("{base}", &server.uri())).unwrap();
    let registry = Arc::new(SourceRegistry::build(&config).unwrap());

    let policy = RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
        attempt_timeout: Duration::from_secs(5),
        total_budget: Duration::from_secs(10),
        pacing_min: Duration::ZERO,
        pacing_max: Duration::ZERO,
    };

    let records = TempDir::new().unwrap();
    let store = Arc::new(SqliteCursorStore::open_in_memory().unwrap());
    let engine = CrawlEngine::new(
        Fetcher::new(Client::new(), policy, Vec::new()),
        Arc::new(SelectorExtractor),
        Arc::new(JsonlLog::new(records.path(), 1024 * 1024).unwrap()),
        store.clone(),
        EngineLimits {
            max_pages,
            ..EngineLimits::default()
        },
    );

    Setup {
        scheduler: Scheduler::new(Arc::new(engine), registry, 2),
        store,
        records,
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_raw(format!("<html><body>{}</body></html>", body), "text/html")
}

async fn mount_healthy(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/ok/list"))
        .respond_with(html(
            r#"<ul><li><a href="view?no=2">Two</a></li><li><a href="view?no=1">One</a></li></ul>"#,
        ))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok/view"))
        .respond_with(html("<p>notice</p>"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_failing_source_does_not_block_others() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;
    Mock::given(method("GET"))
        .and(path("/down/list"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let s = setup(&server, 1);
    let summary = s.scheduler.run_tick(None).await.unwrap();

    assert_eq!(summary.started, 2);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.aborted, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.accepted, 2);

    let healthy = s.store.load("healthy").unwrap();
    assert!(healthy.first_run_complete);
    assert_eq!(healthy.last_seen_id.as_deref(), Some("2"));

    let broken = s.store.load("broken").unwrap();
    assert!(broken.is_empty());

    let log = std::fs::read_to_string(s.records.path().join("notices_healthy.jsonl")).unwrap();
    assert_eq!(log.lines().count(), 2);
}

#[tokio::test]
async fn test_single_source_tick() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;

    let s = setup(&server, 1);
    let summary = s.scheduler.run_tick(Some("healthy")).await.unwrap();

    assert_eq!(summary.started, 1);
    assert_eq!(summary.completed, 1);
    assert!(s.store.load("broken").unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_source_is_rejected() {
    let server = MockServer::start().await;
    let s = setup(&server, 1);

    let result = s.scheduler.run_tick(Some("missing")).await;
    assert!(matches!(result, Err(SweepError::UnknownSource(id)) if id == "missing"));
}

#[tokio::test]
async fn test_overlapping_ticks_never_share_a_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok/list"))
        .respond_with(html("<ul></ul>").set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let s = setup(&server, 1);
    let (a, b) = tokio::join!(
        s.scheduler.run_tick(Some("healthy")),
        s.scheduler.run_tick(Some("healthy"))
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.started + b.started, 1);
    assert_eq!(a.skipped_in_flight + b.skipped_in_flight, 1);
    assert!(!s.scheduler.is_in_flight("healthy"));
}

#[tokio::test]
async fn test_shutdown_interrupts_a_running_tick() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("<ul></ul>").set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let s = setup(&server, 1);
    let started = std::time::Instant::now();
    s.scheduler
        .run_until(
            Duration::from_secs(60),
            tokio::time::sleep(Duration::from_millis(200)),
        )
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));

    // Aborted passes release their sources once the runtime drops them
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!s.scheduler.is_in_flight("healthy"));
    assert!(s.store.load("healthy").unwrap().is_empty());
}

#[tokio::test]
async fn test_scheduler_built_from_config() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;

    let dir = TempDir::new().unwrap();
    let output = format!(
        "database-path = \"{}\"\nrecords-dir = \"{}\"",
        dir.path().join("cursors.db").display(),
        dir.path().join("records").display()
    );
    let content = SOURCES
        .replace("base-url = \"{base}/ok/\"", "base-url = \"{base}/ok/\"\nmax-pages = 1")
        .replace("{base}", &server.uri())
        .replace("database-path = \"./cursors.db\"\nrecords-dir = \"./records\"", &output);
    let scheduler = build_scheduler(&parse_config(&content).unwrap()).unwrap();

    let summary = scheduler.run_tick(Some("healthy")).await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.accepted, 2);
    assert!(dir.path().join("records").join("notices_healthy.jsonl").exists());
}
