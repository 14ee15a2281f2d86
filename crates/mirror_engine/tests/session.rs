use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mirror_engine::{
    DownloadRequest, EngineConfig, EngineEvent, Extraction, FailureKind, FetchError, FetchResult,
    FetchSettings, Fetcher, JobId, MirrorSession, NoopProgressSink, ProgressSink, ReferenceFilter,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

async fn mount(server: &MockServer, route: &str, body: &str, content_type: &str, hits: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), content_type))
        .expect(hits)
        .mount(server)
        .await;
}

fn site_dir(out: &TempDir, server: &MockServer) -> PathBuf {
    let address = server.address();
    out.path().join(format!("{}_{}", address.ip(), address.port()))
}

fn mirror_session(out: &TempDir, sink: Arc<dyn ProgressSink>) -> MirrorSession {
    MirrorSession::with_reqwest(EngineConfig::mirror(out.path()), sink).unwrap()
}

#[tokio::test]
async fn cyclic_site_is_mirrored_once_per_url_and_terminates() {
    mirror_logging::initialize_for_tests();
    let server = MockServer::start().await;
    mount(
        &server,
        "/",
        r#"<a href="/a.html">A</a><link rel="stylesheet" href="style.css">"#,
        "text/html",
        1,
    )
    .await;
    mount(
        &server,
        "/a.html",
        r#"<a href="/">home</a><a href="a.html#top">self</a><a href="/style.css">css</a>"#,
        "text/html; charset=utf-8",
        1,
    )
    .await;
    mount(
        &server,
        "/style.css",
        "body { background: url('img/bg.png') }",
        "text/css",
        1,
    )
    .await;
    mount(&server, "/img/bg.png", "PNG", "image/png", 1).await;

    let out = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let seed = format!("{}/", server.uri());

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        mirror_session(&out, sink.clone()).mirror(&seed),
    )
    .await
    .expect("session must terminate");

    assert_eq!(report.failure_count(), 0);
    assert_eq!(
        report.fetched_urls(),
        vec![
            format!("{}/", server.uri()),
            format!("{}/a.html", server.uri()),
            format!("{}/img/bg.png", server.uri()),
            format!("{}/style.css", server.uri()),
        ]
    );

    let site = site_dir(&out, &server);
    assert!(site.join("index.html").is_file());
    assert!(site.join("a.html").is_file());
    assert_eq!(
        fs::read_to_string(site.join("img").join("bg.png")).unwrap(),
        "PNG"
    );

    let events = sink.events();
    let claimed = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::Claimed { .. }))
        .count();
    let completed = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::JobCompleted { .. }))
        .count();
    assert_eq!(claimed, 4);
    assert_eq!(completed, 4);
}

#[tokio::test]
async fn shared_references_are_fetched_once() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/",
        r#"<a href="a.html">a</a><a href="b.html">b</a><a href="shared.css">s</a>"#,
        "text/html",
        1,
    )
    .await;
    mount(&server, "/a.html", r#"<link href="shared.css">"#, "text/html", 1).await;
    mount(&server, "/b.html", r#"<link href="/shared.css">"#, "text/html", 1).await;
    mount(&server, "/shared.css", "p { color: red }", "text/css", 1).await;

    let out = TempDir::new().unwrap();
    let report = mirror_session(&out, Arc::new(NoopProgressSink))
        .mirror(&format!("{}/", server.uri()))
        .await;

    assert_eq!(report.fetched_count(), 4);
    assert!(!report.has_failures());
}

#[tokio::test]
async fn one_missing_page_does_not_abort_its_siblings() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/",
        r#"<a href="ok.txt">ok</a><a href="missing.txt">missing</a>"#,
        "text/html",
        1,
    )
    .await;
    mount(&server, "/ok.txt", "fine", "text/plain", 1).await;
    Mock::given(method("GET"))
        .and(path("/missing.txt"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();
    let report = mirror_session(&out, Arc::new(NoopProgressSink))
        .mirror(&format!("{}/", server.uri()))
        .await;

    assert_eq!(report.fetched_count(), 2);
    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.failures[0].url, format!("{}/missing.txt", server.uri()));
    assert_eq!(report.failures[0].error.kind, FailureKind::HttpStatus(404));
    assert!(site_dir(&out, &server).join("ok.txt").is_file());
    assert!(!site_dir(&out, &server).join("missing.txt").exists());
}

#[tokio::test]
async fn rejected_and_excluded_references_are_never_claimed() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/",
        r#"<img src="photo.JPG"><a href="/private/secret.html">x</a><a href="public.html">p</a>"#,
        "text/html",
        1,
    )
    .await;
    mount(&server, "/photo.JPG", "jpg", "image/jpeg", 0).await;
    mount(&server, "/private/secret.html", "secret", "text/html", 0).await;
    mount(&server, "/public.html", "public", "text/html", 1).await;

    let out = TempDir::new().unwrap();
    let config = EngineConfig::mirror(out.path())
        .with_filters(ReferenceFilter::parse(Some("jpg"), Some("/private")));
    let session = MirrorSession::with_reqwest(config, Arc::new(NoopProgressSink)).unwrap();
    let report = session.mirror(&format!("{}/", server.uri())).await;

    assert_eq!(report.fetched_count(), 2);
}

#[tokio::test]
async fn stray_malformed_bytes_still_recurse() {
    let server = MockServer::start().await;
    let body = b"<p>caf\xff</p><a href=\"next.html\">next</a>".to_vec();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"))
        .expect(1)
        .mount(&server)
        .await;
    mount(&server, "/next.html", "next", "text/html", 1).await;

    let out = TempDir::new().unwrap();
    let report = mirror_session(&out, Arc::new(NoopProgressSink))
        .mirror(&format!("{}/", server.uri()))
        .await;

    assert_eq!(report.fetched_count(), 2);
    assert!(report.extraction_failures.is_empty());
}

#[tokio::test]
async fn binary_document_is_kept_without_recursion() {
    let server = MockServer::start().await;
    let mut body = br#"<a href="next.html">next</a>"#.to_vec();
    body.extend_from_slice(&[0x00, 0x01, 0x02]);
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
        .expect(1)
        .mount(&server)
        .await;
    mount(&server, "/next.html", "next", "text/html", 0).await;

    let out = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let report = mirror_session(&out, sink.clone())
        .mirror(&format!("{}/", server.uri()))
        .await;

    assert_eq!(report.fetched_count(), 1);
    assert_eq!(report.failure_count(), 0);
    assert_eq!(report.extraction_failures.len(), 1);
    assert!(site_dir(&out, &server).join("index.html").is_file());

    let outcome = sink.events().into_iter().find_map(|event| match event {
        EngineEvent::JobCompleted { result: Ok(outcome), .. } => Some(outcome),
        _ => None,
    });
    assert!(matches!(
        outcome.map(|o| o.extraction),
        Some(Extraction::Failed { .. })
    ));
}

#[tokio::test]
async fn seed_fragment_shares_the_claim_of_its_page() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/",
        r##"<a href="/">home</a><a href="#top">top</a>"##,
        "text/html",
        1,
    )
    .await;

    let out = TempDir::new().unwrap();
    let report = mirror_session(&out, Arc::new(NoopProgressSink))
        .mirror(&format!("{}/#top", server.uri()))
        .await;

    assert_eq!(report.fetched_urls(), vec![format!("{}/", server.uri())]);
}

#[tokio::test]
async fn slow_responses_time_out_per_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("late", "application/octet-stream")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();
    let config = EngineConfig::flat(out.path()).with_fetch_settings(FetchSettings {
        request_timeout: Some(Duration::from_millis(100)),
        ..FetchSettings::default()
    });
    let session = MirrorSession::with_reqwest(config, Arc::new(NoopProgressSink)).unwrap();
    let report = session
        .download_all(vec![DownloadRequest::new(format!("{}/slow.bin", server.uri()))])
        .await;

    assert_eq!(report.failures[0].error.kind, FailureKind::Timeout);
    assert!(!out.path().join("slow.bin").exists());
}

#[tokio::test]
async fn cancelled_session_claims_nothing_further() {
    let server = MockServer::start().await;
    mount(&server, "/", r#"<a href="a.html">a</a>"#, "text/html", 0).await;

    let out = TempDir::new().unwrap();
    let session = mirror_session(&out, Arc::new(NoopProgressSink));
    session.cancellation_token().cancel();
    let report = session.mirror(&format!("{}/", server.uri())).await;

    assert_eq!(report.fetched_count(), 0);
    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.failures[0].error.kind, FailureKind::Cancelled);
}

#[tokio::test]
async fn invalid_and_empty_seeds_do_not_start_work() {
    let out = TempDir::new().unwrap();

    let report = mirror_session(&out, Arc::new(NoopProgressSink)).mirror("").await;
    assert_eq!(report, Default::default());

    let report = mirror_session(&out, Arc::new(NoopProgressSink))
        .mirror("definitely not a url")
        .await;
    assert_eq!(report.fetched_count(), 0);
    assert_eq!(report.failures[0].error.kind, FailureKind::InvalidUrl);
}

#[tokio::test]
async fn batch_downloads_each_url_once_without_recursion() {
    let server = MockServer::start().await;
    mount(&server, "/one.html", r#"<a href="linked.html">x</a>"#, "text/html", 1).await;
    mount(&server, "/two.bin", "two", "application/octet-stream", 1).await;
    mount(&server, "/linked.html", "linked", "text/html", 0).await;

    let out = TempDir::new().unwrap();
    let requests = vec![
        DownloadRequest::new(format!("{}/one.html", server.uri())),
        DownloadRequest::new(format!("{}/two.bin", server.uri()))
            .with_file_name(Some("renamed.bin".to_string())),
        DownloadRequest::new(format!("{}/one.html", server.uri())),
    ];
    let session =
        MirrorSession::with_reqwest(EngineConfig::flat(out.path()), Arc::new(NoopProgressSink))
            .unwrap();
    let report = session.download_all(requests).await;

    assert_eq!(report.fetched_count(), 2);
    assert!(out.path().join("one.html").is_file());
    assert_eq!(
        fs::read_to_string(out.path().join("renamed.bin")).unwrap(),
        "two"
    );
}

/// In-memory site used to exercise the orchestrator without sockets.
struct FakeSite {
    pages: HashMap<String, (String, String)>,
    hits: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl FakeSite {
    fn new(pages: HashMap<String, (String, String)>, delay: Duration) -> Self {
        Self {
            pages,
            hits: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for FakeSite {
    async fn fetch(
        &self,
        _job_id: JobId,
        url: &str,
        destination: &Path,
        _sink: &dyn ProgressSink,
    ) -> Result<FetchResult, FetchError> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let Some((content_type, body)) = self.pages.get(url) else {
            return Err(FetchError {
                kind: FailureKind::HttpStatus(404),
                message: "404 Not Found".to_string(),
            });
        };
        fs::create_dir_all(destination.parent().unwrap()).unwrap();
        fs::write(destination, body).unwrap();
        Ok(FetchResult {
            url: url.to_string(),
            final_url: url.to_string(),
            path: destination.to_path_buf(),
            bytes_written: body.len() as u64,
            total_bytes: Some(body.len() as u64),
            content_type: Some(content_type.clone()),
        })
    }
}

#[tokio::test]
async fn deep_link_chains_complete_without_growing_one_call_stack() {
    const DEPTH: usize = 300;
    let pages = (0..DEPTH)
        .map(|i| {
            let body = if i + 1 < DEPTH {
                format!(r#"<a href="/p{}">next</a><a href="/p0">first</a>"#, i + 1)
            } else {
                r#"<a href="/p0">first</a>"#.to_string()
            };
            (
                format!("https://chain.test/p{i}"),
                ("text/html".to_string(), body),
            )
        })
        .collect();
    let site = Arc::new(FakeSite::new(pages, Duration::ZERO));

    let out = TempDir::new().unwrap();
    let session = MirrorSession::new(
        EngineConfig::mirror(out.path()),
        site.clone(),
        Arc::new(NoopProgressSink),
    );
    let report = session.mirror("https://chain.test/p0").await;

    assert_eq!(report.fetched_count(), DEPTH);
    let hits = site.hits.lock().unwrap();
    assert_eq!(hits.len(), DEPTH);
    assert!(hits.values().all(|&count| count == 1));
}

#[tokio::test]
async fn concurrent_fetches_respect_the_cap() {
    let links: String = (0..12).map(|i| format!(r#"<a href="/f{i}">f</a>"#)).collect();
    let mut pages: HashMap<String, (String, String)> = (0..12)
        .map(|i| {
            (
                format!("https://cap.test/f{i}"),
                ("text/plain".to_string(), "x".to_string()),
            )
        })
        .collect();
    pages.insert(
        "https://cap.test/".to_string(),
        ("text/html".to_string(), links),
    );
    let site = Arc::new(FakeSite::new(pages, Duration::from_millis(20)));

    let out = TempDir::new().unwrap();
    let config = EngineConfig::mirror(out.path()).with_max_concurrent_fetches(3);
    let report = MirrorSession::new(config, site.clone(), Arc::new(NoopProgressSink))
        .mirror("https://cap.test/")
        .await;

    assert_eq!(report.fetched_count(), 13);
    let max = site.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 3, "cap exceeded: {max}");
    assert!(max > 1, "siblings should overlap: {max}");
}

#[tokio::test]
async fn every_link_of_a_large_page_is_scheduled() {
    const LINKS: usize = 12_000;
    let links: String = (0..LINKS).map(|i| format!(r#"<a href="/l{i}">l</a>"#)).collect();
    let pages = HashMap::from([(
        "https://wide.test/".to_string(),
        ("text/html".to_string(), links),
    )]);
    let site = Arc::new(FakeSite::new(pages, Duration::ZERO));

    let out = TempDir::new().unwrap();
    let report = MirrorSession::new(
        EngineConfig::mirror(out.path()),
        site.clone(),
        Arc::new(NoopProgressSink),
    )
    .mirror("https://wide.test/")
    .await;

    assert_eq!(report.fetched_count(), 1);
    assert_eq!(report.failure_count(), LINKS);
    assert_eq!(site.hits.lock().unwrap().len(), LINKS + 1);
}
