//! End-to-end tests for the sync engine: API client, store and downloads
//! wired together against a mock arXiv server and a temporary database.

use std::sync::Arc;
use std::time::Duration;

use arxiv_crawler::{
    ApiConfig, DownloadStatus, ArxivClient, Database, DownloadEngine, FetchOptions, HttpClient, NamingScheme,
    RecordStore, RetryPolicy, SearchQuery, SyncCursor, SyncEngine, Throttle,
};
use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::feeds::{Entry, atom_feed};
use support::socket_guard::start_mock_server_or_skip;

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        mock_server
    }};
}

// ==================== Helper Functions ====================

struct Harness {
    engine: SyncEngine,
    dir: TempDir,
}

async fn harness(server: &MockServer) -> Harness {
    harness_with_pattern(server, "{arxiv_id}").await
}

async fn harness_with_pattern(server: &MockServer, pattern: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let policy = RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(20), 2.0)
        .with_max_jitter(Duration::ZERO);
    let client = ArxivClient::new(
        &ApiConfig {
            base_url: format!("{}/api/query", server.uri()),
            ..ApiConfig::default()
        },
        Arc::new(Throttle::disabled()),
        policy.clone(),
    )
    .unwrap();
    let db = Database::new(&dir.path().join("papers.db")).await.unwrap();
    let downloads = DownloadEngine::new(
        HttpClient::with_defaults().unwrap(),
        policy,
        Duration::from_secs(10),
    );
    let naming = NamingScheme::new(dir.path().join("papers")).with_pattern(pattern);
    let engine = SyncEngine::new(Arc::new(client), RecordStore::new(db), downloads, naming)
        .with_page_size(2);
    Harness { engine, dir }
}

fn entries_with_pdfs(server: &MockServer, range: std::ops::Range<u32>) -> Vec<Entry> {
    range
        .map(|n| {
            let entry = Entry::numbered(n, n);
            let pdf = format!("{}/pdf/{}", server.uri(), entry.id);
            entry.with_pdf(pdf)
        })
        .collect()
}

async fn mount_feed_page(server: &MockServer, start: &str, total: u64, entries: &[Entry]) {
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("start", start))
        .respond_with(ResponseTemplate::new(200).set_body_string(atom_feed(total, entries)))
        .mount(server)
        .await;
}

async fn mount_pdfs(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/pdf/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 fixture".to_vec()))
        .mount(server)
        .await;
}

// ==================== Search & Fetch Tests ====================

#[tokio::test]
async fn test_search_and_fetch_stores_and_downloads_every_result() {
    let server = require_mock_server!();
    let entries = entries_with_pdfs(&server, 0..3);
    mount_feed_page(&server, "0", 3, &entries[0..2]).await;
    mount_feed_page(&server, "2", 3, &entries[2..3]).await;
    mount_pdfs(&server).await;

    let h = harness(&server).await;
    let result = h
        .engine
        .search_and_fetch(SearchQuery::keywords("fixtures"), 10, 2)
        .await
        .unwrap();

    assert_eq!(result.records.len(), 3);
    assert_eq!(result.merge.inserted, 3);
    let summary = result.download_summary();
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed(), 0);

    for n in 0..3 {
        let id = format!("2401.{n:05}v1");
        let expected = h.dir.path().join("papers").join("cs.AI").join(format!("{id}.pdf"));
        assert!(expected.exists(), "missing {}", expected.display());
        let stored = h.engine.store().get(&id).await.unwrap().unwrap();
        assert_eq!(stored.local_path.as_deref(), Some(expected.as_path()));
    }
}

#[tokio::test]
async fn test_search_and_fetch_rerun_skips_downloaded_papers() {
    let server = require_mock_server!();
    let entries = entries_with_pdfs(&server, 0..2);
    mount_feed_page(&server, "0", 2, &entries).await;
    mount_pdfs(&server).await;

    let h = harness(&server).await;
    let first = h
        .engine
        .search_and_fetch(SearchQuery::keywords("fixtures"), 2, 2)
        .await
        .unwrap();
    assert_eq!(first.download_summary().succeeded, 2);

    let second = h
        .engine
        .search_and_fetch(SearchQuery::keywords("fixtures"), 2, 2)
        .await
        .unwrap();
    assert_eq!(second.merge.unchanged, 2);
    assert!(second.downloads.is_empty());
    assert!(second.records.iter().all(|r| r.is_downloaded()));
}

#[tokio::test]
async fn test_metadata_only_search_writes_no_files() {
    let server = require_mock_server!();
    let entries = entries_with_pdfs(&server, 0..2);
    mount_feed_page(&server, "0", 2, &entries).await;

    let h = harness(&server).await;
    let result = h
        .engine
        .search_and_fetch_with(
            SearchQuery::keywords("fixtures"),
            2,
            &FetchOptions::default().metadata_only(),
        )
        .await
        .unwrap();

    assert_eq!(result.records.len(), 2);
    assert!(result.downloads.is_empty());
    assert!(!h.dir.path().join("papers").exists());
    assert_eq!(h.engine.store().count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_versions_with_same_metadata_get_separate_files() {
    let server = require_mock_server!();
    let entries: Vec<Entry> = ["2301.00001v1", "2301.00001v2"]
        .into_iter()
        .map(|id| {
            let mut entry = Entry::numbered(1, 0);
            entry.id = id.to_string();
            entry.title = "Shared Title".to_string();
            entry.with_pdf(format!("{}/pdf/{id}", server.uri()))
        })
        .collect();
    mount_feed_page(&server, "0", 2, &entries).await;
    for id in ["2301.00001v1", "2301.00001v2"] {
        Mock::given(method("GET"))
            .and(path(format!("/pdf/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(format!("%PDF {id}").into_bytes()))
            .mount(&server)
            .await;
    }

    let h = harness_with_pattern(&server, "{year}_{first_author}_{title}").await;
    let result = h
        .engine
        .search_and_fetch(SearchQuery::keywords("versions"), 2, 2)
        .await
        .unwrap();
    assert_eq!(result.download_summary().succeeded, 2);

    let store = h.engine.store();
    let v1 = store.get("2301.00001v1").await.unwrap().unwrap();
    let v2 = store.get("2301.00001v2").await.unwrap().unwrap();
    let v1_path = v1.local_path.unwrap();
    let v2_path = v2.local_path.unwrap();

    assert_ne!(v1_path, v2_path);
    assert_eq!(v1_path.parent(), v2_path.parent());
    assert!(
        v2_path.to_string_lossy().ends_with("_2301.00001v2.pdf"),
        "unexpected path {}",
        v2_path.display()
    );
    assert_eq!(std::fs::read(&v1_path).unwrap(), b"%PDF 2301.00001v1");
    assert_eq!(std::fs::read(&v2_path).unwrap(), b"%PDF 2301.00001v2");
}

#[tokio::test]
async fn test_retry_failed_pass_recovers_transient_download() {
    let server = require_mock_server!();
    let entries = entries_with_pdfs(&server, 0..1);
    mount_feed_page(&server, "0", 1, &entries).await;
    // Enough 500s to exhaust the two attempts of the first pass.
    Mock::given(method("GET"))
        .and(path_regex(r"^/pdf/"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_pdfs(&server).await;

    let h = harness(&server).await;
    let result = h
        .engine
        .search_and_fetch_with(
            SearchQuery::keywords("flaky"),
            1,
            &FetchOptions::new(1).retry_failed(true),
        )
        .await
        .unwrap();

    assert_eq!(result.downloads.len(), 1);
    assert_eq!(result.downloads[0].status, DownloadStatus::Succeeded);
    let stored = h.engine.store().get("2401.00000v1").await.unwrap().unwrap();
    assert!(stored.is_downloaded());
    assert!(stored.local_path.unwrap().exists());
}

#[tokio::test]
async fn test_without_retry_failed_transient_download_stays_failed() {
    let server = require_mock_server!();
    let entries = entries_with_pdfs(&server, 0..1);
    mount_feed_page(&server, "0", 1, &entries).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/pdf/"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_pdfs(&server).await;

    let h = harness(&server).await;
    let result = h
        .engine
        .search_and_fetch_with(SearchQuery::keywords("flaky"), 1, &FetchOptions::new(1))
        .await
        .unwrap();

    assert_eq!(result.download_summary().failed_retryable, 1);
    let stored = h.engine.store().get("2401.00000v1").await.unwrap().unwrap();
    assert!(!stored.is_downloaded());
}

// ==================== Incremental Sync Tests ====================

#[tokio::test]
async fn test_sync_persists_cursor_at_newest_update() {
    let server = require_mock_server!();
    let entries: Vec<Entry> = (0..3).map(|n| Entry::numbered(n, n)).collect();
    mount_feed_page(&server, "0", 3, &entries[0..2]).await;
    mount_feed_page(&server, "2", 3, &entries[2..3]).await;

    let h = harness(&server).await;
    let since = Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap();
    let report = h
        .engine
        .sync(SyncCursor::new(Some("cs.AI")).since(since), 2)
        .await
        .unwrap();

    let newest = Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 0).unwrap();
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.records_inserted, 3);
    assert_eq!(report.final_cursor.last_synced_at, Some(newest));

    let resumed = h.engine.resume_cursor(Some("cs.AI")).await.unwrap();
    assert_eq!(resumed.last_synced_at, Some(newest));
    // Other scopes keep their own cursor.
    assert!(h.engine.resume_cursor(None).await.unwrap().last_synced_at.is_none());
}

#[tokio::test]
async fn test_sync_failure_keeps_last_durable_cursor() {
    let server = require_mock_server!();
    let entries: Vec<Entry> = (0..2).map(|n| Entry::numbered(n, n)).collect();
    mount_feed_page(&server, "0", 10, &entries).await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let err = h
        .engine
        .sync(SyncCursor::new(Some("cs.AI")), 2)
        .await
        .unwrap_err();

    let cursor = err.resume_cursor().unwrap();
    let after_first_page = Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap();
    assert_eq!(cursor.last_synced_at, Some(after_first_page));
    assert_eq!(h.engine.store().count().await.unwrap(), 2);
    assert_eq!(
        h.engine
            .resume_cursor(Some("cs.AI"))
            .await
            .unwrap()
            .last_synced_at,
        Some(after_first_page)
    );
}

// ==================== Fetch By Id Tests ====================

#[tokio::test]
async fn test_fetch_by_ids_only_requests_unknown_ids() {
    let server = require_mock_server!();
    let entries = entries_with_pdfs(&server, 0..2);
    mount_feed_page(&server, "0", 1, &entries[0..1]).await;
    mount_pdfs(&server).await;

    let h = harness(&server).await;
    h.engine
        .search_and_fetch_with(
            SearchQuery::keywords("seed"),
            1,
            &FetchOptions::default().metadata_only(),
        )
        .await
        .unwrap();
    server.reset().await;

    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("id_list", "2401.00001v1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(atom_feed(1, &entries[1..2])),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_pdfs(&server).await;

    let ids = vec![
        "2401.00000v1".to_string(),
        "2401.00001v1".to_string(),
        "2401.00000v1".to_string(),
    ];
    let result = h
        .engine
        .fetch_by_ids(&ids, &FetchOptions::new(2))
        .await
        .unwrap();

    assert_eq!(result.records.len(), 2);
    assert_eq!(result.merge.inserted, 1);
    assert_eq!(result.download_summary().succeeded, 2);
}
