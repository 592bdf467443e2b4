//! End-to-end tests for the import pipeline
//!
//! These tests run the full library path against a mocked Elasticsearch:
//! parser selection, dry-run validation, batching, the bulk wire format,
//! index clearing and progress reporting.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tabfeed_common::config::Settings;
use tabfeed_common::types::{ImportRequest, ProgressEvent};
use tabfeed_common::TabfeedError;
use tabfeed_import::{run_import, ClusterMonitor, ElasticClient, ParserRegistry};
use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Write a CSV file into the temp dir and return its path.
fn write_csv(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let file_path = dir.path().join(name);
    fs::write(&file_path, content).expect("write csv fixture");
    file_path
}

fn client_for(server: &MockServer) -> ElasticClient {
    let settings = Settings {
        elastic_url: server.uri(),
        timeout_secs: 5,
    };
    ElasticClient::new(&settings).expect("client")
}

async fn collect_progress(mut receiver: mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = receiver.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn imports_a_small_file_in_one_batch() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sales/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "took": 3, "errors": false, "items": []
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let file = write_csv(
        &dir,
        "sales.csv",
        "name,count,price,active\nalice,3000,1.57,true\nbob,12,2.5,false\ncarol,7,0.5,true\n",
    );

    let request = ImportRequest::new(&file, "sales.csv", "sales");
    let registry = ParserRegistry::with_builtins();
    let client = client_for(&mock_server);

    let (sender, receiver) = mpsc::channel(16);
    let summary = run_import(&registry, &client, &request, Some(&sender))
        .await
        .expect("import succeeds");
    drop(sender);

    assert_eq!(summary.rows_written, 3);
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.index, "sales");

    let events = collect_progress(receiver).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].rows_submitted, 3);
    assert_eq!(events[0].rows_total, 3);
    assert!((events[0].percent - 100.0).abs() < f32::EPSILON);
}

#[tokio::test]
async fn bulk_request_carries_the_exact_wire_format() {
    let mock_server = MockServer::start().await;
    let expected_body = concat!(
        "{\"index\":{\"_index\":\"sales\",\"_type\":\"default\"}}\n",
        "{\"name\":\"alice\",\"count\":3000}\n",
    );
    Mock::given(method("POST"))
        .and(path("/sales/_bulk"))
        .and(header("content-type", "application/x-ndjson"))
        .and(body_string(expected_body))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errors": false
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let file = write_csv(&dir, "sales.csv", "name,count\nalice,3000\n");

    let request = ImportRequest::new(&file, "sales.csv", "sales");
    let registry = ParserRegistry::with_builtins();
    let client = client_for(&mock_server);

    run_import(&registry, &client, &request, None)
        .await
        .expect("import succeeds");
}

#[tokio::test]
async fn clear_existing_deletes_the_index_first() {
    let mock_server = MockServer::start().await;
    // an absent index answers 404 and the import carries on.
    Mock::given(method("DELETE"))
        .and(path("/sales"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sales/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errors": false
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let file = write_csv(&dir, "sales.csv", "name\nalice\n");

    let request = ImportRequest::new(&file, "sales.csv", "sales").with_clear_existing(true);
    let registry = ParserRegistry::with_builtins();
    let client = client_for(&mock_server);

    run_import(&registry, &client, &request, None)
        .await
        .expect("import succeeds");
}

#[tokio::test]
async fn rejected_bulk_aborts_the_import() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sales/_bulk"))
        .respond_with(ResponseTemplate::new(500).set_body_string("shard failure"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let file = write_csv(&dir, "sales.csv", "name\nalice\n");

    let request = ImportRequest::new(&file, "sales.csv", "sales");
    let registry = ParserRegistry::with_builtins();
    let client = client_for(&mock_server);

    let error = run_import(&registry, &client, &request, None)
        .await
        .expect_err("bulk rejection surfaces");
    assert!(matches!(
        error,
        TabfeedError::ElasticRejected { status: 500, .. }
    ));
}

#[tokio::test]
async fn multibyte_error_bodies_surface_without_panicking() {
    let mock_server = MockServer::start().await;
    // a body whose clip limit lands inside a multi-byte character.
    let mut body = "a".repeat(511);
    body.push('é');
    Mock::given(method("POST"))
        .and(path("/sales/_bulk"))
        .respond_with(ResponseTemplate::new(500).set_body_string(body))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let file = write_csv(&dir, "sales.csv", "name\nalice\n");

    let request = ImportRequest::new(&file, "sales.csv", "sales");
    let registry = ParserRegistry::with_builtins();
    let client = client_for(&mock_server);

    let error = run_import(&registry, &client, &request, None)
        .await
        .expect_err("bulk rejection surfaces");
    match error {
        TabfeedError::ElasticRejected { status: 500, body } => {
            assert!(body.ends_with("..."));
            assert!(!body.contains('é'));
        },
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn structurally_broken_files_produce_no_write_traffic() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    // second data row carries three values against two headers.
    let file = write_csv(&dir, "sales.csv", "name,count\nalice,1\nbob,2,3\n");

    let request = ImportRequest::new(&file, "sales.csv", "sales").with_clear_existing(true);
    let registry = ParserRegistry::with_builtins();
    let client = client_for(&mock_server);

    let error = run_import(&registry, &client, &request, None)
        .await
        .expect_err("validation fails");
    assert!(matches!(
        error,
        TabfeedError::ColumnsExceededHeaders { row: 2, .. }
    ));
}

#[tokio::test]
async fn zero_row_files_complete_without_bulk_traffic() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let file = write_csv(&dir, "sales.csv", "name,count\n");

    let request = ImportRequest::new(&file, "sales.csv", "sales");
    let registry = ParserRegistry::with_builtins();
    let client = client_for(&mock_server);

    let (sender, receiver) = mpsc::channel(16);
    let summary = run_import(&registry, &client, &request, Some(&sender))
        .await
        .expect("empty import succeeds");
    drop(sender);

    assert_eq!(summary.rows_written, 0);
    assert_eq!(summary.batches, 0);
    assert!(collect_progress(receiver).await.is_empty());
}

#[tokio::test]
async fn large_files_stream_in_capped_batches() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/numbers/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errors": false
        })))
        .expect(3)
        .mount(&mock_server)
        .await;

    let mut content = String::from("n\n");
    for i in 0..600 {
        content.push_str(&format!("{}\n", i));
    }
    let dir = TempDir::new().expect("tempdir");
    let file = write_csv(&dir, "numbers.csv", &content);

    let request = ImportRequest::new(&file, "numbers.csv", "numbers");
    let registry = ParserRegistry::with_builtins();
    let client = client_for(&mock_server);

    let (sender, receiver) = mpsc::channel(16);
    let summary = run_import(&registry, &client, &request, Some(&sender))
        .await
        .expect("import succeeds");
    drop(sender);

    assert_eq!(summary.rows_written, 600);
    assert_eq!(summary.batches, 3);

    let events = collect_progress(receiver).await;
    let submitted: Vec<usize> = events.iter().map(|e| e.rows_submitted).collect();
    assert_eq!(submitted, vec![255, 510, 600]);
    assert!(events.windows(2).all(|pair| pair[0].percent < pair[1].percent));
    assert!((events[2].percent - 100.0).abs() < f32::EPSILON);
}

#[tokio::test]
async fn monitor_reports_a_reachable_cluster() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "node-1",
            "version": { "number": "8.17.0" }
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let monitor = ClusterMonitor::spawn_with_interval(client, Duration::from_millis(20));

    let status = monitor.first_status().await.expect("first poll");
    assert!(status.reachable);
    assert_eq!(status.version.as_deref(), Some("8.17.0"));
    monitor.shutdown();
}

#[tokio::test]
async fn monitor_reports_an_unreachable_cluster() {
    // nothing listens on this port.
    let settings = Settings {
        elastic_url: "http://127.0.0.1:9".to_string(),
        timeout_secs: 1,
    };
    let client = ElasticClient::new(&settings).expect("client");
    let monitor = ClusterMonitor::spawn_with_interval(client, Duration::from_millis(20));

    let status = monitor.first_status().await.expect("first poll");
    assert!(!status.reachable);
    assert_eq!(status.version, None);
    monitor.shutdown();
}
