//! Integration tests for the GitHub client using wiremock

use chrono::Utc;
use core::time::Duration;
use cve_harvest_lib::harvest::{Client, ClientOptions, Facet, FetchStatus, Progress, RepoEndpoint, RequestTracker, StopSignal, Stopped};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// No-op progress reporter for testing
#[derive(Debug)]
struct NoOpProgress;

impl Progress for NoOpProgress {
    fn set_phase(&self, _phase: &str) {}
    fn set_determinate(&self, _callback: Box<dyn Fn() -> (u64, u64, String) + Send + Sync + 'static>) {}
    fn println(&self, _msg: &str) {}
    fn done(&self) {}
}

fn options(base: &str, token: Option<&str>) -> ClientOptions {
    ClientOptions {
        api_base_url: base.to_string(),
        token: token.map(str::to_string),
        request_timeout: Duration::from_secs(10),
        default_wait: Duration::from_secs(1),
        max_wait_step: Duration::from_secs(60),
    }
}

fn tracker() -> RequestTracker {
    RequestTracker::new(&(Arc::new(NoOpProgress) as Arc<dyn Progress>))
}

fn endpoint(server: &MockServer, repo: &str) -> RepoEndpoint {
    RepoEndpoint::from_canonical(&format!("{}/repos/{repo}", server.uri()))
}

fn quota(remaining: u64, reset_in_secs: i64) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("x-ratelimit-remaining", remaining.to_string().as_str())
        .insert_header("x-ratelimit-reset", (Utc::now().timestamp() + reset_in_secs).to_string().as_str())
}

#[tokio::test]
async fn test_every_fifth_call_failing_is_classified_without_skips() {
    let server = MockServer::start().await;

    for i in 0..10 {
        let response = if (i + 1) % 5 == 0 {
            ResponseTemplate::new(404).set_body_string(r#"{"message":"Not Found"}"#)
        } else {
            quota(4000, 3600).set_body_json(json!({"Rust": 100 + i}))
        };
        Mock::given(method("GET"))
            .and(path(format!("/repos/owner/repo{i}/languages")))
            .respond_with(response)
            .expect(1)
            .mount(&server)
            .await;
    }

    let tracker = tracker();
    tracker.add_requests(Facet::Languages, 10);
    let mut client = Client::new(&options(&server.uri(), None), tracker.clone()).unwrap();
    let stop = StopSignal::default();

    let mut statuses = Vec::new();
    for i in 0..10 {
        let result = client
            .fetch(&endpoint(&server, &format!("owner/repo{i}")), Facet::Languages, &stop)
            .await
            .unwrap();
        assert_eq!(result.facet, "languages");
        statuses.push(result.status);
    }

    let expected: Vec<_> = (0..10)
        .map(|i| if (i + 1) % 5 == 0 { FetchStatus::Failed } else { FetchStatus::Success })
        .collect();
    assert_eq!(statuses, expected);
    assert_eq!(tracker.completed(Facet::Languages), 10);
    assert_eq!(server.received_requests().await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_failed_payload_keeps_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b/contributors"))
        .respond_with(ResponseTemplate::new(451).set_body_string("blocked"))
        .mount(&server)
        .await;

    let mut client = Client::new(&options(&server.uri(), None), tracker()).unwrap();
    let result = client
        .fetch(&endpoint(&server, "a/b"), Facet::Contributors, &StopSignal::default())
        .await
        .unwrap();

    assert_eq!(result.status, FetchStatus::Failed);
    assert_eq!(result.url, format!("{}/repos/a/b", server.uri()));
    assert_eq!(result.payload, json!({"status_code": 451, "text": "blocked"}));
}

#[tokio::test]
async fn test_token_is_sent_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b/languages"))
        .and(header("authorization", "Bearer ghp_secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"C": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::new(&options(&server.uri(), Some("ghp_secret")), tracker()).unwrap();
    let result = client
        .fetch(&endpoint(&server, "a/b"), Facet::Languages, &StopSignal::default())
        .await
        .unwrap();

    assert_eq!(result.status, FetchStatus::Success);
}

#[tokio::test]
async fn test_exhausted_quota_delays_next_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b/languages"))
        .respond_with(quota(0, -10).set_body_json(json!({"Go": 5})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/c/d/languages"))
        .respond_with(quota(4999, 3600).set_body_json(json!({"Go": 6})))
        .mount(&server)
        .await;

    let mut client = Client::new(&options(&server.uri(), None), tracker()).unwrap();
    let stop = StopSignal::default();

    let _ = client.fetch(&endpoint(&server, "a/b"), Facet::Languages, &stop).await.unwrap();
    assert_eq!(client.rate_limit().unwrap().remaining, 0);

    // The reset is already past, so the default wait of one second applies
    let start = std::time::Instant::now();
    let _ = client.fetch(&endpoint(&server, "c/d"), Facet::Languages, &stop).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(client.rate_limit().unwrap().remaining, 4999);
}

#[tokio::test]
async fn test_unexpected_body_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b/contributors"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .mount(&server)
        .await;

    let mut client = Client::new(&options(&server.uri(), None), tracker()).unwrap();
    let result = client
        .fetch(&endpoint(&server, "a/b"), Facet::Contributors, &StopSignal::default())
        .await
        .unwrap();

    assert_eq!(result.status, FetchStatus::Error);
    assert_eq!(result.payload, json!({"response": "<html>rate limited</html>"}));
}

#[tokio::test]
async fn test_probe_queries_rate_limit_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(quota(4321, 600).set_body_json(json!({"resources": {"core": {"remaining": 4321}}})))
        .expect(1)
        .mount(&server)
        .await;

    let tracker = tracker();
    let mut client = Client::new(&options(&server.uri(), None), tracker.clone()).unwrap();
    let result = client.probe(&StopSignal::default()).await.unwrap();

    assert_eq!(result.status, FetchStatus::Success);
    assert_eq!(result.facet, "rate_limit");
    assert_eq!(client.rate_limit().unwrap().remaining, 4321);
    assert_eq!(tracker.completed(Facet::Languages) + tracker.completed(Facet::Contributors), 0);
}

#[tokio::test]
async fn test_stopped_client_issues_no_request() {
    let server = MockServer::start().await;
    let mut client = Client::new(&options(&server.uri(), None), tracker()).unwrap();
    let stop = StopSignal::default();
    stop.trigger();

    let result = client.fetch(&endpoint(&server, "a/b"), Facet::Languages, &stop).await;

    assert_eq!(result.err(), Some(Stopped));
    assert!(server.received_requests().await.unwrap().is_empty());
}

/// Base URL of a local port nothing listens on.
fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

#[tokio::test]
async fn test_unreachable_server_is_error_result() {
    let base = closed_port_url();

    let mut client = Client::new(&options(&base, None), tracker()).unwrap();
    let start = std::time::Instant::now();
    let result = client
        .fetch(
            &RepoEndpoint::from_canonical(&format!("{base}/repos/a/b")),
            Facet::Languages,
            &StopSignal::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, FetchStatus::Error);
    assert_eq!(result.url, format!("{base}/repos/a/b"));
    assert!(result.payload.get("error").is_some());
    assert!(client.rate_limit().is_none());

    // Three retries back off for at least 1s, 2s, and 4s
    assert!(start.elapsed() >= Duration::from_secs(7));
}

#[tokio::test]
async fn test_timed_out_request_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b/languages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Slow": 1})).set_delay(Duration::from_secs(5)))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b/languages"))
        .respond_with(quota(4000, 3600).set_body_json(json!({"Rust": 7})))
        .mount(&server)
        .await;

    let mut options = options(&server.uri(), None);
    options.request_timeout = Duration::from_millis(300);
    let mut client = Client::new(&options, tracker()).unwrap();
    let result = client
        .fetch(&endpoint(&server, "a/b"), Facet::Languages, &StopSignal::default())
        .await
        .unwrap();

    assert_eq!(result.status, FetchStatus::Success);
    assert_eq!(result.payload, json!({"Rust": 7}));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert_eq!(client.rate_limit().unwrap().remaining, 4000);
}

#[tokio::test]
async fn test_server_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b/contributors"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::new(&options(&server.uri(), None), tracker()).unwrap();
    let result = client
        .fetch(&endpoint(&server, "a/b"), Facet::Contributors, &StopSignal::default())
        .await
        .unwrap();

    assert_eq!(result.status, FetchStatus::Failed);
    assert_eq!(result.payload["status_code"], 502);
}

#[tokio::test]
async fn test_stop_during_retry_backoff() {
    let base = closed_port_url();
    let stop = Arc::new(StopSignal::default());
    let trigger = Arc::clone(&stop);
    drop(tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.trigger();
    }));

    let mut client = Client::new(&options(&base, None), tracker()).unwrap();
    let start = std::time::Instant::now();
    let result = client
        .fetch(&RepoEndpoint::from_canonical(&format!("{base}/repos/a/b")), Facet::Languages, &stop)
        .await;

    assert_eq!(result.err(), Some(Stopped));
    assert!(start.elapsed() < Duration::from_secs(5));
}
