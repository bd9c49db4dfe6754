//! Integration tests for the retrieval handlers using wiremock
//!
//! These tests validate each handler's cascade against mock servers and
//! local commands.

mod common;

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sentinel::handlers::{
    HandlerContext, HeaderProbeCliHandler, HttpHeadHandler, MetadataApiHandler, SourceHandler, StaticPageHandler,
};
use sentinel::models::{Method, ResponseFormat, SourceDescriptor};

fn jan_15() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap()
}

/// HEAD probe reads Last-Modified and captures the ETag
#[tokio::test]
async fn test_head_last_modified_and_etag() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/data.csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified", "Wed, 15 Jan 2025 10:30:00 GMT")
                .insert_header("ETag", "\"abc123\""),
        )
        .mount(&mock_server)
        .await;

    let source = common::source("csv", Method::HttpHead, &mock_server.uri(), "/data.csv");
    let mut handler = HttpHeadHandler::new(source, &common::context());

    assert_eq!(handler.fetch().await, Some(jan_15()));
    assert_eq!(handler.raw_value(), Some("Wed, 15 Jan 2025 10:30:00 GMT"));
    assert_eq!(handler.etag(), Some("\"abc123\""));
    assert_eq!(handler.last_error(), None);
}

/// Transient failures are retried up to the bound
#[tokio::test]
async fn test_head_retries_server_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/flaky"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Last-Modified", "Wed, 15 Jan 2025 10:30:00 GMT"),
        )
        .mount(&mock_server)
        .await;

    let source = common::source("flaky", Method::HttpHead, &mock_server.uri(), "/flaky");
    let mut handler = HttpHeadHandler::new(source, &common::context());

    assert_eq!(handler.fetch().await, Some(jan_15()));
}

/// Exhausted retries yield no timestamp and a recorded cause
#[tokio::test]
async fn test_head_exhausted_retries_records_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let source = common::source("down", Method::HttpHead, &mock_server.uri(), "/down");
    let mut handler = HttpHeadHandler::new(source, &common::context());

    assert_eq!(handler.fetch().await, None);
    assert!(handler.last_error().unwrap().contains("503"));
}

/// Client errors are not retried
#[tokio::test]
async fn test_head_404_no_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let source = common::source("missing", Method::HttpHead, &mock_server.uri(), "/missing");
    let mut handler = HttpHeadHandler::new(source, &common::context());

    assert_eq!(handler.fetch().await, None);
    assert!(handler.last_error().is_some());
}

/// The API handler finds fields nested in objects
#[tokio::test]
async fn test_api_nested_json_field() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/meta.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "Population",
            "metadata": { "info": { "updated_at": "2025-01-15T10:30:00Z" } }
        })))
        .mount(&mock_server)
        .await;

    let source = common::source("meta", Method::Api, &mock_server.uri(), "/meta.json");
    let mut handler = MetadataApiHandler::new(source, &common::context());

    assert_eq!(handler.fetch().await, Some(jan_15()));
    assert_eq!(handler.raw_value(), Some("2025-01-15T10:30:00Z"));
    assert!(handler.content().unwrap().contains("Population"));
}

/// The API handler looks inside the first element of a list and reads
/// numeric epochs
#[tokio::test]
async fn test_api_first_list_element_and_epoch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/views"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [
                { "rowsUpdatedAt": 1736937000 },
                { "rowsUpdatedAt": 1 }
            ]
        })))
        .mount(&mock_server)
        .await;

    let source = common::source("views", Method::Api, &mock_server.uri(), "/views");
    let mut handler = MetadataApiHandler::new(source, &common::context());

    assert_eq!(handler.fetch().await, Some(jan_15()));
    assert_eq!(handler.raw_value(), Some("1736937000"));
}

/// A 405 on GET falls through to HEAD and its Last-Modified header
#[tokio::test]
async fn test_api_method_not_allowed_falls_back_to_head() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/head-only"))
        .respond_with(ResponseTemplate::new(405))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/head-only"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Last-Modified", "Wed, 15 Jan 2025 10:30:00 GMT"),
        )
        .mount(&mock_server)
        .await;

    let source = common::source("head-only", Method::Api, &mock_server.uri(), "/head-only");
    let mut handler = MetadataApiHandler::new(source, &common::context());

    assert_eq!(handler.fetch().await, Some(jan_15()));
    assert_eq!(handler.raw_value(), Some("Wed, 15 Jan 2025 10:30:00 GMT"));
}

/// A HEAD reply without Last-Modified yields nothing, even though it carries Date
#[tokio::test]
async fn test_api_head_fallback_ignores_date_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/no-dates"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&mock_server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/no-dates"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Date", "Thu, 16 Jan 2025 08:00:00 GMT"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let source = common::source("no-dates", Method::Api, &mock_server.uri(), "/no-dates");
    let mut handler = MetadataApiHandler::new(source, &common::context());

    assert_eq!(handler.fetch().await, None);
    assert_eq!(handler.raw_value(), None);
    assert_eq!(handler.last_error(), None);
}

/// A configured POST is tried first
#[tokio::test]
async fn test_api_configured_post() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "lastModified": "2025-01-15 10:30:00"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut source = SourceDescriptor::new("query", Method::Api, format!("{}/query", mock_server.uri()));
    source.http_method = Some("post".into());
    let mut handler = MetadataApiHandler::new(Arc::new(source), &common::context());

    assert_eq!(handler.fetch().await, Some(jan_15()));
}

/// XML bodies are searched for the first matching element
#[tokio::test]
async fn test_api_xml_field() {
    let mock_server = MockServer::start().await;

    let xml = r#"<?xml version="1.0"?>
<series>
  <title>GDP</title>
  <meta><ns:last_updated xmlns:ns="urn:x">2025-01-15 10:30:00</ns:last_updated></meta>
</series>"#;

    Mock::given(method("GET"))
        .and(path("/series.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(xml))
        .mount(&mock_server)
        .await;

    let mut source = SourceDescriptor::new("gdp", Method::Api, format!("{}/series.xml", mock_server.uri()));
    source.response_format = ResponseFormat::Xml;
    source.timestamp_field = "last_updated".into();
    let mut handler = MetadataApiHandler::new(Arc::new(source), &common::context());

    assert_eq!(handler.fetch().await, Some(jan_15()));
    assert_eq!(handler.raw_value(), Some("2025-01-15 10:30:00"));
}

/// A body without any candidate field is a parse miss, not an error
#[tokio::test]
async fn test_api_missing_field_is_not_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "rows": 10 })))
        .mount(&mock_server)
        .await;

    let source = common::source("empty", Method::Api, &mock_server.uri(), "/empty");
    let mut handler = MetadataApiHandler::new(source, &common::context());

    assert_eq!(handler.fetch().await, None);
    assert_eq!(handler.last_error(), None);
}

/// Explicit selectors win over the rest of the cascade
#[tokio::test]
async fn test_static_page_selector() {
    let mock_server = MockServer::start().await;

    let html = r#"<!DOCTYPE html>
<html>
<head><meta name="last-modified" content="2020-01-01"></head>
<body>
  <h1>Statistics</h1>
  <p id="refresh">Last Updated: January 15, 2025</p>
</body>
</html>"#;

    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&mock_server)
        .await;

    let mut source = SourceDescriptor::new("stats", Method::BeautifulSoup, format!("{}/stats", mock_server.uri()));
    source.selector = Some("#refresh".into());
    let mut handler = StaticPageHandler::new(Arc::new(source), &common::context());

    assert_eq!(
        handler.fetch().await,
        Some(Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap())
    );
    assert_eq!(handler.raw_value(), Some("Last Updated: January 15, 2025"));
    assert!(handler.content().unwrap().contains("Statistics"));
}

/// Without selectors, `<time datetime>` is used
#[tokio::test]
async fn test_static_page_time_element() {
    let mock_server = MockServer::start().await;

    let html = r#"<html><body>
<p>Published <time datetime="2025-01-15T10:30:00Z">last week</time></p>
</body></html>"#;

    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&mock_server)
        .await;

    let source = common::source("news", Method::BeautifulSoup, &mock_server.uri(), "/news");
    let mut handler = StaticPageHandler::new(source, &common::context());

    assert_eq!(handler.fetch().await, Some(jan_15()));
}

/// Minute-precision `datetime` values parse as calendar dates
#[tokio::test]
async fn test_static_page_minute_precision_time_element() {
    let mock_server = MockServer::start().await;

    let html = r#"<html><body>
<p>Refreshed <time datetime="2025-01-15T10:30">Wednesday morning</time></p>
</body></html>"#;

    Mock::given(method("GET"))
        .and(path("/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&mock_server)
        .await;

    let source = common::source("refresh", Method::BeautifulSoup, &mock_server.uri(), "/refresh");
    let mut handler = StaticPageHandler::new(source, &common::context());

    assert_eq!(handler.fetch().await, Some(jan_15()));
    assert_eq!(handler.raw_value(), Some("2025-01-15T10:30"));
}

/// Meta tags are used when nothing visible carries a date
#[tokio::test]
async fn test_static_page_meta_tag() {
    let mock_server = MockServer::start().await;

    let html = r#"<html><head>
<meta property="article:modified_time" content="2025-01-15T10:30:00+00:00">
</head><body><p>Tables and charts</p></body></html>"#;

    Mock::given(method("GET"))
        .and(path("/charts"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&mock_server)
        .await;

    let source = common::source("charts", Method::BeautifulSoup, &mock_server.uri(), "/charts");
    let mut handler = StaticPageHandler::new(source, &common::context());

    assert_eq!(handler.fetch().await, Some(jan_15()));
    assert_eq!(handler.raw_value(), Some("2025-01-15T10:30:00+00:00"));
}

/// A page with no date is a parse miss
#[tokio::test]
async fn test_static_page_without_date() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Hello</body></html>"))
        .mount(&mock_server)
        .await;

    let source = common::source("plain", Method::BeautifulSoup, &mock_server.uri(), "/plain");
    let mut handler = StaticPageHandler::new(source, &common::context());

    assert_eq!(handler.fetch().await, None);
    assert_eq!(handler.last_error(), None);
}

/// The command handler parses header lines printed by the command
#[cfg(unix)]
#[tokio::test]
async fn test_cli_reads_command_output() {
    let dir = tempfile::TempDir::new().unwrap();
    let headers = dir.path().join("headers.txt");
    std::fs::write(
        &headers,
        "HTTP/2 200\r\ncontent-type: text/csv\r\nDATE: Thu, 16 Jan 2025 08:00:00 GMT\r\nlast-modified: Wed, 15 Jan 2025 10:30:00 GMT\r\n",
    )
    .unwrap();

    let mut source = SourceDescriptor::new("cli", Method::Cli, "https://example.com/data.csv");
    // The appended URL lands in a shell comment
    source.command = Some(format!("cat '{}' #", headers.display()));
    let mut handler = HeaderProbeCliHandler::new(Arc::new(source), &common::context());

    assert_eq!(handler.fetch().await, Some(jan_15()));
    assert_eq!(handler.raw_value(), Some("Wed, 15 Jan 2025 10:30:00 GMT"));
}

/// A failing command yields no timestamp and a recorded cause
#[cfg(unix)]
#[tokio::test]
async fn test_cli_failing_command() {
    let mut source = SourceDescriptor::new("cli", Method::Cli, "https://example.com/data.csv");
    source.command = Some("exit 7 #".into());
    let mut handler = HeaderProbeCliHandler::new(Arc::new(source), &common::context());

    assert_eq!(handler.fetch().await, None);
    assert!(handler.last_error().is_some());
}

/// Whether a pid names a live, non-zombie process
#[cfg(target_os = "linux")]
fn process_alive(pid: &str) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next())
            .map_or(false, |state| state != 'Z'),
        Err(_) => false,
    }
}

/// On timeout the command itself is killed, not only the shell around it
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_cli_timeout_kills_command() {
    let dir = tempfile::TempDir::new().unwrap();
    let pid_file = dir.path().join("pid");

    let mut settings = common::fast_settings();
    settings.http.timeout = 1;
    settings.http.max_retries = 1;
    let context = HandlerContext::new(settings).unwrap();

    let mut source = SourceDescriptor::new("slow", Method::Cli, "https://example.com/data.csv");
    source.command = Some(format!(
        "sh -c 'echo $$ > {}; exec sleep 30' #",
        pid_file.display()
    ));
    let mut handler = HeaderProbeCliHandler::new(Arc::new(source), &context);

    assert_eq!(handler.fetch().await, None);
    assert!(handler.last_error().unwrap().starts_with("Timed out"));

    let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
    let mut alive = true;
    for _ in 0..40 {
        alive = process_alive(&pid);
        if !alive {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert!(!alive, "command {pid} outlived its timeout");
}
