use std::net::TcpListener;
use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::{HeaderValue, USER_AGENT};
use spider_zenrows::prelude::*;
use tracing_subscriber::EnvFilter;
use url::Url;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test_api_key";

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config_for(server_uri: &str, max_attempts: u32) -> Arc<ZenRowsConfig> {
    Arc::new(
        ZenRowsConfig::builder(API_KEY)
            .api_url(Url::parse(&format!("{}/v1/", server_uri)).unwrap())
            .max_attempts(max_attempts)
            .backoff_factor(0.0)
            .build()
            .unwrap(),
    )
}

fn fetcher(config: Arc<ZenRowsConfig>) -> Fetcher<ReqwestDownloader> {
    Fetcher::new(ReqwestDownloader::new().unwrap())
        .add_middleware(ZenRowsRetryMiddleware::new(config.clone()).unwrap())
        .add_middleware(ZenRowsMiddleware::new(config))
}

#[tokio::test]
async fn session_request_reaches_provider_with_expected_query() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/"))
        .and(query_param("url", "https://target.example/login"))
        .and(query_param("session_id", "12345"))
        .and(query_param("premium_proxy", "true"))
        .and(query_param("apikey", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::parse_zenrows("https://target.example/login")
        .unwrap()
        .with_param("session_id", 12345)
        .with_param("premium_proxy", true);
    let response = fetcher(config_for(&server.uri(), 3))
        .fetch(request)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "<html>ok</html>");
    let query: Vec<String> = response.url.query_pairs().map(|(k, _)| k.into_owned()).collect();
    assert_eq!(query, ["url", "session_id", "premium_proxy", "apikey"]);
}

#[tokio::test]
async fn retriable_status_is_attempted_exactly_ceiling_times() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(3)
        .mount(&server)
        .await;

    let request = Request::parse_zenrows("https://target.example/").unwrap();
    let response = fetcher(config_for(&server.uri(), 3))
        .fetch(request)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.request().attempt(), 3);
    assert_eq!(response.text(), "unavailable");
}

#[tokio::test]
async fn retry_stops_at_first_success() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::parse_zenrows("https://target.example/").unwrap();
    let response = fetcher(config_for(&server.uri(), 5))
        .fetch(request)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.request().attempt(), 3);
}

#[tokio::test]
async fn provider_errors_outside_retry_set_are_returned_once() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_string(r#"{"title": "API key is invalid"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::parse_zenrows("https://target.example/").unwrap();
    let response = fetcher(config_for(&server.uri(), 3))
        .fetch(request)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn plain_requests_bypass_provider_and_retries() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/direct"))
        .and(query_param_is_missing("apikey"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::new(Url::parse(&format!("{}/direct", server.uri())).unwrap());
    let response = fetcher(config_for(&server.uri(), 3))
        .fetch(request)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!response.request().is_rewritten());
}

#[tokio::test]
async fn headers_and_cookies_survive_retries() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/"))
        .and(header("user-agent", "spider-zenrows-test"))
        .and(header("cookie", "session=abc123"))
        .and(query_param("custom_headers", "true"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let request = Request::parse_zenrows("https://target.example/")
        .unwrap()
        .with_param("custom_headers", true)
        .with_header(USER_AGENT, HeaderValue::from_static("spider-zenrows-test"))
        .with_cookie("session", "abc123");
    let response = fetcher(config_for(&server.uri(), 2))
        .fetch(request)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn transport_failures_are_retried_then_surfaced() {
    init_logging();
    // Reserve a port and release it so nothing is listening there.
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let request = Request::parse_zenrows("https://target.example/").unwrap();
    let result = fetcher(config_for(&format!("http://127.0.0.1:{}", port), 2))
        .fetch(request)
        .await;

    let error = match result {
        Err(error) => error,
        Ok(response) => panic!("expected a transport error, got {:?}", response.map(|r| r.status)),
    };
    let ZenRowsError::Transport(details) = &error else {
        panic!("expected a transport error, got {:?}", error);
    };
    assert!(details.is_connect);
    // The provider URL in the message must not carry the key.
    let rendered = error.to_string();
    assert!(!rendered.contains(API_KEY), "{}", rendered);
    assert!(rendered.contains("apikey=***"), "{}", rendered);
}

#[tokio::test]
async fn configuration_from_settings_drives_both_middlewares() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/"))
        .and(query_param("js_render", "true"))
        .and(query_param("block_resources", "image,font"))
        .and(query_param("apikey", "from-settings"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let settings = Settings::new()
        .with("ZENROWS_API_KEY", "from-settings")
        .with("ZENROWS_API_URL", format!("{}/v1/", server.uri()))
        .with("USE_ZENROWS_JS_RENDER", true)
        .with("ZENROWS_BLOCK_RESOURCES", "image,font")
        .with("ZENROWS_MAX_ATTEMPTS", 2)
        .with("ZENROWS_RETRY_BACKOFF", 0);
    let config = Arc::new(ZenRowsConfig::from_settings(&settings).unwrap());

    let response = fetcher(config)
        .fetch(Request::parse_zenrows("https://target.example/").unwrap())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
}
