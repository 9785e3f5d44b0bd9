use cnpjfinder::config::{AppConfig, BackoffStrategy, RetryConfig};
use cnpjfinder::registry::RegistryClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::load_json_fixture;

/// Path BrasilAPI serves a CNPJ under, relative to the server root
pub fn cnpj_path(cnpj: &str) -> String {
    format!("/api/cnpj/v1/{}", cnpj)
}

/// Registry client pointed at `server`, without rate limiting or retry delays
pub fn registry_client(server: &MockServer, max_retries: u32) -> RegistryClient {
    let mut config = AppConfig::default_config().unwrap();
    config.registry.base_url = format!("{}/api/cnpj/v1", server.uri());
    config.registry.requests_per_second = 0;
    let retry = RetryConfig {
        backoff_strategy: BackoffStrategy::Linear,
        max_retries,
        backoff_base_delay_ms: 0,
        backoff_max_delay_ms: 0,
    };
    RegistryClient::new(&config.http, &config.registry, &retry).unwrap()
}

/// Creates a mock BrasilAPI server that answers each `(cnpj, fixture)` pair with the fixture body.
///
/// Any other CNPJ gets a 404, like the real API does for unknown companies.
pub async fn mock_registry_server(records: &[(&str, &str)]) -> MockServer {
    let server = MockServer::start().await;

    for (cnpj, fixture) in records {
        Mock::given(method("GET"))
            .and(path(cnpj_path(cnpj)))
            .respond_with(ResponseTemplate::new(200).set_body_json(load_json_fixture(fixture)))
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "message": "CNPJ não encontrado",
            "type": "not_found"
        })))
        .with_priority(10)
        .mount(&server)
        .await;

    server
}

/// Creates a mock HTTP server that returns the specified HTTP error status code.
///
/// Useful for testing error handling for 4xx and 5xx responses.
pub async fn mock_error_server(status_code: u16) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status_code))
        .mount(&server)
        .await;

    server
}
