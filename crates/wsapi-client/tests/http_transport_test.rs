//! HTTP transport tests against a local mock server

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wsapi_client::transport::API_KEY_HEADER;
use wsapi_client::{ClientConfig, HttpTransport, QueryRequest, Transport, TransportError, WsapiClient};

const API_PATH: &str = "/slm/webservice/v2.0";

fn config_for(server: &MockServer) -> ClientConfig {
    common::init_logging();
    ClientConfig::default().with_base_url(format!("{}{API_PATH}", server.uri()))
}

#[tokio::test]
async fn test_query_over_http_sends_key_and_filter() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let base = format!("{}{API_PATH}", server.uri());

    Mock::given(method("GET"))
        .and(path(format!("{API_PATH}/defect")))
        .and(header(API_KEY_HEADER, "secret-key"))
        .and(query_param("query", r#"(State = "Open")"#))
        .and(query_param("start", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "QueryResult": {
                "TotalResultCount": 2,
                "StartIndex": 1,
                "PageSize": 200,
                "Results": [
                    {"_ref": format!("{base}/defect/1"), "_type": "Defect", "Name": "one"},
                    {"_ref": format!("{base}/defect/2"), "_type": "Defect", "Name": "two"}
                ],
                "Errors": [],
                "Warnings": []
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = WsapiClient::new(config_for(&server), Some("secret-key"))?;
    let request = QueryRequest::new("Defect").filter(wsapi_client::FilterSpec::mapping([("State", "Open")]));
    let entities = client.query(request).await?.collect_entities().await?;

    let names: Vec<_> = entities
        .iter()
        .filter_map(|e| e.scalar("Name").and_then(|n| n.as_str()))
        .collect();
    assert_eq!(names, vec!["one", "two"]);
    Ok(())
}

#[tokio::test]
async fn test_non_success_status_is_reported() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&config_for(&server), None)?;
    let url = format!("{}{API_PATH}/defect/1", server.uri());
    let err = transport.get(&url).await.unwrap_err();
    assert_eq!(err, TransportError::Status { url: url.clone(), status: 503 });
    Ok(())
}

#[tokio::test]
async fn test_invalid_json_is_a_decode_error() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&config_for(&server), None)?;
    let err = transport
        .get(&format!("{}{API_PATH}/defect/1", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Decode { .. }), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn test_lazy_fetch_failure_over_http() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let base = format!("{}{API_PATH}", server.uri());

    Mock::given(method("GET"))
        .and(path(format!("{API_PATH}/defect/1")))
        .and(query_param("fetch", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Defect": {
                "_ref": format!("{base}/defect/1"),
                "_type": "Defect",
                "Owner": {"_ref": format!("{base}/user/5"), "_type": "User"}
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{API_PATH}/user/5")))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let client = WsapiClient::new(config_for(&server), None)?;
    let mut defect = client.get_by_id("Defect", 1).await?;
    let err = defect.field("Owner").await.unwrap_err();
    assert_eq!(err.error_code(), "UNRESOLVABLE_REFERENCE");
    assert!(err.to_string().contains("403"));
    Ok(())
}
