//! Shared helpers for the client integration tests

#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use serde_json::{json, Value};
use wsapi_client::testing::MockTransport;
use wsapi_client::telemetry::init_test_tracing;
use wsapi_client::{ClientConfig, WsapiClient};

pub const BASE: &str = "http://tracker.test/slm/webservice/v2.0";

/// Default settings with retry delays short enough for tests
pub fn fast_config() -> ClientConfig {
    ClientConfig::default()
        .with_base_url(BASE)
        .with_retry_delays(&[Duration::ZERO, Duration::from_millis(10), Duration::from_millis(20)])
}

static TRACING: Once = Once::new();

/// Routes client logs through the test writer; `RUST_LOG` overrides the level
pub fn init_logging() {
    TRACING.call_once(|| {
        let _ = init_test_tracing(Some("wsapi_client=debug"));
    });
}

pub fn client(transport: &Arc<MockTransport>, config: ClientConfig) -> WsapiClient {
    init_logging();
    WsapiClient::with_transport(transport.clone(), config).expect("valid test config")
}

pub fn url(path: &str) -> String {
    format!("{BASE}/{path}")
}

/// A reference stub as the service embeds it in other records
pub fn stub(path: &str, type_name: &str, name: &str) -> Value {
    json!({"_ref": url(path), "_type": type_name, "_refObjectName": name})
}
