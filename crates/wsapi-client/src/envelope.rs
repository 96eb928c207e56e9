//! Response envelopes
//!
//! Query responses arrive wrapped in `QueryResult`; single-object reads come
//! back as `{"<Type>": {...}}`. Service-side failures may be reported either
//! in `QueryResult.Errors` or in an `OperationResult` wrapper.

use serde::Deserialize;
use serde_json::{Map, Value};
use wsapi_error::{TrackerError, TrackerResult};

/// The `QueryResult` body of one page
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryResult {
    #[serde(default)]
    pub total_result_count: usize,

    #[serde(default)]
    pub start_index: usize,

    #[serde(default)]
    pub page_size: usize,

    #[serde(default)]
    pub results: Vec<Value>,

    #[serde(default)]
    pub errors: Vec<String>,

    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OperationResult {
    #[serde(default)]
    errors: Vec<String>,
}

fn operation_errors(body: &Map<String, Value>) -> Option<String> {
    let operation = body.get("OperationResult")?;
    let parsed: OperationResult = serde_json::from_value(operation.clone()).ok()?;
    if parsed.errors.is_empty() {
        None
    } else {
        Some(parsed.errors.join("; "))
    }
}

/// Extracts a query page, failing on error envelopes
pub fn parse_query_result(body: Value) -> TrackerResult<QueryResult> {
    let Value::Object(mut body) = body else {
        return Err(TrackerError::MalformedResponse(
            "query response is not a JSON object".to_string(),
        ));
    };

    if let Some(errors) = operation_errors(&body) {
        return Err(TrackerError::MalformedResponse(format!("service errors: {errors}")));
    }

    let inner = body.remove("QueryResult").ok_or_else(|| {
        TrackerError::MalformedResponse("response has no QueryResult envelope".to_string())
    })?;
    let result: QueryResult = serde_json::from_value(inner)
        .map_err(|e| TrackerError::MalformedResponse(format!("invalid QueryResult: {e}")))?;

    if !result.errors.is_empty() {
        return Err(TrackerError::MalformedResponse(format!(
            "query errors: {}",
            result.errors.join("; ")
        )));
    }
    Ok(result)
}

/// Unwraps a single-object read to the object itself
pub fn unwrap_single(body: Value) -> TrackerResult<Map<String, Value>> {
    let Value::Object(mut body) = body else {
        return Err(TrackerError::MalformedResponse(
            "object response is not a JSON object".to_string(),
        ));
    };

    if let Some(errors) = operation_errors(&body) {
        return Err(TrackerError::MalformedResponse(format!("service errors: {errors}")));
    }

    // Already a bare record
    if body.contains_key("_ref") {
        return Ok(body);
    }

    let key = match body.keys().next() {
        Some(key) if body.len() == 1 => key.clone(),
        _ => {
            return Err(TrackerError::MalformedResponse(
                "expected a single wrapped object".to_string(),
            ))
        }
    };

    match body.remove(&key) {
        Some(Value::Object(inner)) => Ok(inner),
        _ => Err(TrackerError::MalformedResponse(format!(
            "`{key}` does not wrap an object"
        ))),
    }
}
