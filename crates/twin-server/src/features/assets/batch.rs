//! Batch execution
//!
//! Items run with bounded concurrency but results come back in input order.
//! A partial failure is not an error: it is a 207 with per-item results.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItemResult {
    pub fn uploaded(filename: impl Into<String>, id: i64) -> Self {
        Self {
            filename: Some(filename.into()),
            id: Some(id),
            success: true,
            error: None,
        }
    }

    pub fn upload_failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            id: None,
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn deleted(id: i64) -> Self {
        Self {
            filename: None,
            id: Some(id),
            success: true,
            error: None,
        }
    }

    pub fn delete_failed(id: i64, error: impl Into<String>) -> Self {
        Self {
            filename: None,
            id: Some(id),
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub results: Vec<BatchItemResult>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchOutcome {
    pub fn record(mut self, result: BatchItemResult) -> Self {
        if result.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        if self.failed == 0 {
            StatusCode::OK
        } else {
            StatusCode::MULTI_STATUS
        }
    }
}

impl IntoResponse for BatchOutcome {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

/// Run `operation` over `items`, at most `concurrency` at a time, folding
/// results in input order.
pub async fn run_ordered<I, F, Fut>(items: Vec<I>, concurrency: usize, operation: F) -> BatchOutcome
where
    F: FnMut(I) -> Fut,
    Fut: Future<Output = BatchItemResult>,
{
    stream::iter(items)
        .map(operation)
        .buffered(concurrency.max(1))
        .fold(BatchOutcome::default(), |outcome, result| async move {
            outcome.record(result)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let outcome = run_ordered(vec![30u64, 10, 20], 3, |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            BatchItemResult::deleted(delay as i64)
        })
        .await;

        let ids: Vec<_> = outcome.results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Some(30), Some(10), Some(20)]);
        assert_eq!(outcome.succeeded, 3);
        assert_eq!(outcome.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_partial_failure_is_multi_status() {
        let outcome = run_ordered(vec![1i64, 2, 3], 2, |id| async move {
            if id == 2 {
                BatchItemResult::delete_failed(id, "Asset not found")
            } else {
                BatchItemResult::deleted(id)
            }
        })
        .await;

        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.status_code(), StatusCode::MULTI_STATUS);
        assert!(!outcome.results[1].success);
    }

    #[test]
    fn test_item_serialization_skips_absent_fields() {
        let json = serde_json::to_value(BatchItemResult::upload_failed("a.zip", "boom")).unwrap();
        assert_eq!(json["filename"], "a.zip");
        assert_eq!(json["success"], false);
        assert!(json.get("id").is_none());
    }
}
