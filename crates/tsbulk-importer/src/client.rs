//! Contracts of the remote store collaborators
//!
//! The import engine only talks to the store through these traits, so tests
//! can substitute recording implementations for the HTTP client.

use crate::column::{WriteRequest, WriteResponse};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tsbulk_core::Precision;

/// Executes DDL and other statements
#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn query(&self, command: &str) -> Result<QueryResponse>;
}

/// Sends newline-joined line protocol text
#[async_trait]
pub trait RowWriteClient: Send + Sync {
    async fn write(
        &self,
        database: &str,
        retention_policy: &str,
        raw: &str,
        precision: Precision,
    ) -> Result<()>;
}

/// Sends structured write requests
#[async_trait]
pub trait ColumnWriteClient: Send + Sync {
    async fn write(&self, request: WriteRequest) -> Result<WriteResponse>;
}

/// Body of a `/query` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Outcome of one statement of a query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub statement_id: u32,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub series: Vec<serde_json::Value>,
}

impl QueryResponse {
    /// First error reported either for the whole query or for a statement
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.results.iter().find_map(|r| r.error.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_response_errors() {
        let ok: QueryResponse = serde_json::from_str(r#"{"results":[{"statement_id":0}]}"#).unwrap();
        assert!(ok.error_message().is_none());

        let failed: QueryResponse = serde_json::from_str(
            r#"{"results":[{"statement_id":0},{"statement_id":1,"error":"database name required"}]}"#,
        )
        .unwrap();
        assert_eq!(failed.error_message(), Some("database name required"));

        let top: QueryResponse = serde_json::from_str(r#"{"error":"missing parameter: q"}"#).unwrap();
        assert_eq!(top.error_message(), Some("missing parameter: q"));
    }
}
