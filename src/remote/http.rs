//! HTTP remote store client.
//!
//! Posts each pending operation to a REST endpoint keyed by operation kind,
//! with merge-duplicates upsert semantics so replays are idempotent.

use async_trait::async_trait;
use reqwest::{header, Client};

use super::traits::{RemoteError, RemoteStore};
use crate::store::queue::{OperationKind, PendingOperation};

/// REST upsert client for the remote data store.
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        // Duplicate delivery must land on the same row, not insert-or-fail
        headers.insert(
            "Prefer",
            header::HeaderValue::from_static("resolution=merge-duplicates"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }

    fn endpoint(&self, kind: OperationKind) -> String {
        let path = match kind {
            OperationKind::ProgressUpsert => "progress",
            OperationKind::QuizScoreInsert => "quiz-scores",
            OperationKind::SummaryUpsert => "summaries",
        };
        format!("{}/{}", self.base_url, path)
    }

    fn auth_header(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| format!("Bearer {}", k))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn apply(&self, op: &PendingOperation) -> Result<(), RemoteError> {
        let mut request = self.client.post(self.endpoint(op.kind));

        if let Some(auth) = self.auth_header() {
            request = request.header(header::AUTHORIZATION, auth);
        }

        let response = request
            .json(&op.payload)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(RemoteError::Rejected {
                status: status.as_u16(),
                message,
            })
        } else {
            // 5xx and everything else: treat as transient
            Err(RemoteError::Network(format!("HTTP {status}: {message}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_per_kind() {
        let store = HttpRemoteStore::new("https://api.example.com/rest/v1", None);
        assert_eq!(
            store.endpoint(OperationKind::ProgressUpsert),
            "https://api.example.com/rest/v1/progress"
        );
        assert_eq!(
            store.endpoint(OperationKind::QuizScoreInsert),
            "https://api.example.com/rest/v1/quiz-scores"
        );
    }
}
