//! HTTP client for the retrieval service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RetrievalError;

/// Longest response body kept in a [`RetrievalError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Document search against a knowledge base.
#[async_trait]
pub trait RetrievalService: Send + Sync {
    /// Returns the documents matching `query`, best match first.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] on transport or service failures.
    async fn query(&self, query: &str) -> Result<Vec<String>, RetrievalError>;
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<String>,
}

/// Retrieval service reached over HTTP at `{base_url}/query`.
#[derive(Debug, Clone)]
pub struct RagClient {
    http: reqwest::Client,
    endpoint: String,
}

impl RagClient {
    /// Creates a client for the service rooted at `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url)
    }

    /// Creates a client that reuses `http`.
    pub fn with_http_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/query", base_url.trim_end_matches('/')),
        }
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RetrievalService for RagClient {
    async fn query(&self, query: &str) -> Result<Vec<String>, RetrievalError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&QueryRequest { query })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|&i| body.is_char_boundary(i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(RetrievalError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: QueryResponse = response.json().await?;
        debug!(
            endpoint = %self.endpoint,
            documents = parsed.results.len(),
            "retrieval service responded"
        );
        Ok(parsed.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        assert_eq!(
            RagClient::new("http://localhost:5000/").endpoint(),
            "http://localhost:5000/query"
        );
        assert_eq!(
            RagClient::new("http://localhost:5000").endpoint(),
            "http://localhost:5000/query"
        );
    }

    #[tokio::test]
    async fn test_query_posts_json_and_reads_results() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/query")
            .match_body(Matcher::Json(serde_json::json!({ "query": "fog computing" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::json!({ "results": ["doc one", "doc two"] }).to_string())
            .create_async()
            .await;

        let client = RagClient::new(&server.url());
        let docs = client.query("fog computing").await;

        mock.assert_async().await;
        assert_eq!(
            docs.unwrap_or_default(),
            vec!["doc one".to_string(), "doc two".to_string()]
        );
    }

    #[tokio::test]
    async fn test_query_missing_results_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/query")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let docs = RagClient::new(&server.url()).query("x").await;
        assert!(docs.is_ok_and(|d| d.is_empty()));
    }

    #[tokio::test]
    async fn test_query_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/query")
            .with_status(500)
            .with_body("index not loaded")
            .create_async()
            .await;

        let result = RagClient::new(&server.url()).query("x").await;
        assert!(matches!(
            result,
            Err(RetrievalError::Status { status: 500, ref body }) if body == "index not loaded"
        ));
    }

    #[tokio::test]
    async fn test_query_invalid_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/query")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let result = RagClient::new(&server.url()).query("x").await;
        assert!(matches!(result, Err(RetrievalError::Http(_))));
    }
}
