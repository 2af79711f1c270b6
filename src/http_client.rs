use bytes::Bytes;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::error::{HarnessError, Result, TransportError};

/// Status and body of a call that got an HTTP response
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

/// One timed request/response exchange
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Time from send until the body was fully read, or until the transport failed
    pub latency: Duration,
    pub response: std::result::Result<RawResponse, TransportError>,
}

impl Exchange {
    pub fn status(&self) -> std::result::Result<u16, &TransportError> {
        self.response.as_ref().map(|r| r.status)
    }

    pub fn body(&self) -> &[u8] {
        match &self.response {
            Ok(r) => &r.body,
            Err(_) => &[],
        }
    }
}

/// HTTP client for the target service. Never retries: a failed call is a
/// data point, not something to hide.
#[derive(Clone)]
pub struct TargetClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Base URL without trailing slash
    base_url: String,
}

impl TargetClient {
    /// Create a new HTTP client
    pub fn new(
        base_url: &str,
        max_connections: usize,
        connect_timeout: u64,
        request_timeout: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .map_err(|e| HarnessError::Client(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a JSON body and time the exchange
    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Exchange {
        let request = self.client.post(self.url(path)).json(body);
        self.execute(request).await
    }

    /// GET a path and time the exchange
    pub async fn get(&self, path: &str) -> Exchange {
        let request = self.client.get(self.url(path));
        self.execute(request).await
    }

    async fn execute(&self, request: RequestBuilder) -> Exchange {
        let start = Instant::now();
        let response = read_response(request).await;
        let latency = start.elapsed();

        if let Err(e) = &response {
            tracing::debug!(
                error_kind = e.kind(),
                error = %e,
                latency_ms = latency.as_secs_f64() * 1000.0,
                "HTTP request error"
            );
        }

        Exchange { latency, response }
    }
}

async fn read_response(request: RequestBuilder) -> std::result::Result<RawResponse, TransportError> {
    let response = request.send().await?;
    let status = response.status().as_u16();
    let body = response.bytes().await?;
    Ok(RawResponse { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_post_json_returns_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/team/add")
            .match_header("content-type", "application/json")
            .with_status(201)
            .with_body(r#"{"team":{"team_name":"team_1","members":[]}}"#)
            .create_async()
            .await;

        let client = TargetClient::new(&server.url(), 10, 5, 5).unwrap();
        let exchange = client
            .post_json("/team/add", &serde_json::json!({"team_name": "team_1", "members": []}))
            .await;

        assert_eq!(exchange.status(), Ok(201));
        assert!(std::str::from_utf8(exchange.body()).unwrap().contains("team_1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/stats/assignments")
            .with_status(503)
            .create_async()
            .await;

        let client = TargetClient::new(&server.url(), 10, 5, 5).unwrap();
        let exchange = client.get("/stats/assignments").await;
        assert_eq!(exchange.status(), Ok(503));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = TargetClient::new(&format!("http://127.0.0.1:{}", port), 10, 1, 2).unwrap();
        let exchange = client.get("/stats/assignments").await;
        assert!(exchange.status().is_err());
        assert!(exchange.body().is_empty());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = TargetClient::new("http://localhost:8080/", 10, 5, 5).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/team/add"), "http://localhost:8080/team/add");
    }
}
