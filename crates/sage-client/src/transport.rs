//! Transport to the SAGE daemon

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use reqwest::{Client, Response};
use sage_types::{DecisionRequest, DecisionResponse, ExecuteRequest, ExecuteResponse};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// How the client reaches the decision and execution endpoints.
#[async_trait]
pub trait ActionTransport: Send + Sync {
    async fn decisions(&self, request: &DecisionRequest) -> ClientResult<DecisionResponse>;

    /// A non-success `ExecuteResponse` is returned as [`ClientError::Api`].
    async fn execute(&self, request: &ExecuteRequest) -> ClientResult<ExecuteResponse>;
}

/// HTTP transport for the daemon's `/api/v1` surface
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let url = format!("{}/api/v1{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> ClientResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let error = serde_json::from_str::<ExecuteResponse>(&text)
            .ok()
            .and_then(|r| r.error);
        Err(ClientError::Api {
            status: status.as_u16(),
            error,
        })
    }
}

#[async_trait]
impl ActionTransport for HttpTransport {
    async fn decisions(&self, request: &DecisionRequest) -> ClientResult<DecisionResponse> {
        self.post("/decisions", request).await
    }

    async fn execute(&self, request: &ExecuteRequest) -> ClientResult<ExecuteResponse> {
        self.post("/actions/execute", request).await
    }
}
