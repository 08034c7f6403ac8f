//! Sandbox creation API client.
//!
//! One attempt per call. Status codes are mapped here and nowhere else.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::codec::CreateSandboxRequest;
use crate::config::Endpoints;
use crate::error::TransportError;

/// Version of the creation API this client speaks.
pub const API_VERSION: &str = "2023-07-01";

const API_VERSION_HEADER: &str = "X-CSB-API-Version";
const USER_AGENT_VALUE: &str = concat!("story-sandbox/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct CreateSandboxResponse {
    data: CreatedSandbox,
}

#[derive(Debug, Deserialize)]
struct CreatedSandbox {
    alias: String,
}

#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: reqwest::Client,
    create_url: String,
}

impl SandboxClient {
    pub fn new(endpoints: &Endpoints) -> Result<Self, TransportError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(endpoints.timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| TransportError::Network {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            create_url: endpoints.create_sandbox_url(),
        })
    }

    /// Create a sandbox and return its alias.
    pub async fn create_sandbox(
        &self,
        token: &str,
        request: &CreateSandboxRequest<'_>,
    ) -> Result<String, TransportError> {
        debug!(url = %self.create_url, files = request.files.len(), "creating sandbox");

        let bearer = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            TransportError::Network {
                message: "API token contains characters not allowed in a header".to_string(),
            }
        })?;

        let response = self
            .client
            .post(&self.create_url)
            .header(AUTHORIZATION, bearer)
            .header(CONTENT_TYPE, "application/json")
            .header(API_VERSION_HEADER, API_VERSION)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| TransportError::Network {
                    message: format!("failed to read error response: {e}"),
                })?;
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreateSandboxResponse =
            response
                .json()
                .await
                .map_err(|e| TransportError::InvalidResponse {
                    message: format!("failed to parse creation response: {e}"),
                })?;
        debug!(alias = %created.data.alias, "sandbox created");
        Ok(created.data.alias)
    }
}
