//! REST client for the sharing platform.
//!
//! A thin transport layer: every method maps one trait operation onto one
//! HTTP call, classifies the response status into a structured
//! [`RemoteError`] kind, and retries transient failures a bounded number of
//! times. No reconciliation logic lives here.

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{RemoteError, Result, SharePackError};

use super::api::{PipelineApi, RecipientApi, ScheduleApi, ShareApi};
use super::types::{
    CreatePipelineRequest, CreateRecipientRequest, CreateShareRequest, PipelineFilter,
    RemotePipeline, RemoteRecipient, RemoteSchedule, RemoteShare, ScheduleState,
};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for transient failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// REST client implementing the four resource APIs.
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    /// HTTP client.
    client: Client,
    /// Base URL of the platform API.
    base_url: String,
    /// Bearer token.
    token: String,
}

impl HttpRemoteClient {
    /// Creates a new platform client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(base_url: &str, token: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RemoteError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Executes a request with bounded retries for transient failures.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        resource: (&str, &str),
    ) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES} for {path}");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                    .await;
            }

            match self.execute_once(method.clone(), path, body, resource).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if e.is_retryable() {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SharePackError::Remote(RemoteError::Network {
                message: String::from("Max retries exceeded"),
            })
        }))
    }

    /// Executes a single request and classifies the response status.
    async fn execute_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        resource: (&str, &str),
    ) -> Result<reqwest::Response> {
        let url = format!("{}{path}", self.base_url);
        trace!("{method} {url}");

        let mut request = self
            .client
            .request(method, &url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token));

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            SharePackError::Remote(RemoteError::Network {
                message: format!("Request failed: {e}"),
            })
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let (resource_type, name) = resource;
        Err(SharePackError::Remote(match status {
            StatusCode::NOT_FOUND => RemoteError::not_found(resource_type, name),
            StatusCode::CONFLICT => RemoteError::already_exists(resource_type, name),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::PermissionDenied {
                message: response.text().await.unwrap_or_default(),
            },
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60);
                RemoteError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            _ => RemoteError::api(status.as_u16(), response.text().await.unwrap_or_default()),
        }))
    }

    /// Executes a request and deserializes the JSON response body.
    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        resource: (&str, &str),
    ) -> Result<T> {
        let response = self.execute(method, path, body, resource).await?;
        response.json().await.map_err(|e| {
            SharePackError::Remote(RemoteError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            })
        })
    }

    /// Executes a request, discarding the response body.
    async fn request_unit(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        resource: (&str, &str),
    ) -> Result<()> {
        self.execute(method, path, body, resource).await?;
        Ok(())
    }

    /// GET that maps a not-found response onto `None`.
    async fn get_opt<T: DeserializeOwned>(
        &self,
        path: &str,
        resource: (&str, &str),
    ) -> Result<Option<T>> {
        match self.request_json(Method::GET, path, None, resource).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RecipientApi for HttpRemoteClient {
    async fn get(&self, name: &str) -> Result<Option<RemoteRecipient>> {
        self.get_opt(&format!("/api/2.0/recipients/{name}"), ("recipient", name))
            .await
    }

    async fn list(&self) -> Result<Vec<RemoteRecipient>> {
        self.request_json(Method::GET, "/api/2.0/recipients", None, ("recipient", "*"))
            .await
    }

    async fn create(&self, request: &CreateRecipientRequest) -> Result<RemoteRecipient> {
        let body = serde_json::to_value(request)
            .map_err(|e| SharePackError::internal(format!("Serialize request: {e}")))?;
        self.request_json(
            Method::POST,
            "/api/2.0/recipients",
            Some(&body),
            ("recipient", &request.name),
        )
        .await
    }

    async fn set_description<'a>(&self, id: &str, description: Option<&'a str>) -> Result<()> {
        let body = serde_json::json!({ "description": description });
        self.request_unit(
            Method::PATCH,
            &format!("/api/2.0/recipients/{id}"),
            Some(&body),
            ("recipient", id),
        )
        .await
    }

    async fn add_ip_addresses(&self, id: &str, addresses: &BTreeSet<String>) -> Result<()> {
        let body = serde_json::json!({ "add": addresses });
        self.request_unit(
            Method::POST,
            &format!("/api/2.0/recipients/{id}/ip-access-list"),
            Some(&body),
            ("recipient", id),
        )
        .await
    }

    async fn remove_ip_addresses(&self, id: &str, addresses: &BTreeSet<String>) -> Result<()> {
        let body = serde_json::json!({ "remove": addresses });
        self.request_unit(
            Method::POST,
            &format!("/api/2.0/recipients/{id}/ip-access-list"),
            Some(&body),
            ("recipient", id),
        )
        .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.request_unit(
            Method::DELETE,
            &format!("/api/2.0/recipients/{id}"),
            None,
            ("recipient", id),
        )
        .await
    }
}

#[async_trait]
impl ShareApi for HttpRemoteClient {
    async fn get(&self, name: &str) -> Result<Option<RemoteShare>> {
        self.get_opt(&format!("/api/2.0/shares/{name}"), ("share", name))
            .await
    }

    async fn list(&self) -> Result<Vec<RemoteShare>> {
        self.request_json(Method::GET, "/api/2.0/shares", None, ("share", "*"))
            .await
    }

    async fn create(&self, request: &CreateShareRequest) -> Result<RemoteShare> {
        let body = serde_json::to_value(request)
            .map_err(|e| SharePackError::internal(format!("Serialize request: {e}")))?;
        self.request_json(
            Method::POST,
            "/api/2.0/shares",
            Some(&body),
            ("share", &request.name),
        )
        .await
    }

    async fn set_description<'a>(&self, id: &str, description: Option<&'a str>) -> Result<()> {
        let body = serde_json::json!({ "description": description });
        self.request_unit(
            Method::PATCH,
            &format!("/api/2.0/shares/{id}"),
            Some(&body),
            ("share", id),
        )
        .await
    }

    async fn add_assets(&self, id: &str, assets: &BTreeSet<String>) -> Result<()> {
        let body = serde_json::json!({ "add": assets });
        self.request_unit(
            Method::POST,
            &format!("/api/2.0/shares/{id}/assets"),
            Some(&body),
            ("share", id),
        )
        .await
    }

    async fn remove_assets(&self, id: &str, assets: &BTreeSet<String>) -> Result<()> {
        let body = serde_json::json!({ "remove": assets });
        self.request_unit(
            Method::POST,
            &format!("/api/2.0/shares/{id}/assets"),
            Some(&body),
            ("share", id),
        )
        .await
    }

    async fn grant_recipients(&self, id: &str, recipients: &BTreeSet<String>) -> Result<()> {
        let body = serde_json::json!({ "grant": recipients });
        self.request_unit(
            Method::POST,
            &format!("/api/2.0/shares/{id}/recipients"),
            Some(&body),
            ("share", id),
        )
        .await
    }

    async fn revoke_recipients(&self, id: &str, recipients: &BTreeSet<String>) -> Result<()> {
        let body = serde_json::json!({ "revoke": recipients });
        self.request_unit(
            Method::POST,
            &format!("/api/2.0/shares/{id}/recipients"),
            Some(&body),
            ("share", id),
        )
        .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.request_unit(
            Method::DELETE,
            &format!("/api/2.0/shares/{id}"),
            None,
            ("share", id),
        )
        .await
    }
}

#[async_trait]
impl PipelineApi for HttpRemoteClient {
    async fn get(&self, name: &str) -> Result<Option<RemotePipeline>> {
        self.get_opt(&format!("/api/2.0/pipelines/{name}"), ("pipeline", name))
            .await
    }

    async fn list(&self, filter: &PipelineFilter) -> Result<Vec<RemotePipeline>> {
        let mut path = String::from("/api/2.0/pipelines");
        let mut params = Vec::new();
        if let Some(catalog) = &filter.catalog {
            params.push(format!("catalog={catalog}"));
        }
        if let Some(schema) = &filter.schema {
            params.push(format!("schema={schema}"));
        }
        if let Some(target) = &filter.target_table {
            params.push(format!("target_table={target}"));
        }
        if !params.is_empty() {
            path.push('?');
            path.push_str(&params.join("&"));
        }

        self.request_json(Method::GET, &path, None, ("pipeline", "*"))
            .await
    }

    async fn create(&self, request: &CreatePipelineRequest) -> Result<RemotePipeline> {
        let body = serde_json::to_value(request)
            .map_err(|e| SharePackError::internal(format!("Serialize request: {e}")))?;
        self.request_json(
            Method::POST,
            "/api/2.0/pipelines",
            Some(&body),
            ("pipeline", &request.name),
        )
        .await
    }

    async fn set_description<'a>(&self, id: &str, description: Option<&'a str>) -> Result<()> {
        let body = serde_json::json!({ "description": description });
        self.request_unit(
            Method::PATCH,
            &format!("/api/2.0/pipelines/{id}"),
            Some(&body),
            ("pipeline", id),
        )
        .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.request_unit(
            Method::DELETE,
            &format!("/api/2.0/pipelines/{id}"),
            None,
            ("pipeline", id),
        )
        .await
    }
}

#[async_trait]
impl ScheduleApi for HttpRemoteClient {
    async fn get_for_pipeline(&self, pipeline_id: &str) -> Result<Option<RemoteSchedule>> {
        self.get_opt(
            &format!("/api/2.0/pipelines/{pipeline_id}/schedule"),
            ("schedule", pipeline_id),
        )
        .await
    }

    async fn create(&self, pipeline_id: &str, state: &ScheduleState) -> Result<RemoteSchedule> {
        let body = serde_json::to_value(state)
            .map_err(|e| SharePackError::internal(format!("Serialize request: {e}")))?;
        self.request_json(
            Method::POST,
            &format!("/api/2.0/pipelines/{pipeline_id}/schedule"),
            Some(&body),
            ("schedule", pipeline_id),
        )
        .await
    }

    async fn update(&self, id: &str, state: &ScheduleState) -> Result<()> {
        let body = serde_json::to_value(state)
            .map_err(|e| SharePackError::internal(format!("Serialize request: {e}")))?;
        self.request_unit(
            Method::PATCH,
            &format!("/api/2.0/schedules/{id}"),
            Some(&body),
            ("schedule", id),
        )
        .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.request_unit(
            Method::DELETE,
            &format!("/api/2.0/schedules/{id}"),
            None,
            ("schedule", id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_maps_not_found_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/shares/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpRemoteClient::new(&server.uri(), "token").expect("client");
        let share = ShareApi::get(&client, "missing").await.expect("get");
        assert!(share.is_none());
    }

    #[tokio::test]
    async fn test_create_conflict_is_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/2.0/shares"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let client = HttpRemoteClient::new(&server.uri(), "token").expect("client");
        let request = CreateShareRequest {
            name: String::from("sales"),
            description: None,
        };
        let err = ShareApi::create(&client, &request)
            .await
            .expect_err("conflict must fail");
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_get_parses_share() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/shares/sales"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "sh-1",
                "name": "sales",
                "assets": ["main.shared.orders"],
                "recipients": ["acme"],
            })))
            .mount(&server)
            .await;

        let client = HttpRemoteClient::new(&server.uri(), "token").expect("client");
        let share = ShareApi::get(&client, "sales")
            .await
            .expect("get")
            .expect("share exists");
        assert_eq!(share.id, "sh-1");
        assert!(share.assets.contains("main.shared.orders"));
    }

    #[tokio::test]
    async fn test_permission_denied_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/2.0/recipients/r-1"))
            .respond_with(ResponseTemplate::new(403).set_body_string("not an owner"))
            .mount(&server)
            .await;

        let client = HttpRemoteClient::new(&server.uri(), "token").expect("client");
        let err = RecipientApi::delete(&client, "r-1")
            .await
            .expect_err("must fail");
        assert!(matches!(
            err,
            SharePackError::Remote(RemoteError::PermissionDenied { .. })
        ));
    }
}
