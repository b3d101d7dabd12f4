use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use lms_core::model::{ContentId, ContentProgress, ModuleId, OverallProgress, ProgressUpdate};

use crate::config::ApiConfig;
use crate::error::ApiError;

/// Remote progress service contract.
#[async_trait]
pub trait ProgressApi: Send + Sync {
    /// `GET /progress`
    ///
    /// # Errors
    ///
    /// Returns `ApiError` when the request fails or is rejected.
    async fn overall(&self) -> Result<OverallProgress, ApiError>;

    /// `GET /progress/module/{module_id}`
    ///
    /// # Errors
    ///
    /// Returns `ApiError` when the request fails or is rejected.
    async fn module_contents(&self, module_id: ModuleId)
    -> Result<Vec<ContentProgress>, ApiError>;

    /// `GET /progress/content/{content_id}`
    ///
    /// # Errors
    ///
    /// Returns `ApiError` when the request fails or is rejected.
    async fn content(&self, content_id: ContentId) -> Result<ContentProgress, ApiError>;

    /// `POST /progress/{content_id}`, returning the canonical post-write record.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` when the request fails or is rejected.
    async fn update(
        &self,
        content_id: ContentId,
        update: &ProgressUpdate,
    ) -> Result<ContentProgress, ApiError>;

    /// `POST /progress/access/{module_id}`
    ///
    /// # Errors
    ///
    /// Returns `ApiError` when the request fails or is rejected.
    async fn track_access(&self, module_id: ModuleId) -> Result<(), ApiError>;
}

/// `ProgressApi` over HTTP with JSON bodies.
#[derive(Clone)]
pub struct HttpProgressApi {
    client: Client,
    config: ApiConfig,
}

impl HttpProgressApi {
    /// Build a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unknown` if the HTTP client cannot be constructed.
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Unknown(e.to_string()))?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let limit = self.config.request_timeout;
        let request = self.authorized(self.client.get(self.config.endpoint(path)));
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e, limit))?;
        decode(checked(response).await?, limit).await
    }
}

/// Turn a non-success response into its classified `ApiError`.
async fn checked(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::from_status(
        status.as_u16(),
        error_message(&body),
        retry_after,
    ))
}

/// Pull `detail` or `message` out of a JSON error body, else the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["detail", "message"]
                .iter()
                .find_map(|key| value.get(key)?.as_str().map(str::to_owned))
        })
        .unwrap_or_else(|| body.trim().to_owned())
}

async fn decode<T: DeserializeOwned>(response: Response, limit: Duration) -> Result<T, ApiError> {
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::from_transport(&e, limit))
}

#[async_trait]
impl ProgressApi for HttpProgressApi {
    async fn overall(&self) -> Result<OverallProgress, ApiError> {
        self.get_json("progress").await
    }

    async fn module_contents(
        &self,
        module_id: ModuleId,
    ) -> Result<Vec<ContentProgress>, ApiError> {
        self.get_json(&format!("progress/module/{module_id}")).await
    }

    async fn content(&self, content_id: ContentId) -> Result<ContentProgress, ApiError> {
        self.get_json(&format!("progress/content/{content_id}"))
            .await
    }

    async fn update(
        &self,
        content_id: ContentId,
        update: &ProgressUpdate,
    ) -> Result<ContentProgress, ApiError> {
        let limit = self.config.mutation_timeout;
        let url = self.config.endpoint(&format!("progress/{content_id}"));
        let response = self
            .authorized(self.client.post(url))
            .timeout(limit)
            .json(update)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e, limit))?;
        decode(checked(response).await?, limit).await
    }

    async fn track_access(&self, module_id: ModuleId) -> Result<(), ApiError> {
        let limit = self.config.request_timeout;
        let url = self.config.endpoint(&format!("progress/access/{module_id}"));
        let response = self
            .authorized(self.client.post(url))
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e, limit))?;
        checked(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_default_config() {
        let api = HttpProgressApi::new(ApiConfig::default()).unwrap();
        assert_eq!(
            api.config().endpoint("progress"),
            "http://localhost:8000/api/progress"
        );
    }

    #[test]
    fn error_body_detail_is_extracted() {
        assert_eq!(
            error_message(r#"{"detail":"time_spent must be positive"}"#),
            "time_spent must be positive"
        );
        assert_eq!(error_message(r#"{"message":"slow down"}"#), "slow down");
        assert_eq!(error_message(" bad gateway \n"), "bad gateway");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        // Port 9 (discard) on loopback refuses connections on test machines.
        let config = ApiConfig::default()
            .with_base_url("http://127.0.0.1:9")
            .with_auth_token("token");
        let api = HttpProgressApi::new(config).unwrap();

        let err = api.overall().await.unwrap_err();
        assert!(
            matches!(err, ApiError::Network(_) | ApiError::Timeout(_)),
            "unexpected error: {err:?}"
        );
    }
}
