use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;

/// Status vocabulary of the external delivery system. Translated into the
/// local [`DeliveryStatus`](crate::domain::delivery::DeliveryStatus) by the
/// status reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteDeliveryStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Client for the external data-delivery system (DDS).
#[async_trait::async_trait]
pub trait DdsClient: Send + Sync {
    /// Submit a staged directory for delivery. Returns the opaque id the
    /// system assigned, used for all later polls.
    async fn submit(
        &self,
        delivery_project: &str,
        staged_path: &str,
        token: &str,
    ) -> Result<String, AppError>;

    /// Poll the system for the current state of a submitted delivery.
    /// Transport failures surface as [`AppError::Poll`]; they say nothing
    /// about the delivery itself.
    async fn poll_status(&self, external_id: &str) -> Result<RemoteDeliveryStatus, AppError>;
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    project: &'a str,
    source: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: RemoteDeliveryStatus,
}

pub struct HttpDdsClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDdsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Poll(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

#[async_trait::async_trait]
impl DdsClient for HttpDdsClient {
    async fn submit(
        &self,
        delivery_project: &str,
        staged_path: &str,
        token: &str,
    ) -> Result<String, AppError> {
        let url = format!("{}/api/v1/deliveries", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&SubmitRequest {
                project: delivery_project,
                source: staged_path,
            })
            .send()
            .await
            .map_err(|e| AppError::Launch(format!("delivery system submission: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Launch(format!(
                "delivery system rejected submission with {}",
                response.status()
            )));
        }
        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| AppError::Launch(format!("delivery system submission: {e}")))?;
        debug!(external_id = %body.id, "delivery submitted");
        Ok(body.id)
    }

    async fn poll_status(&self, external_id: &str) -> Result<RemoteDeliveryStatus, AppError> {
        let url = format!("{}/api/v1/deliveries/{external_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Poll(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Poll(format!(
                "delivery system answered {}",
                response.status()
            )));
        }
        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| AppError::Poll(e.to_string()))?;
        Ok(body.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_status_vocabulary_deserializes() {
        let parsed: StatusResponse = serde_json::from_str(r#"{"status": "in_progress"}"#).unwrap();
        assert_eq!(parsed.status, RemoteDeliveryStatus::InProgress);
        let parsed: StatusResponse = serde_json::from_str(r#"{"status": "completed"}"#).unwrap();
        assert_eq!(parsed.status, RemoteDeliveryStatus::Completed);
    }

    #[tokio::test]
    async fn unreachable_system_is_a_poll_error() {
        // Reserved TEST-NET-1 address, nothing listens there.
        let client =
            HttpDdsClient::new("http://192.0.2.1:9", Duration::from_millis(100)).unwrap();
        let poll = client.poll_status("snpseq00042").await;
        assert!(matches!(poll, Err(AppError::Poll(_))));
    }
}
