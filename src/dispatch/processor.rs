use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProcessorConfig;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Processing service URL is not configured")]
    NotConfigured,
    #[error("Processing service timed out after {0:?}")]
    Timeout(Duration),
    #[error("Processing service unreachable: {0}")]
    Transport(String),
    #[error("Processing service returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Body sent to the link processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub email: String,
    pub file_id: String,
}

/// The external service that crawls a file's URLs and reports back.
#[async_trait]
pub trait LinkProcessor: Send + Sync {
    async fn request_processing(&self, request: &ProcessRequest) -> Result<(), DispatchError>;
}

/// `LinkProcessor` over HTTP: `POST {base_url}{endpoint}` with a JSON body.
pub struct HttpProcessor {
    client: Client,
    process_url: Option<String>,
}

impl HttpProcessor {
    pub fn new(config: &ProcessorConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            process_url: config.process_url(),
        })
    }
}

#[async_trait]
impl LinkProcessor for HttpProcessor {
    async fn request_processing(&self, request: &ProcessRequest) -> Result<(), DispatchError> {
        let url = self
            .process_url
            .as_deref()
            .ok_or(DispatchError::NotConfigured)?;

        tracing::info!(
            url = %url,
            file_id = %request.file_id,
            email = %request.email,
            "Sending processing request"
        );

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DispatchError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_request_wire_format() {
        let request = ProcessRequest {
            email: "ana@example.com".to_string(),
            file_id: "f-1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({ "email": "ana@example.com", "file_id": "f-1" })
        );
    }

    #[tokio::test]
    async fn test_unconfigured_processor_refuses() {
        let processor = HttpProcessor::new(&ProcessorConfig::default()).unwrap();
        let request = ProcessRequest {
            email: "ana@example.com".to_string(),
            file_id: "f-1".to_string(),
        };
        assert!(matches!(
            processor.request_processing(&request).await,
            Err(DispatchError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_processor_is_transport_error() {
        let processor = HttpProcessor::new(&ProcessorConfig {
            base_url: Some("http://127.0.0.1:1".to_string()),
            endpoint: Some("/process".to_string()),
            timeout_ms: 2000,
        })
        .unwrap();
        let request = ProcessRequest {
            email: "ana@example.com".to_string(),
            file_id: "f-1".to_string(),
        };
        assert!(matches!(
            processor.request_processing(&request).await,
            Err(DispatchError::Transport(_))
        ));
    }
}
