use crate::config::ClientConfig;
use crate::error::StreamError;
use anyhow::Context;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Serialize;

/// The pipeline service rejects shorter task descriptions.
pub const MIN_TASK_CHARS: usize = 10;

/// JSON body of the `generate-report` request.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRequest {
    task_description: String,
}

impl ReportRequest {
    pub fn new(task: &str) -> Result<Self, StreamError> {
        let task = task.trim();
        if task.chars().count() < MIN_TASK_CHARS {
            return Err(StreamError::TaskTooShort {
                min: MIN_TASK_CHARS,
            });
        }
        Ok(Self {
            task_description: task.to_string(),
        })
    }

    pub fn task_description(&self) -> &str {
        &self.task_description
    }
}

/// HTTP transport for the report pipeline.
#[derive(Debug, Clone)]
pub struct ReportClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ReportClient {
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .context("build report http client")?;
        Ok(Self {
            http,
            endpoint: config.endpoint(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue the request and return the response once headers arrive.
    ///
    /// The body is left unread so the caller can consume it incrementally.
    /// `Ok(None)` means the service answered without a body.
    pub async fn open(
        &self,
        request: &ReportRequest,
    ) -> Result<Option<reqwest::Response>, StreamError> {
        tracing::debug!(endpoint = %self.endpoint, "requesting report stream");
        let response = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Ok(None);
        }
        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_tasks_are_rejected_before_any_request() {
        assert!(matches!(
            ReportRequest::new("   too short "),
            Err(StreamError::TaskTooShort { min: 10 })
        ));

        let request = ReportRequest::new("  Compare EV makers' margins  ").unwrap();
        assert_eq!(request.task_description(), "Compare EV makers' margins");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"task_description": "Compare EV makers' margins"})
        );
    }

    #[test]
    fn endpoint_comes_from_config() {
        let config = ClientConfig {
            base_url: "http://127.0.0.1:9/".to_string(),
            ..ClientConfig::default()
        };
        let client = ReportClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:9/generate-report");
    }
}
