use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use kondate_core::completion::{CompletionModel, CompletionRequest, ModelError};
use kondate_core::gemini::{ErrorResponse, GenerateContentRequest, GenerateContentResponse};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("kondate/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            base_url: API_BASE.to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/{model}:generateContent", self.base_url)
    }
}

/// Error text for a non-2xx answer, preferring the structured message.
fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body).map_or_else(
        |_| {
            let snippet: String = body.chars().take(200).collect();
            format!("{status}: {snippet}")
        },
        |e| e.error.describe(),
    )
}

#[async_trait]
impl CompletionModel for GeminiClient {
    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<String, ModelError> {
        let transport = |e: reqwest::Error| ModelError::Transport {
            model: model.to_string(),
            message: e.to_string(),
        };

        let resp = self
            .client
            .post(self.endpoint(model))
            .query(&[("key", self.api_key.as_str())])
            .json(&GenerateContentRequest::from(request))
            .send()
            .await
            .map_err(|e| transport(e.without_url()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                model: model.to_string(),
                status: status.as_u16(),
                message: describe_failure(status, &body),
            });
        }

        let data: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| transport(e.without_url()))?;

        data.text().ok_or_else(|| {
            if let Some(reason) = data.prompt_feedback.and_then(|f| f.block_reason) {
                tracing::warn!(model = %model, reason = %reason, "prompt blocked");
            }
            ModelError::EmptyResponse {
                model: model.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let client = GeminiClient::new("k".to_string()).unwrap();
        assert_eq!(
            client.endpoint("gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_describe_failure_structured() {
        let body = r#"{"error": {"code": 404, "message": "models/x is not found", "status": "NOT_FOUND"}}"#;
        let msg = describe_failure(reqwest::StatusCode::NOT_FOUND, body);
        assert_eq!(msg, "NOT_FOUND: models/x is not found");
    }

    #[test]
    fn test_describe_failure_plain_body() {
        let msg = describe_failure(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(msg, "502 Bad Gateway: upstream down");
    }

    #[test]
    fn test_unknown_model_is_retriable() {
        let err = ModelError::Api {
            model: "x".to_string(),
            status: 404,
            message: describe_failure(
                reqwest::StatusCode::NOT_FOUND,
                r#"{"error": {"code": 404, "message": "models/x is not found for API version v1beta", "status": "NOT_FOUND"}}"#,
            ),
        };
        assert!(err.is_retriable());
    }
}
