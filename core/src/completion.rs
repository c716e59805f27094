use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

/// Models tried in order when the configuration does not name any.
pub const DEFAULT_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-1.5-flash-002",
    "gemini-1.5-flash",
    "gemini-1.5-flash-8b",
    "gemini-1.5-pro-002",
    "gemini-1.0-pro",
];

static RETRIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)not found|not supported|404").expect("pattern is valid"));

/// Binary payload sent alongside the prompt, e.g. a photo.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub attachment: Option<Attachment>,
    /// Ask the model for `application/json` output.
    pub json_output: bool,
}

impl CompletionRequest {
    #[must_use]
    pub fn json(prompt: String) -> Self {
        Self {
            prompt,
            attachment: None,
            json_output: true,
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub model: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model {model} returned HTTP {status}: {message}")]
    Api {
        model: String,
        status: u16,
        message: String,
    },
    #[error("request to model {model} failed: {message}")]
    Transport { model: String, message: String },
    #[error("model {model} returned no text")]
    EmptyResponse { model: String },
    #[error("no candidate models configured")]
    NoCandidates,
}

impl ModelError {
    /// Whether the next candidate should be tried. Only "this model id does
    /// not exist here" failures qualify; quota, auth and network errors would
    /// fail the same way on every candidate.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        RETRIABLE.is_match(&self.to_string())
    }
}

/// One text completion against a named model.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, model: &str, request: &CompletionRequest)
    -> Result<String, ModelError>;
}

/// Try each candidate in order and return the first success.
///
/// Calls are strictly sequential so a successful model is never billed twice.
/// A non-retriable error aborts immediately; exhausting the list returns the
/// last error seen.
pub async fn complete_with_fallback(
    backend: &dyn CompletionModel,
    candidates: &[String],
    request: &CompletionRequest,
) -> Result<Completion, ModelError> {
    let mut last_error = None;

    for model in candidates {
        match backend.complete(model, request).await {
            Ok(text) => {
                tracing::info!(model = %model, "completion succeeded");
                return Ok(Completion {
                    model: model.clone(),
                    text,
                });
            }
            Err(err) if err.is_retriable() => {
                tracing::warn!(model = %model, error = %err, "model unavailable, trying next candidate");
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_error.unwrap_or(ModelError::NoCandidates))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::{CompletionModel, CompletionRequest, ModelError, async_trait};

    /// Replays queued results and records every call.
    #[derive(Default)]
    pub struct ScriptedModel {
        pub replies: Mutex<VecDeque<Result<String, ModelError>>>,
        pub calls: Mutex<Vec<(String, CompletionRequest)>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Result<String, ModelError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::default(),
            }
        }

        pub fn called_models(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(m, _)| m.clone())
                .collect()
        }

        pub fn last_prompt(&self) -> String {
            self.calls.lock().unwrap().last().unwrap().1.prompt.clone()
        }
    }

    #[async_trait]
    impl CompletionModel for ScriptedModel {
        async fn complete(
            &self,
            model: &str,
            request: &CompletionRequest,
        ) -> Result<String, ModelError> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), request.clone()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::EmptyResponse {
                    model: model.to_string(),
                }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedModel;
    use super::*;

    fn candidates(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    fn not_found(model: &str) -> ModelError {
        ModelError::Api {
            model: model.to_string(),
            status: 404,
            message: format!("models/{model} is not found for API version v1beta"),
        }
    }

    #[tokio::test]
    async fn test_falls_back_after_not_found() {
        let backend = ScriptedModel::new(vec![Err(not_found("x")), Ok("[]".to_string())]);
        let result = complete_with_fallback(
            &backend,
            &candidates(&["x", "y"]),
            &CompletionRequest::json("p".into()),
        )
        .await
        .unwrap();
        assert_eq!(result.model, "y");
        assert_eq!(result.text, "[]");
        assert_eq!(backend.called_models(), vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_non_retriable_error_aborts() {
        let backend = ScriptedModel::new(vec![
            Err(ModelError::Api {
                model: "x".to_string(),
                status: 429,
                message: "Resource has been exhausted (e.g. check quota).".to_string(),
            }),
            Ok("[]".to_string()),
        ]);
        let err = complete_with_fallback(
            &backend,
            &candidates(&["x", "y"]),
            &CompletionRequest::json("p".into()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ModelError::Api { status: 429, .. }));
        assert_eq!(backend.called_models(), vec!["x"]);
    }

    #[tokio::test]
    async fn test_single_candidate_failure_surfaces_original_error() {
        let backend = ScriptedModel::new(vec![Err(ModelError::Transport {
            model: "x".to_string(),
            message: "connection reset".to_string(),
        })]);
        let err = complete_with_fallback(
            &backend,
            &candidates(&["x"]),
            &CompletionRequest::json("p".into()),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_all_unavailable_returns_last_error() {
        let backend = ScriptedModel::new(vec![Err(not_found("x")), Err(not_found("y"))]);
        let err = complete_with_fallback(
            &backend,
            &candidates(&["x", "y"]),
            &CompletionRequest::json("p".into()),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("models/y"));
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let backend = ScriptedModel::default();
        let err = complete_with_fallback(&backend, &[], &CompletionRequest::json("p".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::NoCandidates));
        assert!(backend.called_models().is_empty());
    }

    #[test]
    fn test_retriable_classification() {
        assert!(not_found("x").is_retriable());
        assert!(
            ModelError::Transport {
                model: "x".to_string(),
                message: "generateContent is NOT SUPPORTED for this model".to_string(),
            }
            .is_retriable()
        );
        assert!(
            !ModelError::Api {
                model: "x".to_string(),
                status: 400,
                message: "API key not valid".to_string(),
            }
            .is_retriable()
        );
    }
}
