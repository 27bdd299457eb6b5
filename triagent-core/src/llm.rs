//! Language-model collaborator
//!
//! Triage and solution suggestions both ask a model for text. Calls go
//! through the [`LanguageModel`] trait so tests can script answers; every call
//! site wraps the future in [`with_timeout`], which is the only place the
//! pipeline suspends on the network.

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;
use std::future::Future;
use std::time::Duration;

const MAX_TOKENS: u32 = 600;

/// One prompt sent to a model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Fixed instruction for the call site
    pub system: String,
    /// Per-request content
    pub prompt: String,
    /// JSON schema the answer must follow, when a structured answer is wanted
    pub schema: Option<serde_json::Value>,
}

/// Completion interface for language models.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Return the model's raw text answer.
    ///
    /// Fails with [`Error::Timeout`], [`Error::MalformedResponse`] or [`Error::Llm`].
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Run `fut` with a deadline, mapping expiry to [`Error::Timeout`].
///
/// Dropping the returned future cancels the underlying call.
pub async fn with_timeout<T, F>(operation: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Parse a JSON object out of a model answer.
///
/// Accepts bare JSON as well as JSON wrapped in prose or code fences.
pub fn extract_json_object(raw: &str) -> Result<serde_json::Value> {
    let parsed = match serde_json::from_str::<serde_json::Value>(raw.trim()) {
        Ok(value) => value,
        Err(_) => {
            let start = raw.find('{').ok_or_else(|| {
                Error::MalformedResponse("response did not contain a JSON object".to_string())
            })?;
            let end = raw.rfind('}').ok_or_else(|| {
                Error::MalformedResponse("response did not contain a JSON object".to_string())
            })?;
            if end <= start {
                return Err(Error::MalformedResponse(
                    "response JSON bounds are invalid".to_string(),
                ));
            }
            serde_json::from_str::<serde_json::Value>(&raw[start..=end])
                .map_err(|e| Error::MalformedResponse(format!("invalid JSON: {e}")))?
        }
    };

    if !parsed.is_object() {
        return Err(Error::MalformedResponse(
            "response must be a JSON object".to_string(),
        ));
    }
    Ok(parsed)
}

/// HTTP-backed model for Ollama, Claude and OpenAI.
pub struct HttpLanguageModel {
    model: String,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpLanguageModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string());
        let api_key = config.api_key.clone().or_else(|| {
            config
                .provider
                .api_key_env()
                .and_then(|var| std::env::var(var).ok())
        });

        if config.provider.api_key_env().is_some() && api_key.is_none() {
            return Err(Error::Config(
                "llm.api_key (or provider env var) is required".to_string(),
            ));
        }

        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Llm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            model: config.model.clone(),
            provider: config.provider,
            endpoint,
            api_key,
            timeout,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key = self.api_key.as_deref().unwrap_or_default();
        match self.provider {
            LlmProvider::Ollama => {}
            LlmProvider::Claude => {
                headers.insert(
                    "x-api-key",
                    HeaderValue::from_str(key)
                        .map_err(|e| Error::Llm(format!("invalid claude api key header: {e}")))?,
                );
                headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
            }
            LlmProvider::OpenAI => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {key}"))
                        .map_err(|e| Error::Llm(format!("invalid auth header: {e}")))?,
                );
            }
        }
        Ok(headers)
    }

    async fn post(&self, url: String, body: serde_json::Value) -> Result<serde_json::Value> {
        let provider = format!("{:?}", self.provider).to_lowercase();
        let resp = self
            .http
            .post(url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        operation: format!("{provider} request"),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    Error::Llm(format!("{provider} request failed: {e}"))
                }
            })?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Llm(format!("{provider} read body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Llm(format!(
                "{provider} returned {}: {}",
                status.as_u16(),
                text
            )));
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::MalformedResponse(format!("{provider} body is not JSON: {e}")))
    }
}

fn text_at(json: &serde_json::Value, pointer: &str, what: &str) -> Result<String> {
    json.pointer(pointer)
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
        .ok_or_else(|| Error::MalformedResponse(format!("response missing {what}")))
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        match self.provider {
            LlmProvider::Ollama => {
                let mut body = json!({
                    "model": self.model,
                    "system": request.system,
                    "prompt": request.prompt,
                    "stream": false,
                });
                if let Some(schema) = &request.schema {
                    body["format"] = schema.clone();
                }
                let json = self.post(self.url("/api/generate"), body).await?;
                text_at(&json, "/response", "string field `response`")
            }
            LlmProvider::Claude => {
                let system = match &request.schema {
                    Some(schema) => format!(
                        "{}\n\nAnswer with JSON matching this schema:\n{}",
                        request.system, schema
                    ),
                    None => request.system.clone(),
                };
                let body = json!({
                    "model": self.model,
                    "max_tokens": MAX_TOKENS,
                    "temperature": 0,
                    "system": system,
                    "messages": [{ "role": "user", "content": request.prompt }],
                });
                let json = self.post(self.url("/v1/messages"), body).await?;
                text_at(&json, "/content/0/text", "content[0].text")
            }
            LlmProvider::OpenAI => {
                let mut body = json!({
                    "model": self.model,
                    "temperature": 0,
                    "messages": [
                        { "role": "system", "content": request.system },
                        { "role": "user", "content": request.prompt }
                    ]
                });
                if request.schema.is_some() {
                    body["response_format"] = json!({ "type": "json_object" });
                }
                let json = self.post(self.url("/v1/chat/completions"), body).await?;
                text_at(&json, "/choices/0/message/content", "choices[0].message.content")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_accepts_embedded_json() {
        let raw = "```json\n{\"intent\":\"log_analysis\",\"confidence\":0.8}\n```";
        let value = extract_json_object(raw).expect("embedded JSON should parse");
        assert_eq!(value["intent"], "log_analysis");
    }

    #[test]
    fn test_extract_json_rejects_non_objects() {
        assert!(matches!(
            extract_json_object("[1, 2]"),
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_json_object("no json here"),
            Err(Error::MalformedResponse(_))
        ));
        assert!(extract_json_object("} backwards {").is_err());
    }

    #[tokio::test]
    async fn test_with_timeout_maps_expiry() {
        let result: Result<()> = with_timeout("slow call", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        match result {
            Err(Error::Timeout { operation, timeout_ms }) => {
                assert_eq!(operation, "slow call");
                assert_eq!(timeout_ms, 10);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_with_timeout_passes_results_through() {
        let result = with_timeout("fast call", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_http_model_requires_key_for_hosted_providers() {
        let config = LlmConfig {
            provider: LlmProvider::Claude,
            model: "claude-test".to_string(),
            endpoint: None,
            api_key: Some("sk-test".to_string()),
            timeout_secs: 5,
        };
        assert!(HttpLanguageModel::new(&config).is_ok());

        let config = LlmConfig {
            provider: LlmProvider::Ollama,
            model: "llama3.2".to_string(),
            endpoint: Some("http://localhost:11434/".to_string()),
            api_key: None,
            timeout_secs: 5,
        };
        let model = HttpLanguageModel::new(&config).unwrap();
        assert_eq!(model.url("/api/generate"), "http://localhost:11434/api/generate");
    }
}
