//! Shared JSON-over-HTTP transport for provider adapters.
//!
//! Every adapter owns one `HttpProvider`. It enforces the per-call timeout,
//! attaches the bearer credential and maps transport and upstream failures
//! into `ProviderError`. It never retries.

use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::ProviderError;

/// Longest upstream error body carried into an error message.
const MAX_ERROR_BODY: usize = 512;

/// JSON transport bound to one provider's base URL and credential.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    name: &'static str,
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpProvider {
    pub fn new(name: &'static str, config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Request {
                provider: name.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            name,
            client,
            config,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether a credential is present. Calls fail fast when it is not.
    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// POST `body` as JSON to `path` and decode the JSON response.
    pub async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ProviderError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: self.name.to_string(),
                missing: "API key".into(),
            })?;

        let url = format!("{}{path}", self.config.base_url);
        debug!(provider = self.name, %url, "Calling provider");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = upstream_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            warn!(provider = self.name, status = status.as_u16(), %message, "Provider rejected request");
            return Err(ProviderError::Upstream {
                provider: self.name.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<Resp>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                provider: self.name.to_string(),
                reason: e.to_string(),
            })
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                provider: self.name.to_string(),
                timeout: self.config.timeout,
            }
        } else {
            ProviderError::Request {
                provider: self.name.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// Pull a human-readable message out of an upstream error body.
///
/// Understands `{"message": ..}`, `{"error": ".."}` and
/// `{"error": {"message": ..}}`; anything else is returned as (truncated) text.
fn upstream_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let found = json
            .get("message")
            .or_else(|| json.pointer("/error/message"))
            .or_else(|| json.get("error"))
            .and_then(|v| v.as_str());
        if let Some(msg) = found {
            return Some(msg.to_string());
        }
    }
    let mut text: String = body.chars().take(MAX_ERROR_BODY).collect();
    if body.chars().count() > MAX_ERROR_BODY {
        text.push('…');
    }
    Some(text)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        // Nothing listens on this port; a real request would error differently.
        let http = HttpProvider::new("checkr", ProviderConfig::new("http://127.0.0.1:9")).unwrap();
        assert!(!http.is_configured());

        let err = http
            .post_json::<_, Value>("/v1/checks", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured { .. }));
    }

    #[tokio::test]
    async fn sends_bearer_token_and_decodes_body() {
        let app = Router::new().route(
            "/v1/echo",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({"auth": auth, "echo": body}))
            }),
        );
        let base = fake::spawn(app).await;
        let http = HttpProvider::new("echo", ProviderConfig::new(base).with_api_key("sk_live")).unwrap();

        let resp: Value = http.post_json("/v1/echo", &json!({"a": 1})).await.unwrap();
        assert_eq!(resp["auth"], "Bearer sk_live");
        assert_eq!(resp["echo"]["a"], 1);
    }

    #[tokio::test]
    async fn upstream_error_carries_message() {
        let app = Router::new().route(
            "/v1/fail",
            post(|| async {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({"error": {"message": "SSN does not match"}})),
                )
            }),
        );
        let base = fake::spawn(app).await;
        let http = HttpProvider::new("checkr", ProviderConfig::new(base).with_api_key("k")).unwrap();

        let err = http.post_json::<_, Value>("/v1/fail", &json!({})).await.unwrap_err();
        match err {
            ProviderError::Upstream { status, message, .. } => {
                assert_eq!(status, 422);
                assert_eq!(message, "SSN does not match");
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let app = Router::new().route(
            "/v1/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({}))
            }),
        );
        let base = fake::spawn(app).await;
        let config = ProviderConfig::new(base)
            .with_api_key("k")
            .with_timeout(Duration::from_millis(100));
        let http = HttpProvider::new("slow", config).unwrap();

        let err = http.post_json::<_, Value>("/v1/slow", &json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn undecodable_body_is_invalid_response() {
        let app = Router::new().route("/v1/text", post(|| async { "not json" }));
        let base = fake::spawn(app).await;
        let http = HttpProvider::new("text", ProviderConfig::new(base).with_api_key("k")).unwrap();

        let err = http
            .post_json::<_, Vec<u32>>("/v1/text", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[test]
    fn upstream_message_shapes() {
        assert_eq!(upstream_message(r#"{"message":"bad vin"}"#).as_deref(), Some("bad vin"));
        assert_eq!(upstream_message(r#"{"error":"nope"}"#).as_deref(), Some("nope"));
        assert_eq!(upstream_message("plain failure").as_deref(), Some("plain failure"));
        assert_eq!(upstream_message("   "), None);
    }
}
