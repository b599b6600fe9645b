use std::sync::Arc;

use serde_json::{Map, Value};

use nyx_types::{NyxError, Result, TriggerId};

use crate::config::NyxServiceConfig;
use crate::transport::{HttpMethod, HttpTransport, Transport, TransportRequest, TransportResponse};

/// Placeholder used when the service rejects a specification without detail.
pub const MISSING_VALIDATION_DETAIL: &str = "NULL";

/// Client for the Nyx trigger service.
///
/// Stateless: every call is one round trip, and every failure (transport,
/// HTTP status, malformed body, `"error"` reply) comes back as a [`NyxError`].
#[derive(Clone)]
pub struct NyxClient {
    config: NyxServiceConfig,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for NyxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NyxClient")
            .field("base_url", &self.config.base_url())
            .finish_non_exhaustive()
    }
}

impl NyxClient {
    /// Client over HTTP, using `config` for the address and request timeout.
    pub fn new(config: NyxServiceConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: NyxServiceConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &NyxServiceConfig {
        &self.config
    }

    /// Register a specification and return the identity the service assigned.
    pub async fn register(&self, specification: &str) -> Result<TriggerId> {
        let response = self
            .send(HttpMethod::Post, "/register".to_string(), Some(specification))
            .await?;
        let body = parse_object(&response)?;

        if let Some(error) = body.get("error") {
            return Err(NyxError::Registration(render(error)));
        }
        let Some(id) = body.get("id") else {
            return Err(NyxError::Protocol(format!(
                "register response has neither 'id' nor 'error': {}",
                response.body
            )));
        };
        let id = id.as_i64().map(TriggerId::new).ok_or_else(|| {
            NyxError::Protocol(format!("register returned a non-integer id: {id}"))
        })?;
        if !id.is_registered() {
            return Err(NyxError::Protocol(format!(
                "register returned the reserved id {id}"
            )));
        }
        Ok(id)
    }

    /// Check a specification without registering it.
    ///
    /// Anything other than `"valid": true` is a [`NyxError::Validation`] whose
    /// message concatenates the service's `"errors"`. Rejections are read from
    /// the body whatever the HTTP status.
    pub async fn validate(&self, specification: &str) -> Result<()> {
        let response = self
            .send(HttpMethod::Post, "/validate".to_string(), Some(specification))
            .await?;
        let body = match serde_json::from_str::<Value>(&response.body) {
            Ok(Value::Object(map)) if map.contains_key("valid") || map.contains_key("error") => {
                map
            }
            _ => parse_object(&response)?,
        };

        if let Some(error) = body.get("error") {
            let detail = render(error);
            tracing::info!("Nyx trigger validation failed: {detail}");
            return Err(NyxError::Validation(detail));
        }
        if is_true(body.get("valid")) {
            return if response.is_success() {
                Ok(())
            } else {
                Err(http_error(&response))
            };
        }

        let detail = match body.get("errors") {
            None | Some(Value::Null) => String::new(),
            Some(Value::Array(items)) => items.iter().map(render).collect(),
            Some(other) => render(other),
        };
        let detail = if detail.is_empty() {
            MISSING_VALIDATION_DETAIL.to_string()
        } else {
            detail
        };
        tracing::info!("Nyx trigger validation failed: {detail}");
        Err(NyxError::Validation(detail))
    }

    /// Delete a trigger. The sentinel id and ids the service no longer
    /// knows are both treated as already gone.
    pub async fn unregister(&self, trigger_id: TriggerId) -> Result<()> {
        if !trigger_id.is_registered() {
            tracing::info!(
                "skipping unregistering nyx trigger as the trigger is not yet registered with service."
            );
            return Ok(());
        }

        match self.delete_trigger(trigger_id).await {
            Err(e) if e.is_unknown_trigger() => {
                tracing::debug!(%trigger_id, "trigger already unknown to Nyx service: {e}");
                Ok(())
            }
            other => other,
        }
    }

    async fn delete_trigger(&self, trigger_id: TriggerId) -> Result<()> {
        let response = self
            .send(HttpMethod::Delete, format!("/unregister/{trigger_id}"), None)
            .await?;
        if response.status == 404 {
            return Err(http_error(&response));
        }

        let trimmed = response.body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return if response.is_success() {
                Ok(())
            } else {
                Err(http_error(&response))
            };
        }

        let body = parse_object(&response)?;
        match body.get("error") {
            Some(error) => Err(NyxError::Remote(render(error))),
            None => Ok(()),
        }
    }

    /// Whether the trigger's condition is currently satisfied.
    pub async fn is_ready(&self, trigger_id: TriggerId) -> Result<bool> {
        let status = self.status(trigger_id).await?;
        require_bool(&status, "ready")
    }

    /// Whether the trigger is currently enabled on the service.
    pub async fn is_active(&self, trigger_id: TriggerId) -> Result<bool> {
        let status = self.status(trigger_id).await?;
        require_bool(&status, "active")
    }

    /// Full detail record for a trigger, returned as the service sent it.
    pub async fn trigger_detail(&self, trigger_id: TriggerId) -> Result<Map<String, Value>> {
        if !trigger_id.is_registered() {
            return Err(NyxError::NotRegistered);
        }
        let response = self
            .send(HttpMethod::Get, format!("/trigger/{trigger_id}"), None)
            .await?;
        let body = parse_object(&response)?;
        if let Some(error) = body.get("error") {
            return Err(NyxError::Remote(render(error)));
        }
        Ok(body)
    }

    async fn status(&self, trigger_id: TriggerId) -> Result<Map<String, Value>> {
        if !trigger_id.is_registered() {
            return Err(NyxError::NotRegistered);
        }
        let response = self
            .send(HttpMethod::Get, format!("/status/{trigger_id}"), None)
            .await?;
        let body = parse_object(&response)?;
        if let Some(error) = body.get("error") {
            return Err(NyxError::Remote(render(error)));
        }
        Ok(body)
    }

    async fn send(
        &self,
        method: HttpMethod,
        path: String,
        body: Option<&str>,
    ) -> Result<TransportResponse> {
        let mut headers = Vec::new();
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        let request = TransportRequest {
            method,
            url: format!("{}{}", self.config.base_url(), path),
            path,
            headers,
            body: body.map(str::to_string),
        };

        tracing::debug!(%method, url = %request.url, "sending Nyx request");
        self.transport.execute(request).await
    }
}

/// Parse a response body as a JSON object.
///
/// A non-2xx status is accepted only when the body carries an `"error"` key,
/// so callers report the service's own message.
fn parse_object(response: &TransportResponse) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(&response.body) {
        Ok(Value::Object(map)) if response.is_success() || map.contains_key("error") => Ok(map),
        _ if !response.is_success() => Err(http_error(response)),
        Ok(other) => Err(NyxError::Protocol(format!(
            "expected a JSON object, got: {other}"
        ))),
        Err(e) => Err(NyxError::Protocol(format!(
            "failed to parse Nyx response '{}': {e}",
            response.body
        ))),
    }
}

fn http_error(response: &TransportResponse) -> NyxError {
    NyxError::Http {
        status: response.status,
        body: response.body.clone(),
    }
}

fn require_bool(body: &Map<String, Value>, key: &str) -> Result<bool> {
    match body.get(key) {
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(other) => Err(NyxError::Protocol(format!(
            "'{key}' is not a boolean in Nyx response: {other}"
        ))),
        None => Err(NyxError::Protocol(format!(
            "Status missing from Nyx response: {}",
            Value::Object(body.clone())
        ))),
    }
}

/// `true` or any casing of the string `"true"`.
fn is_true(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Strings verbatim, anything else as compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
