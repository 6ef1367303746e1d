// ABOUTME: Bundles all statements into one payload and posts it to the import gateway
// ABOUTME: The gateway's status and body are returned verbatim; there is no retry

use super::{Delivery, Payload, StatementOutcome, Transporter};
use crate::config::GatewayConfig;
use crate::error::SyncError;
use crate::migration::GeneratedStatement;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Response of the clear-and-import route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// Parsed JSON body, or the raw text as a JSON string when not JSON
    pub body: serde_json::Value,
}

impl GatewayResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Body as text: the raw string, or compact JSON
    pub fn body_text(&self) -> String {
        match &self.body {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ImportRequest<'a> {
    #[serde(rename = "sqlData")]
    sql_data: &'a str,
}

pub struct GatewayTransport {
    config: GatewayConfig,
    client: Client,
    payload: Payload,
}

impl GatewayTransport {
    pub fn new(config: GatewayConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SyncError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            client,
            payload: Payload::default(),
        })
    }

    /// Post `sql` as one import request
    pub async fn send(&self, sql: &str) -> Result<GatewayResponse, SyncError> {
        let url = self.config.import_url();
        tracing::info!("Sending {} bytes of SQL to {}", sql.len(), url);

        let mut request = self.client.post(&url).json(&ImportRequest { sql_data: sql });
        if let Some(ref token) = self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("Request to {} failed: {}", url, e)))?;

        let status_code = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            SyncError::Transport(format!("Failed to read gateway response: {}", e))
        })?;
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

        Ok(GatewayResponse { status_code, body })
    }
}

#[async_trait]
impl Transporter for GatewayTransport {
    async fn deliver(
        &mut self,
        statement: GeneratedStatement,
    ) -> Result<StatementOutcome, SyncError> {
        self.payload.push(&statement);
        Ok(StatementOutcome::Queued)
    }

    async fn finish(&mut self) -> Result<Delivery, SyncError> {
        let payload = std::mem::take(&mut self.payload);
        tracing::info!("Delivering {} statements through the gateway", payload.len());

        let response = self.send(&payload.render()).await?;
        if response.is_success() {
            tracing::info!("✓ Gateway accepted the import ({})", response.status_code);
        } else {
            tracing::warn!(
                "⚠ Gateway rejected the import ({}): {}",
                response.status_code,
                response.body_text()
            );
        }
        Ok(Delivery::Gateway(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_serializes_with_status_code_key() {
        let response = GatewayResponse {
            status_code: 200,
            body: json!({"imported": 3}),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"statusCode": 200, "body": {"imported": 3}})
        );
        assert!(response.is_success());
    }

    #[test]
    fn test_body_text() {
        let raw = GatewayResponse {
            status_code: 502,
            body: json!("Bad Gateway"),
        };
        assert_eq!(raw.body_text(), "Bad Gateway");
        assert!(!raw.is_success());

        let structured = GatewayResponse {
            status_code: 500,
            body: json!({"error": "schema mismatch"}),
        };
        assert_eq!(structured.body_text(), r#"{"error":"schema mismatch"}"#);
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(ImportRequest {
            sql_data: "INSERT INTO x;",
        })
        .unwrap();
        assert_eq!(body, json!({"sqlData": "INSERT INTO x;"}));
    }
}
