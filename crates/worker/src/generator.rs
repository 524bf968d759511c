//! HTTP client for the code generation service.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use specforge_core::error::CoreError;
use specforge_core::store::CodeGenerator;

/// Calls `POST <endpoint>` with `{spec, language, options}` and expects a zip
/// archive in the response body.
pub struct HttpCodeGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCodeGenerator {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl CodeGenerator for HttpCodeGenerator {
    async fn generate(&self, spec: &Value, language: &str, options: &Value) -> Result<Vec<u8>, CoreError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({"spec": spec, "language": language, "options": options}))
            .send()
            .await
            .map_err(|e| CoreError::Generation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::Generation(format!(
                "generator returned HTTP {}: {}",
                status.as_u16(),
                detail.trim()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CoreError::Generation(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
