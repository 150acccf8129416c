//! Translation API client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::TranslationConfig;
use crate::translation::TranslationError;

/// One batch of segments to translate. The reply must keep length and order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslateRequest {
    pub q: Vec<String>,
    pub source: String,
    pub target: String,
    pub format: String,
}

impl TranslateRequest {
    pub fn html(q: Vec<String>, source: &str, target: &str) -> Self {
        Self {
            q,
            source: source.to_string(),
            target: target.to_string(),
            format: "html".to_string(),
        }
    }
}

#[async_trait]
pub trait TranslationClient: Send + Sync {
    async fn translate(&self, request: TranslateRequest) -> Result<Vec<String>, TranslationError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    data: ApiData,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    translations: Vec<ApiTranslation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTranslation {
    translated_text: String,
}

/// Client for Google Translate v2 style endpoints.
#[derive(Debug, Clone)]
pub struct GoogleTranslateClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl GoogleTranslateClient {
    pub fn new(config: &TranslationConfig) -> Result<Self, TranslationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TranslationError::Failed(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl TranslationClient for GoogleTranslateClient {
    async fn translate(&self, request: TranslateRequest) -> Result<Vec<String>, TranslationError> {
        let mut call = self.http.post(&self.api_url).json(&request);
        if !self.api_key.is_empty() {
            call = call.query(&[("key", self.api_key.as_str())]);
        }

        let response = call
            .send()
            .await
            .map_err(|e| TranslationError::Failed(format!("request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::Failed(format!(
                "API answered {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::Failed(format!("invalid API response: {}", e)))?;
        let translations: Vec<String> = parsed
            .data
            .translations
            .into_iter()
            .map(|t| t.translated_text)
            .collect();

        if translations.len() != request.q.len() {
            return Err(TranslationError::Failed(format!(
                "API returned {} segments for {}",
                translations.len(),
                request.q.len()
            )));
        }
        Ok(translations)
    }
}
