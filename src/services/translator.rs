//! Machine translation client (DeepL-compatible `POST /v2/translate`)

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::TranslationApiSettings;
use crate::error::ApiError;

#[derive(Clone)]
pub struct TranslatorClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a [&'a str],
    source_lang: String,
    target_lang: String,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
struct Translation {
    text: String,
}

/// Language code in the form the API expects (`pt-br` -> `PT-BR`)
fn api_lang(locale: &str) -> String {
    locale.trim().to_uppercase()
}

/// Base language only; source languages carry no region
fn api_source_lang(locale: &str) -> String {
    api_lang(locale.split(['-', '_']).next().unwrap_or(locale))
}

impl TranslatorClient {
    pub fn new(client: Client, settings: &TranslationApiSettings) -> Self {
        let base = settings.url.trim_end_matches('/');
        let endpoint = if base.ends_with("/v2/translate") {
            base.to_string()
        } else {
            format!("{base}/v2/translate")
        };

        tracing::info!(endpoint = %endpoint, "Translation client initialized");

        Self {
            client,
            endpoint,
            api_key: settings.api_key.clone(),
        }
    }

    /// Translate `texts` in one call; output order matches input order
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn translate(&self, texts: &[&str], source: &str, target: &str) -> Result<Vec<String>, ApiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = TranslateRequest {
            text: texts,
            source_lang: api_source_lang(source),
            target_lang: api_lang(target),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Translation request failed");
                if e.is_timeout() {
                    ApiError::Timeout("Translation service timed out".into())
                } else {
                    ApiError::BadGateway("Translation service unavailable".into())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return match status {
                StatusCode::BAD_REQUEST => Err(ApiError::BadRequest(format!(
                    "Translation service rejected the request: {message}"
                ))),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    error!("Translation service authentication failed");
                    Err(ApiError::BadGateway("Translation service auth error".into()))
                }
                _ => {
                    error!(status = %status, message = %message, "Translation service error");
                    Err(ApiError::BadGateway(format!("Translation service error: {status}")))
                }
            };
        }

        let parsed: TranslateResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse translation response");
            ApiError::BadGateway("Invalid translation service response".into())
        })?;

        if parsed.translations.len() != texts.len() {
            return Err(ApiError::BadGateway(format!(
                "Translation service returned {} texts for {}",
                parsed.translations.len(),
                texts.len()
            )));
        }

        debug!(count = texts.len(), "Translated texts");
        Ok(parsed.translations.into_iter().map(|t| t.text).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_codes() {
        assert_eq!(api_lang("de"), "DE");
        assert_eq!(api_lang("pt-br"), "PT-BR");
        assert_eq!(api_source_lang("pt-br"), "PT");
        assert_eq!(api_source_lang("en_GB"), "EN");
    }

    #[test]
    fn endpoint_is_built_once() {
        let client = TranslatorClient::new(
            Client::new(),
            &TranslationApiSettings {
                url: "https://api-free.deepl.com/".into(),
                api_key: "k".into(),
            },
        );
        assert_eq!(client.endpoint, "https://api-free.deepl.com/v2/translate");

        let client = TranslatorClient::new(
            Client::new(),
            &TranslationApiSettings {
                url: "https://mt.internal/v2/translate".into(),
                api_key: "k".into(),
            },
        );
        assert_eq!(client.endpoint, "https://mt.internal/v2/translate");
    }
}
