use application::TranslationProvider;
use async_trait::async_trait;
use domain::{ProviderError, TranslationRequest};
use serde::{Deserialize, Serialize};

use super::{build_client, classify_status, classify_transport, ProviderSettings};

/// LibreTranslate 翻译服务商（自建或公共实例）。
///
/// 作为 MyMemory 之后的兜底服务商；公共实例可能要求 API 密钥。
pub struct LibreTranslateProvider {
    client: reqwest::Client,
    settings: ProviderSettings,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct TranslateBody<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
}

impl LibreTranslateProvider {
    pub const NAME: &'static str = "libretranslate";

    pub fn new(settings: ProviderSettings, api_key: Option<String>) -> Result<Self, ProviderError> {
        let client = build_client(settings.timeout)?;
        Ok(Self { client, settings, api_key })
    }
}

#[async_trait]
impl TranslationProvider for LibreTranslateProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<String, ProviderError> {
        let body = TranslateBody {
            q: &request.text,
            source: request.source.as_str(),
            target: request.target.as_str(),
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/translate", self.settings.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(Self::NAME, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport(Self::NAME, e))?;

        if !status.is_success() {
            return Err(classify_status(Self::NAME, status, &text));
        }

        let parsed: TranslateResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::transient(format!("{}: malformed response: {e}", Self::NAME))
        })?;

        parsed
            .translated_text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::transient(format!("{}: empty translation in response", Self::NAME))
            })
    }
}
