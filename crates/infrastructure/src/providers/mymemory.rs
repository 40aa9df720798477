use application::TranslationProvider;
use async_trait::async_trait;
use domain::{ProviderError, TranslationRequest};
use serde::Deserialize;

use super::{build_client, classify_status, classify_transport, ProviderSettings};

/// MyMemory 翻译服务商（https://api.mymemory.translated.net）。
///
/// 免费、低延迟，作为优先级最高的服务商使用。
pub struct MyMemoryProvider {
    client: reqwest::Client,
    settings: ProviderSettings,
}

#[derive(Debug, Deserialize)]
struct MyMemoryResponse {
    #[serde(rename = "responseData")]
    response_data: Option<MyMemoryData>,
    #[serde(rename = "responseStatus")]
    response_status: serde_json::Value,
    #[serde(rename = "responseDetails", default)]
    response_details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MyMemoryData {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
}

impl MyMemoryProvider {
    pub const NAME: &'static str = "mymemory";

    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        let client = build_client(settings.timeout)?;
        Ok(Self { client, settings })
    }

    /// API 要求 langpair 形如 `en|es`；源语言为 auto 时交给服务端识别。
    fn langpair(request: &TranslationRequest) -> String {
        let source = if request.source.is_auto() {
            "Autodetect"
        } else {
            request.source.as_str()
        };
        format!("{source}|{}", request.target)
    }

    /// responseStatus 字段有时是数字有时是字符串。
    fn status_code(value: &serde_json::Value) -> Option<u16> {
        value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
            .map(|code| code as u16)
    }
}

#[async_trait]
impl TranslationProvider for MyMemoryProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(format!("{}/get", self.settings.base_url))
            .query(&[
                ("q", request.text.as_str()),
                ("langpair", &Self::langpair(request)),
            ])
            .send()
            .await
            .map_err(|e| classify_transport(Self::NAME, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(Self::NAME, e))?;

        if !status.is_success() {
            return Err(classify_status(Self::NAME, status, &body));
        }

        let parsed: MyMemoryResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::transient(format!("{}: malformed response: {e}", Self::NAME))
        })?;

        // 服务端把业务错误放在 200 响应体里
        match Self::status_code(&parsed.response_status) {
            Some(200) => {}
            Some(429) => {
                return Err(ProviderError::transient(format!(
                    "{}: quota exceeded: {:?}",
                    Self::NAME,
                    parsed.response_details
                )));
            }
            other => {
                return Err(ProviderError::permanent(format!(
                    "{}: response status {:?}: {:?}",
                    Self::NAME,
                    other,
                    parsed.response_details
                )));
            }
        }

        parsed
            .response_data
            .and_then(|data| data.translated_text)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::transient(format!("{}: empty translation in response", Self::NAME))
            })
    }
}
