use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// 语言代码，ISO-639-1 风格的小写短码。
///
/// `auto` 是特殊哨兵值，表示由翻译服务商自行检测源语言。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub const AUTO: &'static str = "auto";

    pub fn new(code: impl AsRef<str>) -> Result<Self, DomainError> {
        let normalized = code.as_ref().trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(DomainError::validation_error(
                "language",
                "language code must not be empty",
            ));
        }
        if normalized.len() > 8 {
            return Err(DomainError::validation_error(
                "language",
                "language code is too long",
            ));
        }
        Ok(Self(normalized))
    }

    pub fn auto() -> Self {
        Self(Self::AUTO.to_string())
    }

    /// 默认的用户偏好语言，偏好缺失时使用。
    pub fn default_preference() -> Self {
        Self("en".to_string())
    }

    pub fn is_auto(&self) -> bool {
        self.0 == Self::AUTO
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 对外暴露的语言选项（`/languages` 接口）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageOption {
    pub code: &'static str,
    pub name: &'static str,
    pub native_name: &'static str,
}

/// 支持的语言目录。
pub const SUPPORTED_LANGUAGES: &[LanguageOption] = &[
    LanguageOption { code: "en", name: "English", native_name: "English" },
    LanguageOption { code: "es", name: "Spanish", native_name: "Español" },
    LanguageOption { code: "fr", name: "French", native_name: "Français" },
    LanguageOption { code: "de", name: "German", native_name: "Deutsch" },
    LanguageOption { code: "it", name: "Italian", native_name: "Italiano" },
    LanguageOption { code: "pt", name: "Portuguese", native_name: "Português" },
    LanguageOption { code: "ru", name: "Russian", native_name: "Русский" },
    LanguageOption { code: "zh", name: "Chinese (Simplified)", native_name: "中文 (简体)" },
    LanguageOption { code: "ja", name: "Japanese", native_name: "日本語" },
    LanguageOption { code: "ko", name: "Korean", native_name: "한국어" },
    LanguageOption { code: "ar", name: "Arabic", native_name: "العربية" },
    LanguageOption { code: "hi", name: "Hindi", native_name: "हिन्दी" },
];
