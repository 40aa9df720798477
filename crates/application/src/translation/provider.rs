use async_trait::async_trait;
use domain::{ProviderError, TranslationRequest};

/// 翻译服务商端口。
///
/// 实现方负责自己的请求格式和超时；错误分类（瞬时/永久）
/// 也由实现方给出，编排器只依据分类决定重试还是切换。
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// 服务商名称，用于结果记录和配额键。
    fn name(&self) -> &str;

    async fn translate(&self, request: &TranslationRequest) -> Result<String, ProviderError>;
}
