//! 离线补发通道适配器

use async_trait::async_trait;
use tracing::info;

use application::{NotifyError, OfflineNotifier};
use domain::UserId;

/// 仅记录日志的离线补发通道。
///
/// 没有接入真正的推送网关时作为占位：记录目标用户后返回
/// `Ok(false)`，表示该用户没有注册任何投递端点。
#[derive(Debug, Default)]
pub struct LoggingOfflineNotifier;

#[async_trait]
impl OfflineNotifier for LoggingOfflineNotifier {
    async fn notify_offline(&self, user: &UserId, summary: &str) -> Result<bool, NotifyError> {
        info!(user_id = %user, summary, "offline notification requested, no push endpoint configured");
        Ok(false)
    }
}
