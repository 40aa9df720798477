//! 进程内推送适配器

use async_trait::async_trait;

use application::{ConnectionHandle, ConnectionPush, PushError};
use domain::ServerEvent;

/// 通过连接句柄上的无界通道投递事件。
///
/// 对端的写出任务持有接收端并负责序列化成 WebSocket 帧；
/// 通道已关闭说明连接正在拆除，视为投递失败交给扇出清点。
#[derive(Debug, Default)]
pub struct ChannelConnectionPush;

#[async_trait]
impl ConnectionPush for ChannelConnectionPush {
    async fn push(&self, handle: &ConnectionHandle, event: ServerEvent) -> Result<(), PushError> {
        handle.send(event).map_err(|_| {
            PushError::failed(format!("connection {} channel closed", handle.connection_id()))
        })
    }
}
