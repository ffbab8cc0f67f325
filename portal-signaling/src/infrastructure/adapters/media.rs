use async_trait::async_trait;
use tracing::info;

use portal_core::Result;

use crate::domain::repository::MediaProvider;

/// 只记录日志的媒体提供方，真实的音视频采集由宿主注入
#[derive(Debug, Default)]
pub struct LoggingMediaProvider;

#[async_trait]
impl MediaProvider for LoggingMediaProvider {
    async fn start_local_stream(&self) -> Result<()> {
        info!("media: start local stream");
        Ok(())
    }

    async fn start_remote_stream(&self, remote_label: &str) -> Result<()> {
        info!(remote = %remote_label, "media: start remote stream");
        Ok(())
    }

    async fn stop_all(&self) -> Result<()> {
        info!("media: stop all streams");
        Ok(())
    }
}
