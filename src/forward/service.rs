use crate::error::AppError;
use crate::forward::registry::Forwarder;
use crate::forward::rule::Rule;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemHandle};
use tracing::info;

// 转发服务，启动所有规则并在关闭时停止它们
pub struct ForwardService {
    // 转发器
    forwarder: Arc<Forwarder>,
    // 启动时加载的规则
    rules: Vec<Rule>,
}

impl ForwardService {
    // 创建新的转发服务
    pub fn new(forwarder: Arc<Forwarder>, rules: Vec<Rule>) -> Self {
        Self { forwarder, rules }
    }
}

#[async_trait]
impl IntoSubsystem<AppError> for ForwardService {
    async fn run(self, subsys: SubsystemHandle) -> Result<(), AppError> {
        for rule in self.rules {
            self.forwarder.start(rule);
        }
        info!("Started all listeners");

        subsys.on_shutdown_requested().await;

        info!("Shutdown requested, stopping all listeners");
        self.forwarder.stop_all();

        Ok(())
    }
}
