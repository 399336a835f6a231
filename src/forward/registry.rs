use crate::forward::listener::Listener;
use crate::forward::rule::Rule;
use crate::metrics::Collector;
use crate::r#const::listener_limits;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 转发器
///
/// 维护规则名称到监听器的映射。互斥锁只保护映射本身的修改，
/// 监听器的接受循环在锁外的独立任务中运行。
pub struct Forwarder {
    // 规则名称 -> 监听器
    listeners: Mutex<HashMap<String, Arc<Listener>>>,
    // 指标收集器
    collector: Arc<dyn Collector>,
    // 绑定失败后的重试间隔
    retry_interval: Duration,
}

impl Forwarder {
    // 创建新的转发器
    pub fn new(collector: Arc<dyn Collector>) -> Self {
        Self::with_retry_interval(
            collector,
            Duration::from_secs(listener_limits::BIND_RETRY_INTERVAL),
        )
    }

    // 使用自定义重试间隔创建转发器
    pub fn with_retry_interval(collector: Arc<dyn Collector>, retry_interval: Duration) -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            collector,
            retry_interval,
        }
    }

    /// 启动一条规则
    ///
    /// 同名监听器存在时先停止它再注册新的监听器，新监听器会等待旧监听器
    /// 释放套接字后再绑定。绑定失败不会在这里返回，只体现在日志和重试中。
    /// 必须在 tokio 运行时内调用。
    pub fn start(&self, rule: Rule) -> Arc<Listener> {
        let listener = {
            let mut listeners = self.listeners.lock();

            let predecessor = listeners.remove(&rule.name);
            if let Some(predecessor) = &predecessor {
                info!("[{}] Replacing existing listener", rule.name);
                predecessor.stop();
            }

            info!("Starting forwarding rule {}", rule);
            let name = rule.name.clone();
            let listener = Arc::new(Listener::new(
                rule,
                self.collector.clone(),
                self.retry_interval,
                predecessor,
            ));
            listeners.insert(name, listener.clone());
            listener
        };

        tokio::spawn(listener.clone().run());

        listener
    }

    /// 停止指定名称的规则
    ///
    /// 已停止的监听器仍保留在映射中，直到被同名规则替换。
    pub fn stop(&self, name: &str) -> bool {
        let listeners = self.listeners.lock();
        match listeners.get(name) {
            Some(listener) => {
                listener.stop();
                true
            }
            None => false,
        }
    }

    /// 停止所有规则
    ///
    /// 不等待接受循环退出，也不等待正在转发的连接结束。
    pub fn stop_all(&self) {
        let listeners = self.listeners.lock();
        for listener in listeners.values() {
            listener.stop();
        }
        info!("Stop requested for {} listeners", listeners.len());
    }

    // 获取指定名称的监听器
    pub fn get(&self, name: &str) -> Option<Arc<Listener>> {
        self.listeners.lock().get(name).cloned()
    }

    // 所有已注册的规则名称（按名称排序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.listeners.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
