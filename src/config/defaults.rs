use crate::r#const::default_addresses;

// 指标服务默认监听地址
pub fn default_metrics_address() -> String {
    default_addresses::METRICS.to_string()
}

// 默认开启绑定失败重试
pub fn default_retry() -> bool {
    true
}
