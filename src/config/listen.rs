use crate::config::defaults::default_retry;
use crate::config::validation;
use serde::{Deserialize, Serialize};
use validator::Validate;

// 转发规则配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "lowercase")]
pub struct ListenConfig {
    // 本地监听地址 (host:port)
    #[validate(
        length(min = 1, message = "Local address cannot be empty"),
        custom(function = "validation::validate_host_port")
    )]
    pub local: String,
    // 远端地址 (host:port)
    #[validate(
        length(min = 1, message = "Remote address cannot be empty"),
        custom(function = "validation::validate_host_port")
    )]
    pub remote: String,
    // 绑定失败时是否自动重试
    #[serde(default = "default_retry")]
    pub retry: bool,
}

impl ListenConfig {
    pub fn new(local: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
            retry: default_retry(),
        }
    }
}
