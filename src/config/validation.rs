use crate::error::AppError;
use tracing::debug;
use validator::{Validate, ValidationError};

use super::Config;

impl Config {
    // 验证配置
    pub fn validate(&self) -> Result<(), AppError> {
        // 验证指标服务地址，主机部分允许为空或为主机名
        validate_host_port(&self.metrics).map_err(|e| {
            AppError::Config(format!("Metrics address '{}' is invalid: {}", self.metrics, e))
        })?;

        for (name, listen) in &self.listen {
            // 规则名称不能为空
            if name.trim().is_empty() {
                return Err(AppError::Config(
                    "Forwarding rule name cannot be empty".to_string(),
                ));
            }

            // 验证规则字段
            listen.validate().map_err(|e| {
                AppError::Config(format!("Forwarding rule '{}' is invalid: {}", name, e))
            })?;

            debug!(
                "Forwarding rule '{}' validated: {} -> {} (retry: {})",
                name, listen.local, listen.remote, listen.retry
            );
        }

        Ok(())
    }
}

/// 校验 host:port 形式的地址
///
/// 主机部分允许为空（例如 ":8080"），端口必须是合法的数字。
pub fn validate_host_port(addr: &str) -> Result<(), ValidationError> {
    let Some((host, port)) = addr.rsplit_once(':') else {
        let mut err = ValidationError::new("port_missing");
        err.message = Some(format!("Address '{}' is missing a port", addr).into());
        return Err(err);
    };

    if port.parse::<u16>().is_err() {
        let mut err = ValidationError::new("port_invalid");
        err.message = Some(format!("Address '{}' has an invalid port", addr).into());
        return Err(err);
    }

    // IPv6 地址必须使用方括号
    if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
        let mut err = ValidationError::new("host_invalid");
        err.message = Some(format!("IPv6 address '{}' must be enclosed in brackets", addr).into());
        return Err(err);
    }

    Ok(())
}
