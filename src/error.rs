use std::io;
use thiserror::Error;

/// 应用错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 地址解析错误
    #[error("Address resolution error: {0}")]
    Resolve(String),

    /// 监听绑定错误
    #[error("Bind error: {0}")]
    Bind(String),

    /// 指标注册错误
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}
