// 导出子模块
pub mod defaults;
pub mod listen;
pub mod serializer;
pub mod validation;

// 重新导出常用类型
pub use self::listen::ListenConfig;

use crate::config::defaults::default_metrics_address;
use crate::error::AppError;
use crate::forward::Rule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

// 配置文件结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    // 指标服务监听地址
    #[serde(default = "default_metrics_address")]
    pub metrics: String,
    // 转发规则，按名称索引
    #[serde(default, deserialize_with = "serializer::null_as_default::deserialize")]
    pub listen: BTreeMap<String, ListenConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metrics: default_metrics_address(),
            listen: BTreeMap::new(),
        }
    }
}

impl Config {
    // 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        debug!("Attempting to load configuration from file: {:?}", path);

        // 打开并读取文件
        let mut file = File::open(path).map_err(|e| {
            AppError::Config(format!(
                "Unable to open configuration file {:?}: {}",
                path, e
            ))
        })?;

        let mut content = String::new();
        file.read_to_string(&mut content).map_err(|e| {
            AppError::Config(format!(
                "Unable to read configuration file {:?}: {}",
                path, e
            ))
        })?;

        let config = Self::from_yaml(&content)?;

        Ok(config)
    }

    // 从 YAML 文本解析配置
    pub fn from_yaml(content: &str) -> Result<Self, AppError> {
        // 空文件等同于没有任何规则
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        // 解析YAML
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| AppError::Config(format!("Configuration file parsing error: {}", e)))?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 加载配置，失败时回退到空规则集
    ///
    /// 配置文件缺失或无法解析都不会阻止服务启动。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::from_file(path) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", path);
                config
            }
            Err(e) => {
                warn!("Loading default configuration, due to error: {}", e);
                Self::default()
            }
        }
    }

    // 将配置中的规则转换为转发规则列表（按名称排序）
    pub fn rules(&self) -> Vec<Rule> {
        self.listen
            .iter()
            .map(|(name, listen)| Rule {
                name: name.clone(),
                local: listen.local.clone(),
                remote: listen.remote.clone(),
                retry: listen.retry,
            })
            .collect()
    }
}
