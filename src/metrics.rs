use crate::error::AppError;
use crate::r#const::direction_labels;
use prometheus::{CounterVec, Opts, Registry};

/// 传输方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// 远端 -> 本地
    In,
    /// 本地 -> 远端
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => direction_labels::IN,
            Direction::Out => direction_labels::OUT,
        }
    }
}

/// 观测接口
///
/// 由进程创建并注入到转发器中，转发核心只通过这两个操作上报数据。
/// 实现必须允许任意多个连接并发调用。
pub trait Collector: Send + Sync {
    /// 远端连接建立成功
    fn connection_established(&self, rule: &str);

    /// 单个方向拷贝结束后累加传输字节数
    fn bytes_transferred(&self, rule: &str, direction: Direction, bytes: u64);
}

/// 应用指标
pub struct Metrics {
    registry: Registry,
    // 连接计数
    connections_total: CounterVec,
    // 传输字节计数
    bytes_total: CounterVec,
}

impl Metrics {
    /// 创建新的指标收集器
    pub fn new() -> Result<Self, AppError> {
        let registry = Registry::new();

        // 连接计数
        let connections_total = CounterVec::new(
            Opts::new(
                "tcp_connections_total",
                "Number of TCP Connections established",
            ),
            &["name"],
        )?;

        // 传输字节计数
        let bytes_total = CounterVec::new(
            Opts::new("tcp_bytes_total", "Number of bytes transfered"),
            &["name", "direction"],
        )?;

        // 注册指标
        registry.register(Box::new(connections_total.clone()))?;
        registry.register(Box::new(bytes_total.clone()))?;

        Ok(Self {
            registry,
            connections_total,
            bytes_total,
        })
    }

    /// 获取注册表
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 连接计数
    pub fn connections_total(&self) -> &CounterVec {
        &self.connections_total
    }

    /// 传输字节计数
    pub fn bytes_total(&self) -> &CounterVec {
        &self.bytes_total
    }
}

impl Collector for Metrics {
    fn connection_established(&self, rule: &str) {
        self.connections_total.with_label_values(&[rule]).inc();
    }

    fn bytes_transferred(&self, rule: &str, direction: Direction, bytes: u64) {
        self.bytes_total
            .with_label_values(&[rule, direction.as_str()])
            .inc_by(bytes as f64);
    }
}
