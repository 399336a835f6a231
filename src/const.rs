// 应用常量定义

//
// 配置参数限制常量
//

// 应用关闭等待时间限制
pub mod shutdown_timeout {
    // 默认值
    pub const DEFAULT: u64 = 30;
    // 最小值
    pub const MIN: u64 = 1;
    // 最大值
    pub const MAX: u64 = 120;
}

// 监听器配置
pub mod listener_limits {
    // 绑定失败后的重试间隔（秒）
    pub const BIND_RETRY_INTERVAL: u64 = 10;
    // accept 失败后的退避时间（毫秒）
    pub const ACCEPT_ERROR_BACKOFF_MS: u64 = 100;
    // 监听队列长度
    pub const BACKLOG: i32 = 1024;
}

// 转发配置
pub mod relay_limits {
    // 单向拷贝缓冲区大小（字节）
    pub const BUFFER_SIZE: usize = 16 * 1024;
}

// 默认地址
pub mod default_addresses {
    // 指标服务监听地址
    pub const METRICS: &str = "0.0.0.0:9090";
    // 本地地址缺省主机
    pub const LOCAL_HOST: &str = "0.0.0.0";
    // 远端地址缺省主机
    pub const REMOTE_HOST: &str = "127.0.0.1";
}

// 默认配置文件路径
pub const DEFAULT_CONFIG_FILE: &str = "conf/tcpfwd.yaml";

//
// 指标标签常量
//

// 传输方向标签
pub mod direction_labels {
    // 远端 -> 本地
    pub const IN: &str = "in";
    // 本地 -> 远端
    pub const OUT: &str = "out";
}
