use crate::r#const::{shutdown_timeout, DEFAULT_CONFIG_FILE};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

// tcpfwd - TCP 端口转发服务
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tcpfwdd",
    author,
    version,
    about = "A TCP port forwarder that relays local listeners to remote addresses.\n\n\
             Key Features:\n\
             - Named Rules: Multiple, independently named forwarding rules running concurrently.\n\
             - Automatic Re-binding: Listeners retry binding until their local address becomes available.\n\
             - Transparent Relay: Raw TCP byte streams are passed through unchanged in both directions.\n\
             - Observability: Prometheus counters for connections and bytes per rule and direction."
)]
pub struct Args {
    // 配置文件路径
    #[clap(
        short,
        long,
        value_name = "FILE",
        default_value = DEFAULT_CONFIG_FILE,
        help = "Path to the configuration file"
    )]
    pub config: PathBuf,

    // 是否开启调试模式
    #[clap(
        short,
        long,
        action = ArgAction::SetTrue,
        help = "Enable debug mode"
    )]
    pub debug: bool,

    // 是否仅测试配置文件
    #[clap(
        short = 't',
        long = "test",
        action = ArgAction::SetTrue,
        help = "Test configuration file for validity and exit"
    )]
    pub test_config: bool,

    // 优雅关闭超时时间（秒）
    #[clap(
        long = "shutdown-timeout",
        value_name = "SECONDS",
        default_value_t = shutdown_timeout::DEFAULT,
        help = "Maximum time in seconds to wait for complete shutdown"
    )]
    pub shutdown_timeout: u64,
}

impl Args {
    // 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    // 验证参数
    pub fn validation(&self) -> Result<(), String> {
        // 验证关闭超时时间
        if self.shutdown_timeout < shutdown_timeout::MIN
            || self.shutdown_timeout > shutdown_timeout::MAX
        {
            return Err(format!(
                "Shutdown timeout must be between {} and {} seconds",
                shutdown_timeout::MIN,
                shutdown_timeout::MAX
            ));
        }

        Ok(())
    }
}
