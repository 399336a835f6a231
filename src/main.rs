use mimalloc::MiMalloc;
use std::{process, sync::Arc};
use tcpfwd::{
    admin::AdminServer,
    args::Args,
    config::Config,
    error::AppError,
    forward::{normalize_addr, resolve_addr, ForwardService, Forwarder},
    metrics::Metrics,
    r#const::default_addresses,
};
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemBuilder, SubsystemHandle, Toplevel};
use tracing::{error, info};

// 使用 mimalloc 分配器提高内存效率
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_logging(args: &Args) {
    let builder = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_line_number(false);

    // 如果启用调试模式，输出调试信息，否则只输出 info 及以上级别
    if args.debug {
        builder.with_max_level(tracing::Level::DEBUG)
    } else {
        builder.with_max_level(tracing::Level::INFO)
    }
    .init();
}

// 程序入口
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 解析命令行参数
    let args = Args::parse_args();

    // 初始化日志
    init_logging(&args);

    // 验证参数
    if let Err(e) = args.validation() {
        error!("Invalid command line arguments: {}", e);
        process::exit(1);
    }

    // 如果是测试模式，严格校验配置文件后退出
    if args.test_config {
        match Config::from_file(&args.config) {
            Ok(config) => {
                info!(
                    "Configuration file validated successfully ({} rules)",
                    config.listen.len()
                );
                return Ok(());
            }
            Err(e) => {
                error!("Invalid configuration file: {}", e);
                process::exit(1);
            }
        }
    }

    info!("Starting tcpfwd - TCP Port Forwarder");

    // 加载配置，失败时使用空规则集
    let config = Config::load_or_default(&args.config);

    // 创建应用组件
    let components = match create_components(config).await {
        Ok(components) => components,
        Err(e) => {
            error!("Failed to create application components: {}", e);
            process::exit(1);
        }
    };

    // 创建优雅关闭顶层管理器
    let toplevel = Toplevel::new(|s: SubsystemHandle| async move {
        // 启动管理服务子系统
        if let Some(admin_server) = components.admin_server {
            s.start(SubsystemBuilder::new(
                "admin_server",
                admin_server.into_subsystem(),
            ));
        }

        // 启动转发服务子系统
        s.start(SubsystemBuilder::new(
            "forward_service",
            components.forward_service.into_subsystem(),
        ));
    });

    // 等待关闭
    info!("All services started, waiting for connections...");
    match toplevel
        .catch_signals()
        .handle_shutdown_requests(tokio::time::Duration::from_secs(args.shutdown_timeout))
        .await
    {
        Ok(_) => {
            info!("Exiting due to signal");
            Ok(())
        }
        Err(e) => {
            error!("Application shutdown error: {}", e);
            process::exit(1);
        }
    }
}

// 应用组件
struct AppComponents {
    // 管理服务
    admin_server: Option<AdminServer>,
    // 转发服务
    forward_service: ForwardService,
}

// 创建应用组件
async fn create_components(config: Config) -> Result<AppComponents, AppError> {
    // 创建指标收集器，由管理服务和转发器共享
    let metrics = Arc::new(Metrics::new()?);

    // 创建转发器
    let forwarder = Arc::new(Forwarder::new(metrics.clone()));
    let rules = config.rules();
    info!("Loaded {} forwarding rules", rules.len());
    let forward_service = ForwardService::new(forwarder, rules);

    // 创建管理服务，地址允许 ":9090" 形式和主机名；解析失败时只转发不暴露指标
    let admin_addr = normalize_addr(&config.metrics, default_addresses::LOCAL_HOST);
    let admin_server = match resolve_addr(&admin_addr).await {
        Ok(addr) => {
            info!("Admin server initialized successfully: {:?}", addr);
            Some(AdminServer::new(addr, metrics))
        }
        Err(e) => {
            error!("Admin server disabled: {}", e);
            None
        }
    };

    Ok(AppComponents {
        admin_server,
        forward_service,
    })
}
