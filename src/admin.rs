use crate::error::AppError;
use crate::metrics::Metrics;
use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemHandle};
use tracing::{error, info};

// 管理服务
pub struct AdminServer {
    // 监听地址
    addr: SocketAddr,
    // 指标
    metrics: Arc<Metrics>,
}

impl AdminServer {
    // 创建新的管理服务
    pub fn new(addr: SocketAddr, metrics: Arc<Metrics>) -> Self {
        Self { addr, metrics }
    }
}

/// 创建管理服务路由
pub fn admin_router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found_handler)
        .with_state(metrics)
}

#[async_trait]
impl IntoSubsystem<AppError> for AdminServer {
    async fn run(self, subsys: SubsystemHandle) -> Result<(), AppError> {
        let app = admin_router(self.metrics.clone());

        // 绑定失败只记录日志，不影响转发服务
        let listener = match TcpListener::bind(self.addr).await {
            Ok(listener) => {
                info!("Admin service listening on {}", self.addr);
                listener
            }
            Err(e) => {
                error!("Failed to listen on management port {}: {}", self.addr, e);
                return Ok(());
            }
        };

        // 使用tokio::select!监听服务器和关闭信号
        tokio::select! {
            result = axum::serve(listener, app) => {
                if let Err(e) = result {
                    error!("Admin service error: {}", e);
                } else {
                    info!("Admin service completed normally");
                }
                Ok(())
            }
            _ = subsys.on_shutdown_requested() => {
                info!("Shutdown requested, stopping admin service");
                Ok(())
            }
        }
    }
}

// 健康检查处理程序
async fn health_handler() -> &'static str {
    "OK"
}

// 未知路径
async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}

// 指标处理函数
async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> Response {
    // 创建编码器
    let encoder = TextEncoder::new();

    // 收集指标
    let metric_families = metrics.registry().gather();

    // 编码指标
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    // 返回指标
    match String::from_utf8(buffer) {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Metrics UTF-8 conversion failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
