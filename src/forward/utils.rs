use crate::error::AppError;
use socket2::{Domain, Protocol, Socket, Type};
use std::borrow::Cow;
use std::net::SocketAddr;
use tokio::net::{lookup_host, TcpListener};

/// 补全缺省主机的地址
///
/// ":8080" 这类只有端口的地址会被补全为 `default_host:8080`。
pub fn normalize_addr<'a>(addr: &'a str, default_host: &str) -> Cow<'a, str> {
    if addr.starts_with(':') {
        Cow::Owned(format!("{}{}", default_host, addr))
    } else {
        Cow::Borrowed(addr)
    }
}

/// 将 host:port 解析为第一个可用的 TCP 地址
pub async fn resolve_addr(addr: &str) -> Result<SocketAddr, AppError> {
    let mut addrs = lookup_host(addr)
        .await
        .map_err(|e| AppError::Resolve(format!("{}: {}", addr, e)))?;

    addrs
        .next()
        .ok_or_else(|| AppError::Resolve(format!("{}: no addresses found", addr)))
}

/// 创建 TCP 监听器
/// 根据提供的地址和监听队列大小创建一个非阻塞的 TCP 监听器。
pub fn create_tcp_listener(addr: SocketAddr, backlog: i32) -> Result<TcpListener, AppError> {
    let bind_error = |e: std::io::Error| AppError::Bind(format!("{}: {}", addr, e));

    // 根据地址类型确定域
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    // 创建 socket
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(bind_error)?;

    // 设置 SO_REUSEADDR 选项，不设置 SO_REUSEPORT，端口被占用时必须绑定失败
    #[cfg(unix)]
    socket.set_reuse_address(true).map_err(bind_error)?;

    // 绑定到地址
    socket.bind(&addr.into()).map_err(bind_error)?;

    // 开始监听
    socket.listen(backlog).map_err(bind_error)?;

    // 设置为非阻塞模式
    socket.set_nonblocking(true).map_err(bind_error)?;

    // 将 socket2::Socket 转换为 std::net::TcpListener
    let std_listener: std::net::TcpListener = socket.into();

    // 将 std::net::TcpListener 转换为 tokio::net::TcpListener
    TcpListener::from_std(std_listener).map_err(AppError::Io)
}
