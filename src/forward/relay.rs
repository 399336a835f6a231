use crate::forward::utils::normalize_addr;
use crate::metrics::{Collector, Direction};
use crate::r#const::{default_addresses, relay_limits};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info};

// 单个连接转发所需的上下文，由监听器为每个连接克隆一份
#[derive(Clone)]
pub struct RelayContext {
    // 规则名称
    pub rule: Arc<str>,
    // 远端地址
    pub remote: Arc<str>,
    // 指标收集器
    pub collector: Arc<dyn Collector>,
}

impl RelayContext {
    pub fn new(rule: &str, remote: &str, collector: Arc<dyn Collector>) -> Self {
        Self {
            rule: Arc::from(rule),
            remote: Arc::from(remote),
            collector,
        }
    }
}

/// 单个连接的转发结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    // 规则名称
    pub rule: Arc<str>,
    // 来源地址
    pub source: SocketAddr,
    // 是否成功连接远端
    pub dialed: bool,
    // 持续时间
    pub duration: Duration,
    // 远端 -> 本地字节数
    pub bytes_in: u64,
    // 本地 -> 远端字节数
    pub bytes_out: u64,
}

/// 转发一个已接受的入站连接
///
/// 连接远端地址后启动两个独立的拷贝任务，两个方向都结束后才汇报结果。
/// 远端连接失败时关闭入站连接，按零字节的已结束连接计入。
pub async fn relay(ctx: RelayContext, inbound: TcpStream, source: SocketAddr) -> RelayReport {
    let started = Instant::now();

    let remote = normalize_addr(&ctx.remote, default_addresses::REMOTE_HOST);
    let outbound = match TcpStream::connect(&*remote).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("[{}] Failed to dial remote {}: {}", ctx.rule, ctx.remote, e);
            drop(inbound);
            ctx.collector.bytes_transferred(&ctx.rule, Direction::In, 0);
            ctx.collector.bytes_transferred(&ctx.rule, Direction::Out, 0);
            return finish(&ctx, source, started, false, 0, 0);
        }
    };

    ctx.collector.connection_established(&ctx.rule);
    debug!(
        "[{}] Connection from {} dialed remote {}",
        ctx.rule, source, ctx.remote
    );

    let bytes_in = Arc::new(AtomicU64::new(0));
    let bytes_out = Arc::new(AtomicU64::new(0));

    // 任一方向出错时通知另一方向立即结束
    let (abort_tx, abort_rx) = watch::channel(false);
    let abort_tx = Arc::new(abort_tx);

    let (inbound_read, inbound_write) = inbound.into_split();
    let (outbound_read, outbound_write) = outbound.into_split();

    let upload = tokio::spawn(copy_direction(
        ctx.clone(),
        Direction::Out,
        inbound_read,
        outbound_write,
        bytes_out.clone(),
        abort_tx.clone(),
        abort_rx.clone(),
    ));
    let download = tokio::spawn(copy_direction(
        ctx.clone(),
        Direction::In,
        outbound_read,
        inbound_write,
        bytes_in.clone(),
        abort_tx,
        abort_rx,
    ));

    // 等待两个方向都结束
    let (upload, download) = tokio::join!(upload, download);
    for joined in [upload, download] {
        if let Err(e) = joined {
            error!("[{}] Relay task from {} failed: {}", ctx.rule, source, e);
        }
    }

    finish(
        &ctx,
        source,
        started,
        true,
        bytes_in.load(Ordering::Acquire),
        bytes_out.load(Ordering::Acquire),
    )
}

fn finish(
    ctx: &RelayContext,
    source: SocketAddr,
    started: Instant,
    dialed: bool,
    bytes_in: u64,
    bytes_out: u64,
) -> RelayReport {
    let duration = started.elapsed();

    info!(
        "[{}] Connection from {} finished after {}ms (in: {}, out: {})",
        ctx.rule,
        source,
        duration.as_millis(),
        bytes_in,
        bytes_out
    );

    RelayReport {
        rule: ctx.rule.clone(),
        source,
        dialed,
        duration,
        bytes_in,
        bytes_out,
    }
}

// 单向拷贝任务，结束后上报该方向的字节数
async fn copy_direction<R, W>(
    ctx: RelayContext,
    direction: Direction,
    reader: R,
    writer: W,
    counter: Arc<AtomicU64>,
    abort_tx: Arc<watch::Sender<bool>>,
    abort_rx: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Err(e) = pipe(reader, writer, &counter, abort_rx).await {
        // 出错等同于 EOF，但要让另一方向也结束以释放两端连接
        debug!(
            "[{}] Relay direction {} ended with error: {}",
            ctx.rule,
            direction.as_str(),
            e
        );
        abort_tx.send_replace(true);
    }

    ctx.collector
        .bytes_transferred(&ctx.rule, direction, counter.load(Ordering::Acquire));
}

/// 从 reader 拷贝到 writer，直到 EOF、出错或收到中止信号
///
/// 正常 EOF 时关闭 writer 的写方向，把半关闭传递给对端。
async fn pipe<R, W>(
    mut reader: R,
    mut writer: W,
    counter: &AtomicU64,
    mut abort_rx: watch::Receiver<bool>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; relay_limits::BUFFER_SIZE];

    loop {
        let n = tokio::select! {
            read = reader.read(&mut buf) => read?,
            _ = abort_rx.changed() => return Ok(()),
        };

        if n == 0 {
            break;
        }

        tokio::select! {
            written = writer.write_all(&buf[..n]) => written?,
            _ = abort_rx.changed() => return Ok(()),
        }

        counter.fetch_add(n as u64, Ordering::AcqRel);
    }

    writer.shutdown().await
}
