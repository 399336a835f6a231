use crate::error::AppError;
use crate::forward::relay::{relay, RelayContext};
use crate::forward::rule::Rule;
use crate::forward::utils::{create_tcp_listener, normalize_addr, resolve_addr};
use crate::metrics::Collector;
use crate::r#const::{default_addresses, listener_limits};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// 监听器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    // 已创建，尚未开始绑定
    Created,
    // 正在解析并绑定本地地址
    Binding,
    // 绑定失败，等待重试
    BindFailed,
    // 已绑定，正在接受连接
    Bound(SocketAddr),
    // 绑定失败且不再重试
    BindFailedPermanent,
    // 已停止
    Stopped,
}

impl ListenerState {
    // 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ListenerState::Stopped | ListenerState::BindFailedPermanent
        )
    }
}

/// 监听器
///
/// 持有一条规则的本地监听套接字，为每个接受的连接启动一个转发任务。
pub struct Listener {
    // 转发规则
    rule: Rule,
    // 连接转发上下文
    relay_ctx: RelayContext,
    // 绑定失败后的重试间隔
    retry_interval: Duration,
    // 停止信号
    stop_tx: watch::Sender<bool>,
    // 当前状态
    state_tx: watch::Sender<ListenerState>,
    // 绑定尝试次数
    bind_attempts: AtomicU64,
    // 被本监听器替换的同名旧监听器
    predecessor: Mutex<Option<Arc<Listener>>>,
}

impl Listener {
    // 创建新的监听器
    pub fn new(
        rule: Rule,
        collector: Arc<dyn Collector>,
        retry_interval: Duration,
        predecessor: Option<Arc<Listener>>,
    ) -> Self {
        let relay_ctx = RelayContext::new(&rule.name, &rule.remote, collector);
        let (stop_tx, _) = watch::channel(false);
        let (state_tx, _) = watch::channel(ListenerState::Created);

        Self {
            rule,
            relay_ctx,
            retry_interval,
            stop_tx,
            state_tx,
            bind_attempts: AtomicU64::new(0),
            predecessor: Mutex::new(predecessor),
        }
    }

    pub fn name(&self) -> &str {
        &self.rule.name
    }

    // 当前状态
    pub fn state(&self) -> ListenerState {
        *self.state_tx.borrow()
    }

    // 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.state_tx.subscribe()
    }

    // 已进行的绑定尝试次数
    pub fn bind_attempts(&self) -> u64 {
        self.bind_attempts.load(Ordering::Acquire)
    }

    // 是否已收到停止信号
    pub fn is_stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// 请求停止监听器
    ///
    /// 可以在任意线程重复调用，只有第一次生效。不等待监听循环退出，
    /// 也不影响已经在转发中的连接。
    pub fn stop(&self) {
        let first = self.stop_tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        });

        if first {
            debug!("[{}] Stop requested", self.rule.name);
        }
    }

    /// 等待监听器进入终止状态
    pub async fn wait_terminated(&self) {
        self.wait_state(ListenerState::is_terminal).await;
    }

    /// 等待监听器绑定成功，返回实际绑定的地址
    ///
    /// 如果监听器在绑定成功前终止，返回 None。
    pub async fn wait_bound(&self) -> Option<SocketAddr> {
        match self
            .wait_state(|s| matches!(s, ListenerState::Bound(_)) || s.is_terminal())
            .await
        {
            ListenerState::Bound(addr) => Some(addr),
            _ => None,
        }
    }

    async fn wait_state<F>(&self, predicate: F) -> ListenerState
    where
        F: Fn(&ListenerState) -> bool,
    {
        let mut rx = self.state_tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if predicate(&state) {
                return state;
            }
            if rx.changed().await.is_err() {
                return state;
            }
        }
    }

    /// 运行监听器
    ///
    /// 绑定本地地址并进入接受循环；绑定失败时按规则决定是否等待重试。
    /// 收到停止信号或接受循环退出后返回。
    pub async fn run(self: Arc<Self>) {
        let mut stop_rx = self.stop_tx.subscribe();

        // 先等待同名旧监听器释放套接字，已被停止时也要等完，
        // 本监听器只有在旧套接字关闭后才能进入终止状态
        let predecessor = self.predecessor.lock().take();
        if let Some(predecessor) = predecessor {
            predecessor.wait_terminated().await;
        }

        let mut first_try = true;
        loop {
            if *stop_rx.borrow_and_update() {
                self.set_state(ListenerState::Stopped);
                return;
            }

            self.set_state(ListenerState::Binding);
            self.bind_attempts.fetch_add(1, Ordering::AcqRel);

            match self.bind(first_try).await {
                Ok(socket) => {
                    self.accept_loop(socket, &mut stop_rx).await;
                    self.set_state(ListenerState::Stopped);
                    info!("[{}] Listener on {} stopped", self.rule.name, self.rule.local);
                    return;
                }
                Err(_) if self.rule.retry => {
                    self.set_state(ListenerState::BindFailed);
                    first_try = false;

                    tokio::select! {
                        _ = sleep(self.retry_interval) => {}
                        _ = wait_stopped(&mut stop_rx) => {
                            self.set_state(ListenerState::Stopped);
                            return;
                        }
                    }
                }
                Err(_) => {
                    self.set_state(ListenerState::BindFailedPermanent);
                    return;
                }
            }
        }
    }

    // 解析并绑定本地地址，只在第一次尝试时记录错误日志
    async fn bind(&self, first_try: bool) -> Result<TcpListener, AppError> {
        let local = normalize_addr(&self.rule.local, default_addresses::LOCAL_HOST);

        let addr = match resolve_addr(&local).await {
            Ok(addr) => addr,
            Err(e) => {
                if first_try {
                    error!(
                        "[{}] Can not resolve local TCP address {}: {}",
                        self.rule.name, self.rule.local, e
                    );
                }
                return Err(e);
            }
        };

        let socket = match create_tcp_listener(addr, listener_limits::BACKLOG) {
            Ok(socket) => socket,
            Err(e) => {
                if first_try {
                    error!("[{}] Can not listen on {}: {}", self.rule.name, addr, e);
                }
                return Err(e);
            }
        };

        let bound = socket.local_addr().unwrap_or(addr);
        info!(
            "[{}] Bridging {} to {}",
            self.rule.name, bound, self.rule.remote
        );
        self.set_state(ListenerState::Bound(bound));

        Ok(socket)
    }

    // 接受循环，返回时监听套接字随之关闭
    async fn accept_loop(&self, socket: TcpListener, stop_rx: &mut watch::Receiver<bool>) {
        let backoff = Duration::from_millis(listener_limits::ACCEPT_ERROR_BACKOFF_MS);

        loop {
            let accepted = tokio::select! {
                biased;
                _ = wait_stopped(stop_rx) => return,
                accepted = socket.accept() => accepted,
            };

            match accepted {
                Ok((inbound, source)) => {
                    info!("[{}] Connection from {} started", self.rule.name, source);
                    tokio::spawn(relay(self.relay_ctx.clone(), inbound, source));
                }
                Err(e) => {
                    warn!("[{}] Failed to accept connection: {}", self.rule.name, e);

                    // 避免持续出错时空转
                    tokio::select! {
                        _ = sleep(backoff) => {}
                        _ = wait_stopped(stop_rx) => return,
                    }
                }
            }
        }
    }

    fn set_state(&self, state: ListenerState) {
        self.state_tx.send_replace(state);
    }
}

// 等待停止信号；发送端被丢弃也视为停止
async fn wait_stopped(stop_rx: &mut watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow_and_update() {
            return;
        }
        if stop_rx.changed().await.is_err() {
            return;
        }
    }
}
