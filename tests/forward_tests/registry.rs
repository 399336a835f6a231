use super::common::{
    assert_refused, exchange, payload, spawn_echo_server, spawn_sink_server, RecordingCollector,
    TEST_TIMEOUT,
};
use std::sync::Arc;
use std::time::Duration;
use tcpfwd::forward::{Forwarder, ListenerState, Rule};
use tcpfwd::metrics::Direction;
use tokio::time::timeout;

// 创建使用短重试间隔的转发器
fn create_test_forwarder(collector: Arc<RecordingCollector>) -> Forwarder {
    Forwarder::with_retry_interval(collector, Duration::from_millis(100))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forwarder_round_trip() {
    let collector = RecordingCollector::new();
    let reply = payload(77);
    let (remote, mut received) = spawn_sink_server(reply.clone()).await;

    let forwarder = create_test_forwarder(collector.clone());
    let listener = forwarder.start(Rule::new("web", "127.0.0.1:0", remote.to_string(), true));
    let addr = timeout(TEST_TIMEOUT, listener.wait_bound())
        .await
        .unwrap()
        .unwrap();

    let sent = payload(65_536);
    assert_eq!(exchange(addr, &sent).await, reply);
    assert_eq!(received.recv().await, Some(sent.len()));

    collector.wait_for_relays("web", 1).await;
    assert_eq!(collector.connections("web"), 1);
    assert_eq!(
        collector.transfers("web", Direction::Out),
        vec![sent.len() as u64]
    );
    assert_eq!(
        collector.transfers("web", Direction::In),
        vec![reply.len() as u64]
    );

    forwarder.stop_all();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forwarder_replace_stops_previous_listener() {
    let collector = RecordingCollector::new();
    let remote = spawn_echo_server().await;
    let forwarder = create_test_forwarder(collector);

    let old = forwarder.start(Rule::new("svc", "127.0.0.1:0", remote.to_string(), true));
    let old_addr = timeout(TEST_TIMEOUT, old.wait_bound())
        .await
        .unwrap()
        .unwrap();

    // 同名规则替换到另一个端口
    let new = forwarder.start(Rule::new("svc", "127.0.0.1:0", remote.to_string(), true));
    assert!(old.is_stop_requested());
    assert!(Arc::ptr_eq(&forwarder.get("svc").unwrap(), &new));
    assert_eq!(forwarder.names(), vec!["svc".to_string()]);

    timeout(TEST_TIMEOUT, old.wait_terminated())
        .await
        .unwrap();
    assert_eq!(old.state(), ListenerState::Stopped);
    assert_refused(old_addr).await;

    let new_addr = timeout(TEST_TIMEOUT, new.wait_bound())
        .await
        .unwrap()
        .unwrap();
    assert_ne!(new_addr, old_addr);
    let sent = payload(1024);
    assert_eq!(exchange(new_addr, &sent).await, sent);

    forwarder.stop_all();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forwarder_replace_on_same_port() {
    let collector = RecordingCollector::new();
    let remote = spawn_echo_server().await;
    let forwarder = create_test_forwarder(collector);

    let old = forwarder.start(Rule::new("same", "127.0.0.1:0", remote.to_string(), false));
    let addr = timeout(TEST_TIMEOUT, old.wait_bound())
        .await
        .unwrap()
        .unwrap();

    // 新监听器等待旧监听器释放端口后再绑定，因此即使不重试也能成功
    let new = forwarder.start(Rule::new("same", addr.to_string(), remote.to_string(), false));
    let bound = timeout(TEST_TIMEOUT, new.wait_bound()).await.unwrap();
    assert_eq!(bound, Some(addr));
    assert_eq!(old.state(), ListenerState::Stopped);
    assert_eq!(new.bind_attempts(), 1);

    let sent = payload(2048);
    assert_eq!(exchange(addr, &sent).await, sent);

    forwarder.stop_all();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_forwarder_chained_replace_on_same_port() {
    let collector = RecordingCollector::new();
    let remote = spawn_echo_server().await;
    let forwarder = create_test_forwarder(collector);

    for _ in 0..100 {
        let first = forwarder.start(Rule::new("chain", "127.0.0.1:0", remote.to_string(), false));
        let addr = timeout(TEST_TIMEOUT, first.wait_bound())
            .await
            .unwrap()
            .unwrap();

        // 连续替换两次，中间的监听器在等待旧监听器时即被停止
        let second = forwarder.start(Rule::new("chain", addr.to_string(), remote.to_string(), false));
        let third = forwarder.start(Rule::new("chain", addr.to_string(), remote.to_string(), false));

        let bound = timeout(TEST_TIMEOUT, third.wait_bound()).await.unwrap();
        assert_eq!(bound, Some(addr));
        assert_eq!(third.bind_attempts(), 1);
        assert_eq!(first.state(), ListenerState::Stopped);
        timeout(TEST_TIMEOUT, second.wait_terminated())
            .await
            .unwrap();
        assert_eq!(second.state(), ListenerState::Stopped);
        assert_eq!(second.bind_attempts(), 0);

        forwarder.stop_all();
        timeout(TEST_TIMEOUT, third.wait_terminated())
            .await
            .unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forwarder_stop_all() {
    let collector = RecordingCollector::new();
    let remote = spawn_echo_server().await;
    let forwarder = create_test_forwarder(collector);

    let mut listeners = Vec::new();
    for name in ["a", "b", "c"] {
        listeners.push(forwarder.start(Rule::new(name, "127.0.0.1:0", remote.to_string(), true)));
    }

    let mut addrs = Vec::new();
    for listener in &listeners {
        let addr = timeout(TEST_TIMEOUT, listener.wait_bound())
            .await
            .unwrap()
            .unwrap();
        addrs.push(addr);
    }
    assert_eq!(forwarder.names(), vec!["a", "b", "c"]);

    forwarder.stop_all();

    for listener in &listeners {
        timeout(TEST_TIMEOUT, listener.wait_terminated())
            .await
            .unwrap();
        assert_eq!(listener.state(), ListenerState::Stopped);
    }
    for addr in addrs {
        assert_refused(addr).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forwarder_stop_single_rule() {
    let collector = RecordingCollector::new();
    let remote = spawn_echo_server().await;
    let forwarder = create_test_forwarder(collector);

    let kept = forwarder.start(Rule::new("kept", "127.0.0.1:0", remote.to_string(), true));
    let stopped = forwarder.start(Rule::new("stopped", "127.0.0.1:0", remote.to_string(), true));
    let kept_addr = timeout(TEST_TIMEOUT, kept.wait_bound())
        .await
        .unwrap()
        .unwrap();
    timeout(TEST_TIMEOUT, stopped.wait_bound())
        .await
        .unwrap()
        .unwrap();

    assert!(forwarder.stop("stopped"));
    assert!(!forwarder.stop("missing"));

    timeout(TEST_TIMEOUT, stopped.wait_terminated())
        .await
        .unwrap();

    // 其他规则不受影响
    assert_eq!(kept.state(), ListenerState::Bound(kept_addr));
    let sent = payload(512);
    assert_eq!(exchange(kept_addr, &sent).await, sent);

    forwarder.stop_all();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_forwarder_concurrent_relays() {
    const CONNECTIONS: usize = 50;

    let collector = RecordingCollector::new();
    let remote = spawn_echo_server().await;
    let forwarder = create_test_forwarder(collector.clone());
    let listener = forwarder.start(Rule::new("busy", "127.0.0.1:0", remote.to_string(), true));
    let addr = timeout(TEST_TIMEOUT, listener.wait_bound())
        .await
        .unwrap()
        .unwrap();

    // 每个连接使用不同大小的数据，便于发现计数串扰
    let sizes: Vec<usize> = (0..CONNECTIONS).map(|i| 1000 + i * 37).collect();
    let mut handles = Vec::with_capacity(CONNECTIONS);
    for &size in &sizes {
        handles.push(tokio::spawn(async move {
            let sent = payload(size);
            let echoed = exchange(addr, &sent).await;
            assert_eq!(echoed, sent);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    collector.wait_for_relays("busy", CONNECTIONS).await;
    let expected: Vec<u64> = sizes.iter().map(|&s| s as u64).collect();
    assert_eq!(collector.connections("busy"), CONNECTIONS);
    assert_eq!(collector.transfers("busy", Direction::Out), expected);
    assert_eq!(collector.transfers("busy", Direction::In), expected);

    forwarder.stop_all();
}
