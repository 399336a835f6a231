use super::common::{assert_refused, spawn_echo_server, RecordingCollector, TEST_TIMEOUT};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tcpfwd::error::AppError;
use tcpfwd::forward::{ForwardService, Forwarder, ListenerState, Rule};
use tokio::time::{sleep, timeout};
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemBuilder, SubsystemHandle, Toplevel};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forward_service_stops_listeners_on_shutdown() {
    let collector = RecordingCollector::new();
    let remote = spawn_echo_server().await;

    let forwarder = Arc::new(Forwarder::new(collector));
    let rules = vec![
        Rule::new("one", "127.0.0.1:0", remote.to_string(), true),
        Rule::new("two", "127.0.0.1:0", remote.to_string(), true),
    ];
    let service = ForwardService::new(forwarder.clone(), rules);

    let watcher = forwarder.clone();
    let bound = Arc::new(Mutex::new(Vec::new()));
    let bound_addrs = bound.clone();

    let result = Toplevel::new(move |s: SubsystemHandle| async move {
        s.start(SubsystemBuilder::new(
            "forward_service",
            service.into_subsystem(),
        ));

        // 所有规则绑定成功后请求关闭
        s.start(SubsystemBuilder::new(
            "trigger",
            move |s: SubsystemHandle| async move {
                while watcher.names().len() < 2 {
                    sleep(Duration::from_millis(10)).await;
                }
                for name in watcher.names() {
                    if let Some(listener) = watcher.get(&name) {
                        if let Some(addr) = listener.wait_bound().await {
                            bound_addrs.lock().push(addr);
                        }
                    }
                }
                s.request_shutdown();
                Ok::<(), AppError>(())
            },
        ));
    })
    .handle_shutdown_requests(TEST_TIMEOUT)
    .await;
    assert!(result.is_ok());

    for name in ["one", "two"] {
        let listener = forwarder.get(name).expect("rule should be registered");
        assert!(listener.is_stop_requested());
        timeout(TEST_TIMEOUT, listener.wait_terminated())
            .await
            .unwrap();
        assert_eq!(listener.state(), ListenerState::Stopped);
    }

    // 关闭后端口不再接受连接
    let addrs = bound.lock().clone();
    assert_eq!(addrs.len(), 2);
    for addr in addrs {
        assert_refused(addr).await;
    }
}
