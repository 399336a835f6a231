// 子模块定义
mod listener;
mod registry;
mod relay;
mod rule;
mod service;
mod utils;

// 公共 API 重新导出
pub use listener::{Listener, ListenerState};
pub use registry::Forwarder;
pub use relay::{relay, RelayContext, RelayReport};
pub use rule::Rule;
pub use service::ForwardService;
pub use utils::{create_tcp_listener, normalize_addr, resolve_addr};
