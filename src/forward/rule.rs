use std::fmt;

/// 转发规则
///
/// 一个命名的本地监听地址与远端地址的对应关系。监听器创建后规则不可变，
/// 替换规则意味着停止旧监听器并创建新的监听器。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    // 规则名称（唯一）
    pub name: String,
    // 本地监听地址 (host:port)
    pub local: String,
    // 远端地址 (host:port)
    pub remote: String,
    // 绑定失败时是否自动重试
    pub retry: bool,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        local: impl Into<String>,
        remote: impl Into<String>,
        retry: bool,
    ) -> Self {
        Self {
            name: name.into(),
            local: local.into(),
            remote: remote.into(),
            retry,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} -> {})", self.name, self.local, self.remote)
    }
}
