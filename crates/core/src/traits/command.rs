use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::DispatchResult;

/// 可调度的命令
///
/// 命令是不透明的、可由marshaller序列化的工作单元，发出后不再
/// 修改。`name()` 是线上标识，远端据此校验负载归属。
pub trait Command: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 命令的响应类型
    type Response: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// 线上命令名
    fn name() -> &'static str;
}

/// 命令的目标执行上下文
///
/// 每个成员在创建调度端点时注册一个处理器，入站命令在该处理器
/// 上执行，结果（或捕获的失败）回送给发起方。
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    async fn execute(&self, command: C) -> DispatchResult<C::Response>;
}
