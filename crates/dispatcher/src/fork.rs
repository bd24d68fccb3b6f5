use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, RwLock};

use clustercmd_core::{DispatchError, DispatchResult, ForkId, Member, WireEnvelope};

/// 路由到某个调度端点的入站消息
#[derive(Debug)]
pub(crate) struct RoutedMessage {
    pub sender: Member,
    pub envelope: WireEnvelope,
}

/// 一个已注册fork的路由句柄
#[derive(Clone)]
pub(crate) struct ForkRoute {
    pub inbox: mpsc::UnboundedSender<RoutedMessage>,
    pub closed: Arc<watch::Sender<bool>>,
}

/// Fork注册表
///
/// 工厂的通道复用表：记录当前持有的全部fork标识及其路由。一个
/// 工厂持有零或多个活跃的fork标识；目的fork不在表中的响应属于
/// "未知fork"，必须被静默丢弃。
#[derive(Clone, Default)]
pub struct ForkRegistry {
    inner: Arc<RwLock<HashMap<ForkId, ForkRoute>>>,
}

impl ForkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn register(&self, fork: ForkId, route: ForkRoute) -> DispatchResult<()> {
        let mut forks = self.inner.write().await;
        if forks.contains_key(&fork) {
            return Err(DispatchError::Configuration(format!("fork {fork} 已注册")));
        }
        forks.insert(fork, route);
        Ok(())
    }

    pub(crate) async fn remove(&self, fork: &ForkId) -> Option<ForkRoute> {
        self.inner.write().await.remove(fork)
    }

    pub(crate) async fn route(&self, fork: &ForkId) -> Option<ForkRoute> {
        self.inner.read().await.get(fork).cloned()
    }

    pub(crate) async fn drain(&self) -> Vec<(ForkId, ForkRoute)> {
        self.inner.write().await.drain().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// 判定消息是否以本工厂当前未持有的fork为目的地
    ///
    /// 纯只读判定：注册状态不变时对同一消息的重复判定结果相同。
    /// 未知fork的响应属于已被移除的端点（例如一次重配置之后），
    /// 被过滤掉即可，既不是协议错误也不能错配给在途调度。
    pub async fn is_unknown_fork(&self, envelope: &WireEnvelope) -> bool {
        !self.inner.read().await.contains_key(&envelope.fork)
    }
}
