use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, info};

use clustercmd_core::{
    DispatchError, DispatchResult, GroupChannel, GroupView, InboundMessage, Member,
};

const DEFAULT_BUFFER: usize = 1024;

struct GroupState {
    name: String,
    members: RwLock<HashMap<Member, broadcast::Sender<InboundMessage>>>,
    view_seq: AtomicU64,
    views: watch::Sender<GroupView>,
    buffer: usize,
}

/// 进程内的组通信实现
///
/// 为测试和演示提供成员资格协作者的内存实现：成员加入/离开时
/// 安装新视图，单播投递进目标成员的入站广播收件箱（含自投递）。
pub struct MemoryGroup {
    state: Arc<GroupState>,
}

impl MemoryGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_buffer(name, DEFAULT_BUFFER)
    }

    pub fn with_buffer(name: impl Into<String>, buffer: usize) -> Self {
        let (views, _) = watch::channel(GroupView::empty());
        Self {
            state: Arc::new(GroupState {
                name: name.into(),
                members: RwLock::new(HashMap::new()),
                view_seq: AtomicU64::new(0),
                views,
                buffer,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// 成员加入组，安装新视图并返回该成员的通道句柄
    pub async fn join(&self, member: Member) -> Arc<MemoryChannel> {
        let inbound = {
            let mut members = self.state.members.write().await;
            let (inbound, _) = broadcast::channel(self.state.buffer);
            members.insert(member.clone(), inbound.clone());
            Self::install_view(&self.state, &members);
            inbound
        };

        info!("成员 {} 加入组 {}", member, self.state.name);
        Arc::new(MemoryChannel {
            local: member,
            state: Arc::clone(&self.state),
            inbound,
        })
    }

    /// 成员离开组，安装新视图
    pub async fn leave(&self, member: &Member) {
        let mut members = self.state.members.write().await;
        if members.remove(member).is_some() {
            Self::install_view(&self.state, &members);
            info!("成员 {} 离开组 {}", member, self.state.name);
        }
    }

    pub async fn current_view(&self) -> GroupView {
        self.state.views.borrow().clone()
    }

    fn install_view(
        state: &GroupState,
        members: &HashMap<Member, broadcast::Sender<InboundMessage>>,
    ) {
        let id = state.view_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut list: Vec<Member> = members.keys().cloned().collect();
        list.sort();
        debug!("组 {} 安装视图 {}: {} 个成员", state.name, id, list.len());
        state.views.send_replace(GroupView::new(id, list));
    }
}

/// 单个成员持有的通道句柄
pub struct MemoryChannel {
    local: Member,
    state: Arc<GroupState>,
    inbound: broadcast::Sender<InboundMessage>,
}

#[async_trait]
impl GroupChannel for MemoryChannel {
    fn local_member(&self) -> Member {
        self.local.clone()
    }

    fn group(&self) -> &str {
        &self.state.name
    }

    async fn current_view(&self) -> GroupView {
        self.state.views.borrow().clone()
    }

    async fn send(&self, target: &Member, bytes: Vec<u8>) -> DispatchResult<()> {
        let members = self.state.members.read().await;
        let inbound = members
            .get(target)
            .ok_or_else(|| DispatchError::Channel(format!("成员 {target} 不在组内")))?;

        inbound
            .send(InboundMessage {
                sender: self.local.clone(),
                bytes,
            })
            .map(|_| ())
            .map_err(|_| DispatchError::Channel(format!("成员 {target} 没有活跃的订阅者")))
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound.subscribe()
    }

    fn subscribe_views(&self) -> watch::Receiver<GroupView> {
        self.state.views.subscribe()
    }
}
