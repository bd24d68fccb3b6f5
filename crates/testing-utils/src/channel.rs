use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use clustercmd_core::{
    DispatchResult, GroupChannel, GroupView, InboundMessage, Member,
};

/// 记录发送的mock通道
///
/// 固定视图、从不真正投递：发出的消息只被记录下来，供测试断言
/// 发送次数和目标。`inject` 可以把任意原始消息推进入站订阅，用于
/// 模拟对端或陌生fork的流量。
pub struct RecordingChannel {
    local: Member,
    views: watch::Sender<GroupView>,
    inbound: broadcast::Sender<InboundMessage>,
    sent: Mutex<Vec<(Member, Vec<u8>)>>,
}

impl RecordingChannel {
    pub fn new(local: Member, members: Vec<Member>) -> Self {
        let (views, _) = watch::channel(GroupView::new(1, members));
        let (inbound, _) = broadcast::channel(64);
        Self {
            local,
            views,
            inbound,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// 已记录的全部发送
    pub fn sent(&self) -> Vec<(Member, Vec<u8>)> {
        self.sent.lock().expect("锁中毒").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("锁中毒").len()
    }

    /// 安装新视图
    pub fn install_view(&self, view: GroupView) {
        self.views.send_replace(view);
    }

    /// 向入站订阅注入一条原始消息
    pub fn inject(&self, message: InboundMessage) {
        let _ = self.inbound.send(message);
    }
}

#[async_trait]
impl GroupChannel for RecordingChannel {
    fn local_member(&self) -> Member {
        self.local.clone()
    }

    fn group(&self) -> &str {
        "recording"
    }

    async fn current_view(&self) -> GroupView {
        self.views.borrow().clone()
    }

    async fn send(&self, target: &Member, bytes: Vec<u8>) -> DispatchResult<()> {
        self.sent
            .lock()
            .expect("锁中毒")
            .push((target.clone(), bytes));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound.subscribe()
    }

    fn subscribe_views(&self) -> watch::Receiver<GroupView> {
        self.views.subscribe()
    }
}
