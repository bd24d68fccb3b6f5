use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::errors::DispatchResult;
use crate::models::{GroupView, InboundMessage, Member};

/// 组通信通道抽象接口
///
/// 成员资格传输层（加入/离开、消息投递、视图变更）在这里作为
/// 黑盒消费。发送是尽力而为的，除传输层自身的语义外不提供任何
/// 投递保证。通道由外部协作者拥有，调度核心只引用它。
#[async_trait]
pub trait GroupChannel: Send + Sync {
    /// 本进程在组内的成员身份
    fn local_member(&self) -> Member;

    /// 通道所属的组名
    fn group(&self) -> &str;

    /// 当前成员视图快照
    async fn current_view(&self) -> GroupView;

    /// 向指定成员发送一条消息
    async fn send(&self, target: &Member, bytes: Vec<u8>) -> DispatchResult<()>;

    /// 订阅入站消息
    fn subscribe(&self) -> broadcast::Receiver<InboundMessage>;

    /// 订阅视图变更
    fn subscribe_views(&self) -> watch::Receiver<GroupView>;
}
