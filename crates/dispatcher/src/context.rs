use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::debug;

use clustercmd_core::{DispatchError, DispatchResult, GroupView, Member};

/// 送入在途调度上下文的事件
#[derive(Debug)]
pub(crate) enum ContextEvent {
    Response {
        member: Member,
        result: DispatchResult<serde_json::Value>,
    },
}

/// 一次在途调度的临时状态
///
/// 记录目标成员集、各成员的终态和截止时间。在发起调度时创建，
/// 只由驱动它的调用方任务修改，全部成员到达终态或截止时间到达
/// 后销毁。上下文之间不共享可变状态。
pub(crate) struct DispatchContext {
    remaining: HashSet<Member>,
    outcomes: HashMap<Member, DispatchResult<serde_json::Value>>,
}

impl DispatchContext {
    pub fn new(targets: impl IntoIterator<Item = Member>) -> Self {
        Self {
            remaining: targets.into_iter().collect(),
            outcomes: HashMap::new(),
        }
    }

    /// 记录一个成员的终态
    ///
    /// 响应严格按关联标识匹配；已终结成员的重复或乱序响应被忽略。
    pub fn record(&mut self, member: Member, result: DispatchResult<serde_json::Value>) {
        if self.remaining.remove(&member) {
            self.outcomes.insert(member, result);
        } else {
            debug!("忽略成员 {} 的重复或过期响应", member);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }

    fn apply_view(&mut self, view: &GroupView) {
        let departed: Vec<Member> = self
            .remaining
            .iter()
            .filter(|member| !view.contains(member))
            .cloned()
            .collect();

        for member in departed {
            debug!("成员 {} 在响应前离开了视图 {}", member, view.id);
            let error = DispatchError::MemberDeparted {
                member: member.id.clone(),
            };
            self.record(member, Err(error));
        }
    }

    /// 驱动上下文直到全部成员到达终态、截止时间到达或调度器被关闭
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ContextEvent>,
        mut views: watch::Receiver<GroupView>,
        mut closed: watch::Receiver<bool>,
        deadline: Instant,
    ) -> DispatchResult<HashMap<Member, DispatchResult<serde_json::Value>>> {
        if *closed.borrow() {
            return Err(DispatchError::Cancelled);
        }

        // 订阅和发送之间可能已有视图变更，先按当前视图判一次离群
        let initial = views.borrow_and_update().clone();
        self.apply_view(&initial);

        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);
        let mut views_alive = true;

        while !self.is_complete() {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ContextEvent::Response { member, result }) => {
                        self.record(member, result);
                    }
                    None => return Err(DispatchError::Cancelled),
                },
                changed = views.changed(), if views_alive => match changed {
                    Ok(()) => {
                        let view = views.borrow_and_update().clone();
                        self.apply_view(&view);
                    }
                    Err(_) => views_alive = false,
                },
                _ = closed.changed() => {
                    if *closed.borrow() {
                        return Err(DispatchError::Cancelled);
                    }
                }
                _ = &mut sleep => {
                    self.expire(&mut events, &views);
                    break;
                }
            }
        }

        Ok(self.outcomes)
    }

    /// 截止时间处理
    ///
    /// 先吸收已排队的响应事件，再按当前视图判一次离群，剩余成员
    /// 才计为超时：离群和超时在同一瞬间都成立时，离群判定优先。
    fn expire(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<ContextEvent>,
        views: &watch::Receiver<GroupView>,
    ) {
        while let Ok(ContextEvent::Response { member, result }) = events.try_recv() {
            self.record(member, result);
        }

        let view = views.borrow().clone();
        self.apply_view(&view);

        let expired: Vec<Member> = self.remaining.iter().cloned().collect();
        for member in expired {
            debug!("成员 {} 在截止时间内未响应", member);
            let error = DispatchError::MemberTimeout {
                member: member.id.clone(),
            };
            self.record(member, Err(error));
        }
    }
}
