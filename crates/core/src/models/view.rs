use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Member;

/// 集群成员视图快照
///
/// 由成员资格层维护，视图id单调递增。调度核心只读取视图，
/// 从不修改它。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupView {
    pub id: u64,
    pub members: Vec<Member>,
    pub installed_at: DateTime<Utc>,
}

impl GroupView {
    pub fn new(id: u64, members: Vec<Member>) -> Self {
        Self {
            id,
            members,
            installed_at: Utc::now(),
        }
    }

    /// 空视图，作为watch通道的初始值
    pub fn empty() -> Self {
        Self::new(0, Vec::new())
    }

    pub fn contains(&self, member: &Member) -> bool {
        self.members.iter().any(|m| m == member)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
