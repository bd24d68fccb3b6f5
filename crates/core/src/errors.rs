use thiserror::Error;

/// 调度错误类型定义
///
/// 派生 `Clone`/`PartialEq`：单个成员的失败结果会作为值存放在
/// 每次调度返回的结果映射中。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Marshaller构建失败: {0}")]
    MarshallerConstruction(String),

    #[error("命令编码失败: {0}")]
    Encoding(String),

    #[error("响应解码失败: {0}")]
    Decoding(String),

    #[error("成员 {member} 在截止时间内未响应")]
    MemberTimeout { member: String },

    #[error("成员 {member} 在响应前离开了集群视图")]
    MemberDeparted { member: String },

    #[error("调度器已关闭")]
    Cancelled,

    #[error("远端执行失败: {0}")]
    Remote(String),

    #[error("通道发送失败: {0}")]
    Channel(String),

    #[error("配置错误: {0}")]
    Configuration(String),
}

impl DispatchError {
    /// 该错误是否只影响单个成员的结果项
    pub fn is_member_scoped(&self) -> bool {
        matches!(
            self,
            DispatchError::Decoding(_)
                | DispatchError::MemberTimeout { .. }
                | DispatchError::MemberDeparted { .. }
                | DispatchError::Remote(_)
                | DispatchError::Channel(_)
        )
    }
}

/// 统一的Result类型
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    // 成员级错误只出现在结果映射的值里，整体级错误使整次调度失败
    #[test]
    fn test_member_scoped_classification() {
        let member = "node-1".to_string();
        assert!(DispatchError::MemberTimeout {
            member: member.clone()
        }
        .is_member_scoped());
        assert!(DispatchError::MemberDeparted { member }.is_member_scoped());
        assert!(DispatchError::Remote("失败".to_string()).is_member_scoped());
        assert!(DispatchError::Channel("失败".to_string()).is_member_scoped());
        assert!(DispatchError::Decoding("失败".to_string()).is_member_scoped());

        assert!(!DispatchError::Cancelled.is_member_scoped());
        assert!(!DispatchError::Encoding("失败".to_string()).is_member_scoped());
        assert!(!DispatchError::MarshallerConstruction("失败".to_string()).is_member_scoped());
        assert!(!DispatchError::Configuration("失败".to_string()).is_member_scoped());
    }
}
