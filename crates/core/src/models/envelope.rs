use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};

use super::{ForkId, Member};

/// 信封消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeKind {
    /// 请求：携带待执行的命令
    Command,
    /// 成功响应：携带命令的执行结果
    Result,
    /// 失败响应：携带远端捕获的错误信息
    Failure,
}

/// 线缆信封
///
/// 信封头（fork、关联id、类型）使用固定的serde_json编码，与负载
/// 的marshaller无关：即使负载无法解码，接收方也必须能完成fork
/// 分类和关联匹配。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub fork: ForkId,
    pub correlation: Uuid,
    pub kind: EnvelopeKind,
    pub payload: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl WireEnvelope {
    pub fn new(fork: ForkId, correlation: Uuid, kind: EnvelopeKind, payload: Vec<u8>) -> Self {
        Self {
            fork,
            correlation,
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn encode(&self) -> DispatchResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| DispatchError::Encoding(format!("信封编码失败: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> DispatchResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| DispatchError::Decoding(format!("信封解码失败: {e}")))
    }

    pub fn is_response(&self) -> bool {
        matches!(self.kind, EnvelopeKind::Result | EnvelopeKind::Failure)
    }
}

/// marshaller层的负载单元：命令名加结构化值
///
/// 请求和响应共用该结构，响应沿用请求的命令名。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadBody {
    pub command: String,
    pub value: serde_json::Value,
}

impl PayloadBody {
    pub fn new(command: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            command: command.into(),
            value,
        }
    }
}

/// 通道投递的原始入站消息
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender: Member,
    pub bytes: Vec<u8>,
}
