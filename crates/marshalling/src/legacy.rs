use serde::{Deserialize, Serialize};

use clustercmd_core::{ContextId, DispatchError, DispatchResult, Marshaller};

use crate::version::MarshallingVersion;

/// V2线缆格式的负载体：上下文表加值
#[derive(Debug, Serialize, Deserialize)]
struct LegacyFrame {
    contexts: Vec<String>,
    value: serde_json::Value,
}

/// 兼容回退marshaller
///
/// 线缆格式：一个版本字节，后跟版本相关的JSON负载。编码始终写
/// `CURRENT` 版本；解码按版本字节分派，能处理每一个已识别的版本，
/// 未识别的版本字节是解码错误。
///
/// 构建时接收调用方和调度器实现自身的两个执行上下文；二者相同时
/// 只保留一个，避免重复的上下文表。
pub struct LegacyMarshaller {
    version: MarshallingVersion,
    contexts: Vec<ContextId>,
}

impl LegacyMarshaller {
    pub fn new(version: MarshallingVersion, caller: ContextId, local: ContextId) -> Self {
        let contexts = if caller == local {
            vec![caller]
        } else {
            vec![caller, local]
        };
        Self { version, contexts }
    }

    /// 以当前版本构建
    pub fn current(caller: ContextId, local: ContextId) -> Self {
        Self::new(MarshallingVersion::CURRENT, caller, local)
    }

    pub fn version(&self) -> MarshallingVersion {
        self.version
    }

    pub fn contexts(&self) -> &[ContextId] {
        &self.contexts
    }
}

impl Marshaller for LegacyMarshaller {
    fn marshal(&self, value: &serde_json::Value) -> DispatchResult<Vec<u8>> {
        let body = match self.version {
            MarshallingVersion::V1 => {
                serde_json::to_vec(value).map_err(|e| DispatchError::Encoding(e.to_string()))?
            }
            MarshallingVersion::V2 => {
                let frame = LegacyFrame {
                    contexts: self.contexts.iter().map(|c| c.to_string()).collect(),
                    value: value.clone(),
                };
                serde_json::to_vec(&frame).map_err(|e| DispatchError::Encoding(e.to_string()))?
            }
        };

        let mut bytes = Vec::with_capacity(body.len() + 1);
        bytes.push(self.version.as_byte());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    fn unmarshal(&self, bytes: &[u8]) -> DispatchResult<serde_json::Value> {
        let (first, body) = bytes
            .split_first()
            .ok_or_else(|| DispatchError::Decoding("负载为空".to_string()))?;

        let version = MarshallingVersion::from_byte(*first)
            .ok_or_else(|| DispatchError::Decoding(format!("未识别的marshalling版本: {first}")))?;

        match version {
            MarshallingVersion::V1 => {
                serde_json::from_slice(body).map_err(|e| DispatchError::Decoding(e.to_string()))
            }
            MarshallingVersion::V2 => {
                let frame: LegacyFrame = serde_json::from_slice(body)
                    .map_err(|e| DispatchError::Decoding(e.to_string()))?;
                Ok(frame.value)
            }
        }
    }
}
