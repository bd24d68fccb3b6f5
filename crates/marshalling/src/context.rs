use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use clustercmd_core::{ContextId, DispatchError, DispatchResult, Marshaller};

/// 序列化上下文查找错误
///
/// `NotRegistered` 是可回退的"未找到"条件，其它失败一律视为
/// 致命的构建错误，不允许被回退吞掉。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("序列化上下文未注册: {0}")]
    NotRegistered(ContextId),

    #[error("序列化上下文无效: {0}")]
    Invalid(String),
}

/// 一个序列化上下文：上下文标识及其可编码的命令名集合
#[derive(Debug, Clone)]
pub struct SerializationContext {
    id: ContextId,
    types: BTreeSet<String>,
}

impl SerializationContext {
    pub fn new(id: ContextId, types: impl IntoIterator<Item = String>) -> Self {
        Self {
            id,
            types: types.into_iter().collect(),
        }
    }

    pub fn id(&self) -> &ContextId {
        &self.id
    }

    /// 该上下文是否登记了给定命令名
    pub fn knows(&self, command: &str) -> bool {
        self.types.contains(command)
    }
}

/// 序列化上下文注册表
///
/// 按执行上下文标识索引已注册的上下文。查找是无副作用的只读
/// 操作，不同上下文的并发查找互不阻塞。
#[derive(Debug, Default)]
pub struct SerializationContextRegistry {
    contexts: RwLock<HashMap<ContextId, Arc<SerializationContext>>>,
}

impl SerializationContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, context: SerializationContext) -> Result<(), ContextError> {
        if context.id.is_empty() {
            return Err(ContextError::Invalid("上下文标识为空".to_string()));
        }
        if context.types.is_empty() {
            return Err(ContextError::Invalid(format!(
                "上下文 {} 未声明任何命令类型",
                context.id
            )));
        }

        let mut contexts = self
            .contexts
            .write()
            .map_err(|_| ContextError::Invalid("注册表锁中毒".to_string()))?;
        contexts.insert(context.id.clone(), Arc::new(context));
        Ok(())
    }

    pub fn lookup(&self, id: &ContextId) -> Result<Arc<SerializationContext>, ContextError> {
        if id.is_empty() {
            return Err(ContextError::Invalid("上下文标识为空".to_string()));
        }

        let contexts = self
            .contexts
            .read()
            .map_err(|_| ContextError::Invalid("注册表锁中毒".to_string()))?;
        contexts
            .get(id)
            .cloned()
            .ok_or_else(|| ContextError::NotRegistered(id.clone()))
    }
}

/// 主策略线缆格式：紧凑JSON外层，携带上下文标识
#[derive(Debug, Serialize, Deserialize)]
struct ContextFrame {
    ctx: String,
    body: serde_json::Value,
}

/// 主策略marshaller
///
/// 基于序列化上下文的结构化编码：只允许编码在上下文中登记过的
/// 命令名，负载紧凑且与具体marshalling版本无关，适合跨版本互通。
pub struct ContextMarshaller {
    context: Arc<SerializationContext>,
}

impl ContextMarshaller {
    pub fn new(context: Arc<SerializationContext>) -> Self {
        Self { context }
    }

    fn command_name(value: &serde_json::Value) -> Option<&str> {
        value.get("command").and_then(|v| v.as_str())
    }
}

impl Marshaller for ContextMarshaller {
    fn marshal(&self, value: &serde_json::Value) -> DispatchResult<Vec<u8>> {
        if let Some(command) = Self::command_name(value) {
            if !self.context.knows(command) {
                return Err(DispatchError::Encoding(format!(
                    "命令 {} 未在上下文 {} 中登记",
                    command,
                    self.context.id()
                )));
            }
        }

        let frame = ContextFrame {
            ctx: self.context.id().to_string(),
            body: value.clone(),
        };
        serde_json::to_vec(&frame).map_err(|e| DispatchError::Encoding(e.to_string()))
    }

    fn unmarshal(&self, bytes: &[u8]) -> DispatchResult<serde_json::Value> {
        let frame: ContextFrame =
            serde_json::from_slice(bytes).map_err(|e| DispatchError::Decoding(e.to_string()))?;

        if frame.ctx != self.context.id().as_str() {
            return Err(DispatchError::Decoding(format!(
                "上下文不匹配: 期望 {}, 收到 {}",
                self.context.id(),
                frame.ctx
            )));
        }

        if let Some(command) = Self::command_name(&frame.body) {
            if !self.context.knows(command) {
                return Err(DispatchError::Decoding(format!(
                    "命令 {} 未在上下文 {} 中登记",
                    command,
                    self.context.id()
                )));
            }
        }

        Ok(frame.body)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry_with_web() -> SerializationContextRegistry {
        let registry = SerializationContextRegistry::new();
        registry
            .register(SerializationContext::new(
                ContextId::new("web"),
                ["ping".to_string(), "echo".to_string()],
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_lookup_registered() {
        let registry = registry_with_web();
        let context = registry.lookup(&ContextId::new("web")).unwrap();
        assert!(context.knows("ping"));
        assert!(!context.knows("restart"));
    }

    #[test]
    fn test_lookup_not_registered() {
        let registry = registry_with_web();
        let err = registry.lookup(&ContextId::new("ejb")).unwrap_err();
        assert_eq!(err, ContextError::NotRegistered(ContextId::new("ejb")));
    }

    #[test]
    fn test_lookup_empty_id_is_invalid() {
        let registry = registry_with_web();
        let err = registry.lookup(&ContextId::new("")).unwrap_err();
        assert!(matches!(err, ContextError::Invalid(_)));
    }

    #[test]
    fn test_register_rejects_empty_types() {
        let registry = SerializationContextRegistry::new();
        let err = registry
            .register(SerializationContext::new(ContextId::new("web"), []))
            .unwrap_err();
        assert!(matches!(err, ContextError::Invalid(_)));
    }

    #[test]
    fn test_primary_roundtrip() {
        let registry = registry_with_web();
        let marshaller = ContextMarshaller::new(registry.lookup(&ContextId::new("web")).unwrap());

        let value = json!({"command": "ping", "value": {"seq": 7}});
        let bytes = marshaller.marshal(&value).unwrap();
        let decoded = marshaller.unmarshal(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_unmarshal_rejects_foreign_context_frame() {
        let registry = registry_with_web();
        registry
            .register(SerializationContext::new(
                ContextId::new("ejb"),
                ["ping".to_string()],
            ))
            .unwrap();

        let web = ContextMarshaller::new(registry.lookup(&ContextId::new("web")).unwrap());
        let ejb = ContextMarshaller::new(registry.lookup(&ContextId::new("ejb")).unwrap());

        // web上下文编码的帧不能被ejb上下文的marshaller解码
        let bytes = web.marshal(&json!({"command": "ping", "value": 1})).unwrap();
        assert!(matches!(
            ejb.unmarshal(&bytes),
            Err(DispatchError::Decoding(_))
        ));
    }

    #[test]
    fn test_primary_rejects_unknown_command() {
        let registry = registry_with_web();
        let marshaller = ContextMarshaller::new(registry.lookup(&ContextId::new("web")).unwrap());

        let value = json!({"command": "restart", "value": null});
        assert!(matches!(
            marshaller.marshal(&value),
            Err(DispatchError::Encoding(_))
        ));
    }
}
