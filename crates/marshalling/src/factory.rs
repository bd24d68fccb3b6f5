use std::sync::Arc;

use tracing::debug;

use clustercmd_core::{ContextId, DispatchError, DispatchResult, Marshaller, MarshallingConfig};

use crate::context::{
    ContextError, ContextMarshaller, SerializationContext, SerializationContextRegistry,
};
use crate::legacy::LegacyMarshaller;

/// Marshaller工厂
///
/// 按执行上下文解析marshaller。先尝试主策略（序列化上下文注册表），
/// 仅当该上下文"未注册"时回退到按当前marshalling版本构建的兼容
/// marshaller；其它查找失败是致命的构建错误，直接传播。
///
/// 构建是幂等且无副作用的：对同一上下文重复调用可能返回等价的
/// 独立实例，不要求缓存。
pub struct MarshallerFactory {
    registry: Arc<SerializationContextRegistry>,
    local_context: ContextId,
}

impl MarshallerFactory {
    pub fn new(registry: Arc<SerializationContextRegistry>, local_context: ContextId) -> Self {
        Self {
            registry,
            local_context,
        }
    }

    /// 按配置构建工厂并预注册序列化上下文
    pub fn from_config(config: &MarshallingConfig) -> DispatchResult<Self> {
        let registry = SerializationContextRegistry::new();
        for spec in &config.contexts {
            registry
                .register(SerializationContext::new(
                    ContextId::new(spec.id.clone()),
                    spec.types.iter().cloned(),
                ))
                .map_err(|e| DispatchError::MarshallerConstruction(e.to_string()))?;
        }

        Ok(Self::new(
            Arc::new(registry),
            ContextId::new(config.local_context.clone()),
        ))
    }

    pub fn registry(&self) -> &Arc<SerializationContextRegistry> {
        &self.registry
    }

    pub fn local_context(&self) -> &ContextId {
        &self.local_context
    }

    /// 为给定执行上下文解析marshaller
    pub fn marshaller(&self, context: &ContextId) -> DispatchResult<Arc<dyn Marshaller>> {
        match self.registry.lookup(context) {
            Ok(ctx) => Ok(Arc::new(ContextMarshaller::new(ctx))),
            Err(ContextError::NotRegistered(_)) => {
                debug!("上下文 {} 未注册序列化上下文，回退到兼容marshaller", context);
                Ok(Arc::new(LegacyMarshaller::current(
                    context.clone(),
                    self.local_context.clone(),
                )))
            }
            Err(e) => Err(DispatchError::MarshallerConstruction(e.to_string())),
        }
    }
}
