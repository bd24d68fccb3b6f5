use std::sync::Arc;

use serde_json::json;

use clustercmd_core::{ContextId, Marshaller};
use clustercmd_marshalling::{
    ContextMarshaller, LegacyMarshaller, MarshallerFactory, MarshallingVersion,
    SerializationContext, SerializationContextRegistry,
};

fn peer_registry() -> Arc<SerializationContextRegistry> {
    let registry = SerializationContextRegistry::new();
    registry
        .register(SerializationContext::new(
            ContextId::new("web"),
            ["ping".to_string(), "echo".to_string()],
        ))
        .unwrap();
    Arc::new(registry)
}

// 两个成员各自独立构建主策略marshaller：一端编码、另一端解码，
// 结果与原值相等
#[test]
fn test_primary_strategy_across_peers() {
    let sender = ContextMarshaller::new(peer_registry().lookup(&ContextId::new("web")).unwrap());
    let receiver = ContextMarshaller::new(peer_registry().lookup(&ContextId::new("web")).unwrap());

    let value = json!({"command": "echo", "value": {"text": "你好", "seq": 42}});
    let bytes = sender.marshal(&value).unwrap();
    assert_eq!(receiver.unmarshal(&bytes).unwrap(), value);
}

// 兼容策略独立满足同样的往返性质
#[test]
fn test_legacy_strategy_across_peers() {
    let sender = LegacyMarshaller::current(ContextId::new("web"), ContextId::new("clustercmd"));
    let receiver = LegacyMarshaller::current(ContextId::new("web"), ContextId::new("node-2"));

    let value = json!({"command": "ping", "value": null});
    let bytes = sender.marshal(&value).unwrap();
    assert_eq!(receiver.unmarshal(&bytes).unwrap(), value);
}

// 版本兼容：当前版本的解码端能读取任何旧版本编码端产出的负载
#[test]
fn test_decoder_accepts_all_older_versions() {
    let receiver = LegacyMarshaller::current(ContextId::new("web"), ContextId::new("clustercmd"));
    let value = json!({"command": "ping", "value": [1, 2, 3]});

    for version in [MarshallingVersion::V1, MarshallingVersion::V2] {
        assert!(version <= MarshallingVersion::CURRENT);
        let sender =
            LegacyMarshaller::new(version, ContextId::new("web"), ContextId::new("node-2"));
        let bytes = sender.marshal(&value).unwrap();
        assert_eq!(receiver.unmarshal(&bytes).unwrap(), value, "{version:?}");
    }
}

// 异构集群：一端注册了序列化上下文（主策略）、另一端没有（回退
// 策略）时，工厂各自成功解析出marshaller，创建调度器不受影响
#[test]
fn test_heterogeneous_members_resolve_independently() {
    let with_schema = MarshallerFactory::new(peer_registry(), ContextId::new("clustercmd"));
    let without_schema = MarshallerFactory::new(
        Arc::new(SerializationContextRegistry::new()),
        ContextId::new("clustercmd"),
    );

    assert!(with_schema.marshaller(&ContextId::new("web")).is_ok());
    assert!(without_schema.marshaller(&ContextId::new("web")).is_ok());
}
