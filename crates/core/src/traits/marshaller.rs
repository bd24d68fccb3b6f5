use crate::errors::DispatchResult;

/// 负载序列化抽象接口
///
/// 在结构化值和字节缓冲之间转换。具体的线缆格式由策略实现决定，
/// 同一集群内的成员可能使用不同版本的格式。
pub trait Marshaller: Send + Sync {
    /// 将结构化值编码为字节缓冲
    fn marshal(&self, value: &serde_json::Value) -> DispatchResult<Vec<u8>>;

    /// 从字节缓冲解码结构化值
    fn unmarshal(&self, bytes: &[u8]) -> DispatchResult<serde_json::Value>;
}

impl std::fmt::Debug for dyn Marshaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Marshaller")
    }
}
