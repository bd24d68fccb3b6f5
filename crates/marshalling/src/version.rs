/// Marshalling配置版本
///
/// 严格有序的协议标识。编码始终使用 `CURRENT`，解码必须接受所有
/// 已识别的版本（向后兼容读、向前写）。版本只增不改：集群中可能
/// 还有运行旧版本的成员，已有版本号从不重编或删除。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MarshallingVersion {
    V1 = 1,
    V2 = 2,
}

impl MarshallingVersion {
    pub const CURRENT: Self = Self::V2;

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_are_ordered() {
        assert!(MarshallingVersion::V1 < MarshallingVersion::V2);
        assert_eq!(MarshallingVersion::CURRENT, MarshallingVersion::V2);
    }

    #[test]
    fn test_byte_roundtrip() {
        for version in [MarshallingVersion::V1, MarshallingVersion::V2] {
            assert_eq!(MarshallingVersion::from_byte(version.as_byte()), Some(version));
        }
        assert_eq!(MarshallingVersion::from_byte(0), None);
        assert_eq!(MarshallingVersion::from_byte(99), None);
    }
}
