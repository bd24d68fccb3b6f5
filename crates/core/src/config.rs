use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// 系统配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub group: GroupConfig,
    pub dispatch: DispatchConfig,
    pub marshalling: MarshallingConfig,
    pub observability: ObservabilityConfig,
}

/// 集群组配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    /// 组名，标识调度器所在的集群组
    pub name: String,
}

/// 调度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// 默认调度超时（秒），调用方未显式指定时生效
    pub default_timeout_seconds: u64,
    /// 入站消息广播缓冲区大小
    pub inbound_buffer_size: usize,
}

/// Marshalling配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarshallingConfig {
    /// 调度器实现自身的执行上下文标识
    pub local_context: String,
    /// 预注册的序列化上下文
    #[serde(default)]
    pub contexts: Vec<ContextSpec>,
}

/// 一个序列化上下文的声明：上下文标识及其可编码的命令名集合
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSpec {
    pub id: String,
    pub types: Vec<String>,
}

/// 可观测性配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            group: GroupConfig {
                name: "default".to_string(),
            },
            dispatch: DispatchConfig {
                default_timeout_seconds: 60,
                inbound_buffer_size: 1024,
            },
            marshalling: MarshallingConfig {
                local_context: "clustercmd".to_string(),
                contexts: Vec::new(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: "pretty".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序：
    /// 1. 默认配置
    /// 2. 配置文件（TOML格式）
    /// 3. 环境变量覆盖（前缀: CLUSTERCMD_）
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder()
            .set_default("group.name", "default")?
            .set_default("dispatch.default_timeout_seconds", 60)?
            .set_default("dispatch.inbound_buffer_size", 1024)?
            .set_default("marshalling.local_context", "clustercmd")?
            .set_default("observability.log_level", "info")?
            .set_default("observability.log_format", "pretty")?;

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/clustercmd.toml",
                "clustercmd.toml",
                "/etc/clustercmd/config.toml",
            ];

            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        // 环境变量覆盖（前缀: CLUSTERCMD_）- 最高优先级
        builder = builder.add_source(
            Environment::with_prefix("CLUSTERCMD")
                .separator("_")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// 从TOML字符串加载配置
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// 序列化配置为TOML字符串
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if self.group.name.is_empty() {
            return Err(anyhow::anyhow!("组名不能为空"));
        }

        if self.dispatch.default_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("默认调度超时必须大于0"));
        }

        if self.dispatch.inbound_buffer_size == 0 {
            return Err(anyhow::anyhow!("入站缓冲区大小必须大于0"));
        }

        if self.marshalling.local_context.is_empty() {
            return Err(anyhow::anyhow!("本地执行上下文标识不能为空"));
        }

        for context in &self.marshalling.contexts {
            if context.id.is_empty() {
                return Err(anyhow::anyhow!("序列化上下文标识不能为空"));
            }
            if context.types.is_empty() {
                return Err(anyhow::anyhow!("序列化上下文 {} 未声明任何命令类型", context.id));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"
[group]
name = "web-cluster"

[dispatch]
default_timeout_seconds = 30
inbound_buffer_size = 256

[marshalling]
local_context = "clustercmd"

[[marshalling.contexts]]
id = "web"
types = ["ping", "echo"]

[observability]
log_level = "debug"
log_format = "json"
"#;

    #[test]
    fn test_from_toml() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.group.name, "web-cluster");
        assert_eq!(config.dispatch.default_timeout_seconds, 30);
        assert_eq!(config.marshalling.contexts.len(), 1);
        assert_eq!(config.marshalling.contexts[0].types, vec!["ping", "echo"]);
    }

    #[test]
    fn test_default_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch.default_timeout_seconds, 60);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = AppConfig::default();
        config.dispatch.default_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_context_types() {
        let mut config = AppConfig::default();
        config.marshalling.contexts.push(ContextSpec {
            id: "web".to_string(),
            types: vec![],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AppConfig::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.group.name, "web-cluster");
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_load_missing_file() {
        assert!(AppConfig::load(Some("/nonexistent/clustercmd.toml")).is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        let rendered = config.to_toml().unwrap();
        let reparsed = AppConfig::from_toml(&rendered).unwrap();
        assert_eq!(reparsed.group.name, config.group.name);
        assert_eq!(
            reparsed.dispatch.default_timeout_seconds,
            config.dispatch.default_timeout_seconds
        );
    }
}
