use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use clustercmd_core::{Command, CommandHandler, DispatchError, DispatchResult, Member};

/// 构造 node-1..node-n 形式的测试成员
pub fn members(n: usize) -> Vec<Member> {
    (1..=n).map(|i| Member::new(format!("node-{i}"))).collect()
}

/// 回显命令：远端把文本连同自己的成员标识一起返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoCommand {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub member: String,
    pub text: String,
}

impl Command for EchoCommand {
    type Response = EchoResponse;

    fn name() -> &'static str {
        "echo"
    }
}

pub struct EchoHandler {
    local: Member,
}

impl EchoHandler {
    pub fn new(local: Member) -> Self {
        Self { local }
    }
}

#[async_trait]
impl CommandHandler<EchoCommand> for EchoHandler {
    async fn execute(&self, command: EchoCommand) -> DispatchResult<EchoResponse> {
        Ok(EchoResponse {
            member: self.local.id.clone(),
            text: command.text,
        })
    }
}

/// ping命令：远端返回收到的序号
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingCommand {
    pub seq: u64,
}

impl Command for PingCommand {
    type Response = u64;

    fn name() -> &'static str {
        "ping"
    }
}

pub struct PingHandler;

#[async_trait]
impl CommandHandler<PingCommand> for PingHandler {
    async fn execute(&self, command: PingCommand) -> DispatchResult<u64> {
        Ok(command.seq)
    }
}

/// 永不响应的处理器，用于触发超时和取消场景
pub struct SilentHandler;

#[async_trait]
impl CommandHandler<EchoCommand> for SilentHandler {
    async fn execute(&self, _command: EchoCommand) -> DispatchResult<EchoResponse> {
        std::future::pending().await
    }
}

#[async_trait]
impl CommandHandler<PingCommand> for SilentHandler {
    async fn execute(&self, _command: PingCommand) -> DispatchResult<u64> {
        std::future::pending().await
    }
}

#[async_trait]
impl CommandHandler<PoisonCommand> for SilentHandler {
    async fn execute(&self, _command: PoisonCommand) -> DispatchResult<()> {
        std::future::pending().await
    }
}

/// 延迟指定时长后才回显的处理器，用于制造迟到响应
pub struct DelayedHandler {
    local: Member,
    delay: std::time::Duration,
}

impl DelayedHandler {
    pub fn new(local: Member, delay: std::time::Duration) -> Self {
        Self { local, delay }
    }
}

#[async_trait]
impl CommandHandler<EchoCommand> for DelayedHandler {
    async fn execute(&self, command: EchoCommand) -> DispatchResult<EchoResponse> {
        tokio::time::sleep(self.delay).await;
        Ok(EchoResponse {
            member: self.local.id.clone(),
            text: command.text,
        })
    }
}

/// 总是返回捕获失败的处理器
pub struct FailingHandler;

#[async_trait]
impl CommandHandler<EchoCommand> for FailingHandler {
    async fn execute(&self, _command: EchoCommand) -> DispatchResult<EchoResponse> {
        Err(DispatchError::Remote("处理器故障".to_string()))
    }
}

/// 序列化必定失败的命令，用于验证编码错误的同步上报
#[derive(Debug)]
pub struct PoisonCommand;

impl Serialize for PoisonCommand {
    fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("不可序列化的命令"))
    }
}

impl<'de> Deserialize<'de> for PoisonCommand {
    fn deserialize<D: serde::Deserializer<'de>>(_deserializer: D) -> Result<Self, D::Error> {
        Ok(PoisonCommand)
    }
}

impl Command for PoisonCommand {
    type Response = ();

    fn name() -> &'static str {
        "poison"
    }
}
