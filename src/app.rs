use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use clustercmd_core::{
    AppConfig, Command, CommandHandler, ContextId, DispatchResult, GroupChannel, Member,
};
use clustercmd_dispatcher::{CommandDispatcher, CommandDispatcherFactory};
use clustercmd_infrastructure::MemoryGroup;

/// 演示用回显命令
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoCommand {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
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

struct EchoHandler {
    local: Member,
}

#[async_trait]
impl CommandHandler<EchoCommand> for EchoHandler {
    async fn execute(&self, command: EchoCommand) -> DispatchResult<EchoResponse> {
        info!("成员 {} 执行 echo 命令: {}", self.local, command.text);
        Ok(EchoResponse {
            member: self.local.id.clone(),
            text: command.text,
        })
    }
}

struct Node {
    member: Member,
    factory: CommandDispatcherFactory,
    dispatcher: CommandDispatcher<EchoCommand>,
}

/// 在内存组上模拟一个N成员集群并向全组调度一条echo命令
pub async fn run_demo(config: &AppConfig, member_count: usize) -> Result<()> {
    let group = MemoryGroup::new(config.group.name.clone());
    let context = ContextId::new("web");

    let mut nodes = Vec::with_capacity(member_count);
    for i in 1..=member_count {
        let member = Member::new(format!("node-{i}"));
        let channel: Arc<dyn GroupChannel> = group.join(member.clone()).await;

        let factory = CommandDispatcherFactory::from_config(channel, config)
            .context("创建命令调度工厂失败")?;
        let dispatcher = factory
            .create_dispatcher(
                "demo-echo",
                context.clone(),
                Arc::new(EchoHandler {
                    local: member.clone(),
                }) as Arc<dyn CommandHandler<EchoCommand>>,
            )
            .await
            .context("创建调度器失败")?;

        nodes.push(Node {
            member,
            factory,
            dispatcher,
        });
    }

    let view = group.current_view().await;
    info!("视图 {} 已安装: {} 个成员", view.id, view.len());

    let first = &nodes[0];
    info!("成员 {} 向全组调度 echo 命令", first.member);
    let outcomes = first
        .dispatcher
        .dispatch_to_all(
            &EchoCommand {
                text: "你好, 集群".to_string(),
            },
            Some(Duration::from_secs(5)),
        )
        .await
        .context("调度失败")?;

    let mut sorted: Vec<_> = outcomes.into_iter().collect();
    sorted.sort_by(|(a, _), (b, _)| a.cmp(b));
    for (member, outcome) in sorted {
        match outcome {
            Ok(response) => info!("成员 {} 响应: {}", member, response.text),
            Err(e) => warn!("成员 {} 失败: {}", member, e),
        }
    }

    for node in &nodes {
        node.dispatcher.close().await;
        node.factory.close().await;
    }
    info!("演示结束");

    Ok(())
}
