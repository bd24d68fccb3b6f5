use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use clustercmd_core::{
    AppConfig, Command, CommandHandler, ContextId, DispatchError, DispatchResult, ForkId,
    GroupChannel, InboundMessage, WireEnvelope,
};
use clustercmd_marshalling::MarshallerFactory;

use crate::dispatcher::{run_service, CommandDispatcher, DispatcherInner};
use crate::fork::{ForkRegistry, ForkRoute, RoutedMessage};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// 命令调度工厂
///
/// 持有组通信通道引用、marshaller工厂和默认超时，负责创建和
/// 销毁命令调度器。多个调度器可以并存于同一条物理通道上，各自
/// 通过独立的fork标识寻址，互不相关的子系统的命令流量由此隔离。
///
/// 工厂引用而不拥有通道：每个工厂实例同一时刻只关联一条活跃
/// 通道，关闭工厂不会关闭通道本身。
pub struct CommandDispatcherFactory {
    channel: Arc<dyn GroupChannel>,
    marshaller_factory: Arc<MarshallerFactory>,
    default_timeout: Duration,
    forks: ForkRegistry,
    closed: Arc<watch::Sender<bool>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl CommandDispatcherFactory {
    pub fn new(
        channel: Arc<dyn GroupChannel>,
        marshaller_factory: Arc<MarshallerFactory>,
        default_timeout: Option<Duration>,
    ) -> Self {
        let forks = ForkRegistry::new();
        let (closed, _) = watch::channel(false);
        let closed = Arc::new(closed);

        // 在spawn之前订阅，工厂创建后立刻发出的调度不会丢响应
        let inbox = channel.subscribe();
        let receiver = tokio::spawn(run_receiver(
            Arc::clone(&channel),
            inbox,
            forks.clone(),
            closed.subscribe(),
        ));

        info!("创建命令调度工厂: group={}", channel.group());
        Self {
            channel,
            marshaller_factory,
            default_timeout: default_timeout.unwrap_or(DEFAULT_TIMEOUT),
            forks,
            closed,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// 按配置构建：marshalling配置无效时快速失败
    pub fn from_config(channel: Arc<dyn GroupChannel>, config: &AppConfig) -> DispatchResult<Self> {
        let marshaller_factory = MarshallerFactory::from_config(&config.marshalling)?;
        Ok(Self::new(
            channel,
            Arc::new(marshaller_factory),
            Some(Duration::from_secs(config.dispatch.default_timeout_seconds)),
        ))
    }

    pub fn channel(&self) -> &Arc<dyn GroupChannel> {
        &self.channel
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// 工厂的fork注册表（通道复用表）
    pub fn fork_registry(&self) -> &ForkRegistry {
        &self.forks
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// 创建一个绑定到本工厂通道的命令调度器
    ///
    /// marshaller按给定执行上下文解析，两种策略都无法产出
    /// marshaller时创建失败，不会重试。创建出的调度器继承工厂的
    /// 默认超时，调用点的显式超时优先。
    pub async fn create_dispatcher<C: Command>(
        &self,
        fork: impl Into<ForkId>,
        context: ContextId,
        handler: Arc<dyn CommandHandler<C>>,
    ) -> DispatchResult<CommandDispatcher<C>> {
        if self.is_closed() {
            return Err(DispatchError::Cancelled);
        }

        let fork = fork.into();
        if fork.is_empty() {
            return Err(DispatchError::Configuration("fork标识不能为空".to_string()));
        }

        // marshaller构建失败对调度器创建是致命的
        let marshaller = self.marshaller_factory.marshaller(&context)?;

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (dispatcher_closed, _) = watch::channel(false);
        let dispatcher_closed = Arc::new(dispatcher_closed);

        self.forks
            .register(
                fork.clone(),
                ForkRoute {
                    inbox: inbox_tx,
                    closed: Arc::clone(&dispatcher_closed),
                },
            )
            .await?;

        let inner = Arc::new(DispatcherInner {
            fork: fork.clone(),
            channel: Arc::clone(&self.channel),
            marshaller,
            default_timeout: self.default_timeout,
            forks: self.forks.clone(),
            pending: Mutex::new(HashMap::new()),
            closed: dispatcher_closed,
        });

        tokio::spawn(run_service::<C>(Arc::clone(&inner), handler, inbox_rx));

        info!("创建调度器: fork={} context={}", fork, context);
        Ok(CommandDispatcher::new(inner))
    }

    /// 关闭工厂
    ///
    /// 把它创建的全部调度器标记为已关闭（阻塞中的调用方立即以
    /// 取消错误返回），清空fork注册表，停止接收任务并释放通道
    /// 引用。不关闭底层通道本身——通道归提供它的外部协作者所有。
    /// 幂等。
    pub async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }

        for (fork, route) in self.forks.drain().await {
            route.closed.send_replace(true);
            debug!("关闭调度器: fork={}", fork);
        }

        if let Some(receiver) = self.receiver.lock().await.take() {
            if let Err(e) = receiver.await {
                warn!("接收任务异常退出: {}", e);
            }
        }

        info!("命令调度工厂已关闭: group={}", self.channel.group());
    }
}

/// 工厂的接收任务
///
/// 从通道订阅入站消息，解析信封头并按fork标识路由到对应的调度
/// 端点。未知fork的消息被静默过滤（端点可能已被移除），无法解析
/// 的消息同样丢弃，二者都不是错误。
async fn run_receiver(
    channel: Arc<dyn GroupChannel>,
    mut inbox: broadcast::Receiver<InboundMessage>,
    forks: ForkRegistry,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = closed.changed() => match changed {
                Ok(()) => {
                    if *closed.borrow() {
                        break;
                    }
                }
                // 发送端已销毁：工厂未经close就被丢弃，接收任务随之退出
                Err(_) => break,
            },
            received = inbox.recv() => match received {
                Ok(message) => route_message(&forks, message).await,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!("入站消息滞后，丢弃 {} 条", count);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("接收任务退出: group={}", channel.group());
}

async fn route_message(forks: &ForkRegistry, message: InboundMessage) {
    let envelope = match WireEnvelope::decode(&message.bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("丢弃无法解析的入站消息: sender={} {}", message.sender, e);
            return;
        }
    };

    if forks.is_unknown_fork(&envelope).await {
        debug!(
            "丢弃未知fork {} 的{}: correlation={}",
            envelope.fork,
            if envelope.is_response() { "响应" } else { "命令" },
            envelope.correlation
        );
        return;
    }

    if let Some(route) = forks.route(&envelope.fork).await {
        let routed = RoutedMessage {
            sender: message.sender,
            envelope,
        };
        if route.inbox.send(routed).is_err() {
            debug!("调度端点已退出，丢弃消息");
        }
    }
}
