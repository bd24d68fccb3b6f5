use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use clustercmd_core::{
    Command, CommandHandler, DispatchError, DispatchResult, EnvelopeKind, ForkId, GroupChannel,
    Marshaller, Member, PayloadBody, WireEnvelope,
};

use crate::context::{ContextEvent, DispatchContext};
use crate::fork::{ForkRegistry, RoutedMessage};

/// 调度器的共享内部状态
pub(crate) struct DispatcherInner {
    pub fork: ForkId,
    pub channel: Arc<dyn GroupChannel>,
    pub marshaller: Arc<dyn Marshaller>,
    pub default_timeout: Duration,
    pub forks: ForkRegistry,
    pub pending: Mutex<HashMap<Uuid, mpsc::UnboundedSender<ContextEvent>>>,
    pub closed: Arc<watch::Sender<bool>>,
}

/// 命令调度器
///
/// 一个fork上的请求/响应引擎：把命令发给目标成员集，在截止时间
/// 内等待按关联标识匹配的响应，返回每个成员的结果或失败。同一
/// 调度器上的并发调度各自持有独立的调度上下文。
pub struct CommandDispatcher<C: Command> {
    inner: Arc<DispatcherInner>,
    _command: PhantomData<fn() -> C>,
}

impl<C: Command> std::fmt::Debug for CommandDispatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("fork", &self.inner.fork)
            .finish_non_exhaustive()
    }
}

impl<C: Command> CommandDispatcher<C> {
    pub(crate) fn new(inner: Arc<DispatcherInner>) -> Self {
        Self {
            inner,
            _command: PhantomData,
        }
    }

    pub fn fork(&self) -> &ForkId {
        &self.inner.fork
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// 向目标成员集调度一条命令
    ///
    /// 返回的映射为每个目标成员给出一个结果项：成功响应、成员
    /// 级失败（超时、离群、解码失败、远端失败）之一。单个成员的
    /// 失败从不使整次调度失败；只有取消和同步的编码失败会作为
    /// 整体错误返回。空目标集立即返回空映射，不发送任何消息。
    pub async fn dispatch(
        &self,
        command: &C,
        targets: &[Member],
        timeout: Option<Duration>,
    ) -> DispatchResult<HashMap<Member, DispatchResult<C::Response>>> {
        if *self.inner.closed.borrow() {
            return Err(DispatchError::Cancelled);
        }

        if targets.is_empty() {
            return Ok(HashMap::new());
        }

        // 编码失败在任何网络交互之前同步上报
        let payload = self.encode_command(command)?;

        let correlation = Uuid::new_v4();
        let envelope = WireEnvelope::new(
            self.inner.fork.clone(),
            correlation,
            EnvelopeKind::Command,
            payload,
        );
        let bytes = envelope.encode()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        {
            let mut pending = self.inner.pending.lock().await;
            pending.insert(correlation, events_tx);
        }

        // 先订阅视图和关闭信号再发送，发送窗口内的变更不会丢失
        let views = self.inner.channel.subscribe_views();
        let closed = self.inner.closed.subscribe();
        let deadline = Instant::now() + timeout.unwrap_or(self.inner.default_timeout);

        let mut context = DispatchContext::new(targets.iter().cloned());
        for member in targets {
            if let Err(e) = self.inner.channel.send(member, bytes.clone()).await {
                warn!("向成员 {} 发送命令失败: {}", member, e);
                context.record(member.clone(), Err(DispatchError::Channel(e.to_string())));
            }
        }

        debug!(
            "调度命令 {}: fork={} correlation={} targets={}",
            C::name(),
            self.inner.fork,
            correlation,
            targets.len()
        );

        let result = context.run(events_rx, views, closed, deadline).await;

        {
            let mut pending = self.inner.pending.lock().await;
            pending.remove(&correlation);
        }

        let outcomes = result?;
        Ok(Self::into_typed(outcomes))
    }

    /// 向当前视图的全部成员调度一条命令
    ///
    /// 目标集是调用时刻的视图快照；之后的成员变更不会追加或移除
    /// 目标。
    pub async fn dispatch_to_all(
        &self,
        command: &C,
        timeout: Option<Duration>,
    ) -> DispatchResult<HashMap<Member, DispatchResult<C::Response>>> {
        let view = self.inner.channel.current_view().await;
        self.dispatch(command, &view.members, timeout).await
    }

    /// 关闭调度器
    ///
    /// 取消本调度器全部在途的调度上下文，阻塞中的调用方立即以
    /// 取消错误返回；已发出的网络消息不会被撤回。幂等。
    pub async fn close(&self) {
        if self.inner.closed.send_replace(true) {
            return;
        }
        self.inner.forks.remove(&self.inner.fork).await;
        debug!("调度器 fork={} 已关闭", self.inner.fork);
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    fn encode_command(&self, command: &C) -> DispatchResult<Vec<u8>> {
        let value =
            serde_json::to_value(command).map_err(|e| DispatchError::Encoding(e.to_string()))?;
        let body = serde_json::to_value(PayloadBody::new(C::name(), value))
            .map_err(|e| DispatchError::Encoding(e.to_string()))?;
        self.inner.marshaller.marshal(&body)
    }

    /// 将结构化结果转换为类型化响应；转换失败只影响该成员的结果项
    fn into_typed(
        outcomes: HashMap<Member, DispatchResult<serde_json::Value>>,
    ) -> HashMap<Member, DispatchResult<C::Response>> {
        outcomes
            .into_iter()
            .map(|(member, outcome)| {
                let typed = outcome.and_then(|value| {
                    serde_json::from_value::<C::Response>(value)
                        .map_err(|e| DispatchError::Decoding(e.to_string()))
                });
                (member, typed)
            })
            .collect()
    }
}

/// 调度端点的服务任务
///
/// 消费路由到本fork的入站消息：命令交给注册的处理器执行并回送
/// 响应，响应按关联标识投递给对应的在途调度上下文。
pub(crate) async fn run_service<C: Command>(
    inner: Arc<DispatcherInner>,
    handler: Arc<dyn CommandHandler<C>>,
    mut inbox: mpsc::UnboundedReceiver<RoutedMessage>,
) {
    let mut closed = inner.closed.subscribe();
    loop {
        tokio::select! {
            _ = closed.changed() => {
                if *closed.borrow() {
                    break;
                }
            }
            routed = inbox.recv() => match routed {
                Some(message) => handle_routed(&inner, &handler, message).await,
                None => break,
            },
        }
    }
    debug!("调度端点 fork={} 的服务任务退出", inner.fork);
}

async fn handle_routed<C: Command>(
    inner: &Arc<DispatcherInner>,
    handler: &Arc<dyn CommandHandler<C>>,
    message: RoutedMessage,
) {
    match message.envelope.kind {
        EnvelopeKind::Command => {
            // 慢命令不能阻塞本fork的路由，放到独立任务中执行
            let inner = Arc::clone(inner);
            let handler = Arc::clone(handler);
            tokio::spawn(async move {
                execute_command(inner, handler, message).await;
            });
        }
        EnvelopeKind::Result | EnvelopeKind::Failure => deliver_response(inner, message).await,
    }
}

/// 执行入站命令并把结果（或捕获的失败）回送给发起方
async fn execute_command<C: Command>(
    inner: Arc<DispatcherInner>,
    handler: Arc<dyn CommandHandler<C>>,
    message: RoutedMessage,
) {
    let RoutedMessage { sender, envelope } = message;
    let correlation = envelope.correlation;

    let reply = match decode_command::<C>(&inner, &envelope) {
        Ok(command) => match handler.execute(command).await {
            Ok(response) => encode_response::<C>(&inner, &response),
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };

    let (kind, payload) = match reply {
        Ok(payload) => (EnvelopeKind::Result, payload),
        Err(e) => {
            debug!("命令 {} 执行失败: {}", C::name(), e);
            match encode_failure::<C>(&inner, &e) {
                Ok(payload) => (EnvelopeKind::Failure, payload),
                Err(encode_err) => {
                    warn!("无法编码失败响应: {}", encode_err);
                    return;
                }
            }
        }
    };

    let reply_envelope = WireEnvelope::new(inner.fork.clone(), correlation, kind, payload);
    match reply_envelope.encode() {
        Ok(bytes) => {
            if let Err(e) = inner.channel.send(&sender, bytes).await {
                warn!("向成员 {} 回送响应失败: {}", sender, e);
            }
        }
        Err(e) => warn!("响应信封编码失败: {}", e),
    }
}

/// 把响应投递给按关联标识匹配的在途调度；无匹配的响应被丢弃
async fn deliver_response(inner: &Arc<DispatcherInner>, message: RoutedMessage) {
    let RoutedMessage { sender, envelope } = message;

    let pending = inner.pending.lock().await;
    let Some(events) = pending.get(&envelope.correlation) else {
        debug!(
            "忽略已终结调度的响应: correlation={} sender={}",
            envelope.correlation, sender
        );
        return;
    };

    let result = match envelope.kind {
        EnvelopeKind::Result => decode_response(inner, &envelope),
        EnvelopeKind::Failure => Err(decode_failure(inner, &envelope)),
        EnvelopeKind::Command => {
            debug!("忽略路由错误的命令信封: correlation={}", envelope.correlation);
            return;
        }
    };

    if events
        .send(ContextEvent::Response {
            member: sender,
            result,
        })
        .is_err()
    {
        debug!("调度上下文已退出，丢弃响应");
    }
}

fn decode_command<C: Command>(
    inner: &DispatcherInner,
    envelope: &WireEnvelope,
) -> DispatchResult<C> {
    let value = inner.marshaller.unmarshal(&envelope.payload)?;
    let body: PayloadBody =
        serde_json::from_value(value).map_err(|e| DispatchError::Decoding(e.to_string()))?;

    if body.command != C::name() {
        return Err(DispatchError::Decoding(format!(
            "命令名不匹配: 期望 {}, 收到 {}",
            C::name(),
            body.command
        )));
    }

    serde_json::from_value(body.value).map_err(|e| DispatchError::Decoding(e.to_string()))
}

fn decode_response(inner: &Arc<DispatcherInner>, envelope: &WireEnvelope) -> DispatchResult<serde_json::Value> {
    let value = inner.marshaller.unmarshal(&envelope.payload)?;
    let body: PayloadBody =
        serde_json::from_value(value).map_err(|e| DispatchError::Decoding(e.to_string()))?;
    Ok(body.value)
}

fn encode_response<C: Command>(
    inner: &DispatcherInner,
    response: &C::Response,
) -> DispatchResult<Vec<u8>> {
    let value =
        serde_json::to_value(response).map_err(|e| DispatchError::Encoding(e.to_string()))?;
    let body = serde_json::to_value(PayloadBody::new(C::name(), value))
        .map_err(|e| DispatchError::Encoding(e.to_string()))?;
    inner.marshaller.marshal(&body)
}

fn encode_failure<C: Command>(
    inner: &DispatcherInner,
    error: &DispatchError,
) -> DispatchResult<Vec<u8>> {
    let body = serde_json::to_value(PayloadBody::new(
        C::name(),
        serde_json::Value::String(error.to_string()),
    ))
    .map_err(|e| DispatchError::Encoding(e.to_string()))?;
    inner.marshaller.marshal(&body)
}

fn decode_failure(inner: &Arc<DispatcherInner>, envelope: &WireEnvelope) -> DispatchError {
    match inner.marshaller.unmarshal(&envelope.payload) {
        Ok(value) => match serde_json::from_value::<PayloadBody>(value) {
            Ok(body) => match body.value {
                serde_json::Value::String(message) => DispatchError::Remote(message),
                other => DispatchError::Remote(other.to_string()),
            },
            Err(e) => DispatchError::Decoding(e.to_string()),
        },
        Err(e) => e,
    }
}
