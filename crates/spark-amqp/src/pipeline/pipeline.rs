use alloc::{
    format,
    string::{String, ToString},
    sync::{Arc, Weak},
    vec::Vec,
};

use arc_swap::ArcSwap;
use bytes::Bytes;
use spin::Mutex;

use crate::engine::Engine;
use crate::envelope::{HeaderEnvelope, IncomingAmqpEnvelope, OutgoingAmqpEnvelope, SaslEnvelope};
use crate::error::{EngineError, Result};

use super::context::{
    EngineHandlerContext, InboundEvent, OutboundEvent, propagate_failure, propagate_inbound,
    propagate_outbound,
};
use super::handler::EngineHandler;

/// 链路快照类型。
type Chain = Vec<Arc<EngineHandlerContext>>;

/// 引擎流水线：具名、有序、可变的处理器链。
///
/// # 契约说明（What）
/// - 名称在链路内唯一；同一处理器实例可以用不同名称加入多次，按实例移除时只移除第一个匹配节点；
/// - 读事件从 head 开始传播，写事件从 tail 开始传播；
/// - 空流水线上的 `remove*` 均为无操作，所有变更方法都返回 `&Self` 便于链式调用；
/// - 被拒绝的变更（空名称、重复名称、锚点不存在）不会改变链路。
///
/// # 执行逻辑（How）
/// 1. 链路保存在 `ArcSwap<Vec<_>>` 中，事件传播前加载一份快照，传播期间的变更只影响下一次传播；
/// 2. 变更在 `spin::Mutex` 保护下复制向量、修改后原子替换；
/// 3. `handler_added` / `handler_removed` 在提交之后、锁外回调。
///
/// # 前置条件
/// - 流水线由 [`Engine`] 构造并持有，内部以弱引用指回引擎；引擎释放后触发事件会返回 `EngineFailure`。
pub struct EnginePipeline {
    engine: Weak<Engine>,
    chain: ArcSwap<Chain>,
    mutation: Mutex<()>,
}

impl EnginePipeline {
    pub(crate) fn new(engine: Weak<Engine>) -> Self {
        Self {
            engine,
            chain: ArcSwap::from_pointee(Vec::new()),
            mutation: Mutex::new(()),
        }
    }

    /// 在 head 插入处理器。
    pub fn add_first(&self, name: &str, handler: Arc<dyn EngineHandler>) -> Result<&Self> {
        self.insert(name, handler, |_| Ok(0))
    }

    /// 在 tail 追加处理器。
    pub fn add_last(&self, name: &str, handler: Arc<dyn EngineHandler>) -> Result<&Self> {
        self.insert(name, handler, |chain| Ok(chain.len()))
    }

    /// 在名为 `anchor` 的节点之前插入。
    pub fn add_before(
        &self,
        anchor: &str,
        name: &str,
        handler: Arc<dyn EngineHandler>,
    ) -> Result<&Self> {
        self.insert(name, handler, |chain| position_of(chain, anchor))
    }

    /// 在名为 `anchor` 的节点之后插入。
    pub fn add_after(
        &self,
        anchor: &str,
        name: &str,
        handler: Arc<dyn EngineHandler>,
    ) -> Result<&Self> {
        self.insert(name, handler, |chain| {
            position_of(chain, anchor).map(|index| index + 1)
        })
    }

    /// 按名称移除；未知名称与空名称为无操作。
    pub fn remove(&self, name: &str) -> &Self {
        if !name.is_empty() {
            self.detach(|chain| chain.iter().position(|ctx| ctx.name() == name));
        }
        self
    }

    /// 按实例移除第一个持有该处理器的节点。
    pub fn remove_handler(&self, handler: &Arc<dyn EngineHandler>) -> &Self {
        self.detach(|chain| chain.iter().position(|ctx| ctx.holds(handler)));
        self
    }

    /// 移除 head。
    pub fn remove_first(&self) -> &Self {
        self.detach(|chain| (!chain.is_empty()).then_some(0));
        self
    }

    /// 移除 tail。
    pub fn remove_last(&self) -> &Self {
        self.detach(|chain| chain.len().checked_sub(1));
        self
    }

    /// head 处理器。
    pub fn first(&self) -> Option<Arc<dyn EngineHandler>> {
        self.first_context().map(|ctx| Arc::clone(ctx.handler()))
    }

    /// tail 处理器。
    pub fn last(&self) -> Option<Arc<dyn EngineHandler>> {
        self.last_context().map(|ctx| Arc::clone(ctx.handler()))
    }

    /// head 节点。
    pub fn first_context(&self) -> Option<Arc<EngineHandlerContext>> {
        self.chain.load().first().cloned()
    }

    /// tail 节点。
    pub fn last_context(&self) -> Option<Arc<EngineHandlerContext>> {
        self.chain.load().last().cloned()
    }

    /// 按名称查找节点。
    pub fn context(&self, name: &str) -> Option<Arc<EngineHandlerContext>> {
        self.chain
            .load()
            .iter()
            .find(|ctx| ctx.name() == name)
            .cloned()
    }

    /// 按名称查找处理器。
    pub fn get(&self, name: &str) -> Option<Arc<dyn EngineHandler>> {
        self.context(name).map(|ctx| Arc::clone(ctx.handler()))
    }

    /// head → tail 顺序的节点名称。
    pub fn names(&self) -> Vec<String> {
        self.chain
            .load()
            .iter()
            .map(|ctx| ctx.name().to_string())
            .collect()
    }

    /// 节点数量。
    pub fn len(&self) -> usize {
        self.chain.load().len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.chain.load().is_empty()
    }

    /// 从 head 触发原始字节读事件。
    pub fn fire_read_bytes(&self, bytes: Bytes) -> Result<()> {
        self.inbound(InboundEvent::Bytes(bytes))
    }

    /// 从 head 触发协议头读事件。
    pub fn fire_read_header(&self, header: HeaderEnvelope) -> Result<()> {
        self.inbound(InboundEvent::Header(header))
    }

    /// 从 head 触发 SASL 帧读事件。
    pub fn fire_read_sasl(&self, frame: SaslEnvelope) -> Result<()> {
        self.inbound(InboundEvent::Sasl(frame))
    }

    /// 从 head 触发 AMQP 帧读事件。
    pub fn fire_read_amqp(&self, frame: IncomingAmqpEnvelope) -> Result<()> {
        self.inbound(InboundEvent::Amqp(frame))
    }

    /// 从 tail 触发协议头写事件。
    pub fn fire_write_header(&self, header: HeaderEnvelope) -> Result<()> {
        self.outbound(OutboundEvent::Header(header))
    }

    /// 从 tail 触发 SASL 帧写事件。
    pub fn fire_write_sasl(&self, frame: SaslEnvelope) -> Result<()> {
        self.outbound(OutboundEvent::Sasl(frame))
    }

    /// 从 tail 触发 AMQP 帧写事件。
    pub fn fire_write_amqp(&self, frame: OutgoingAmqpEnvelope) -> Result<()> {
        self.outbound(OutboundEvent::Amqp(frame))
    }

    /// 从 tail 触发已编码字节写事件。
    pub fn fire_write_bytes(&self, bytes: Bytes) -> Result<()> {
        self.outbound(OutboundEvent::Bytes(bytes))
    }

    /// 从 head 广播失败通知。
    pub fn fire_failed(&self, error: &EngineError) {
        if let Some(engine) = self.engine.upgrade() {
            let chain = self.chain.load_full();
            propagate_failure(&engine, &chain, 0, error);
        }
    }

    fn inbound(&self, event: InboundEvent) -> Result<()> {
        let engine = self.engine()?;
        let chain = self.chain.load_full();
        propagate_inbound(&engine, &chain, 0, event)
    }

    fn outbound(&self, event: OutboundEvent) -> Result<()> {
        let engine = self.engine()?;
        let chain = self.chain.load_full();
        propagate_outbound(&engine, &chain, chain.len().checked_sub(1), event)
    }

    fn engine(&self) -> Result<Arc<Engine>> {
        self.engine
            .upgrade()
            .ok_or_else(|| EngineError::engine_failure("pipeline is detached from its engine"))
    }

    fn insert(
        &self,
        name: &str,
        handler: Arc<dyn EngineHandler>,
        locate: impl FnOnce(&Chain) -> Result<usize>,
    ) -> Result<&Self> {
        if name.is_empty() {
            return Err(EngineError::invalid_argument(
                "handler name must not be empty",
            ));
        }
        let added = {
            let _guard = self.mutation.lock();
            let current = self.chain.load();
            if current.iter().any(|ctx| ctx.name() == name) {
                return Err(EngineError::invalid_argument(format!(
                    "duplicate handler name '{name}'"
                )));
            }
            let index = locate(&current)?;
            let added = Arc::new(EngineHandlerContext::new(name.to_string(), handler));
            let mut chain: Chain = current.iter().cloned().collect();
            chain.insert(index, Arc::clone(&added));
            self.chain.store(Arc::new(chain));
            added
        };
        added.handler().handler_added(&added);
        Ok(self)
    }

    fn detach(&self, locate: impl FnOnce(&Chain) -> Option<usize>) {
        let removed = {
            let _guard = self.mutation.lock();
            let current = self.chain.load();
            let Some(index) = locate(&current) else {
                return;
            };
            let mut chain: Chain = current.iter().cloned().collect();
            let removed = chain.remove(index);
            self.chain.store(Arc::new(chain));
            removed
        };
        removed.handler().handler_removed(&removed);
    }
}

fn position_of(chain: &Chain, anchor: &str) -> Result<usize> {
    chain
        .iter()
        .position(|ctx| ctx.name() == anchor)
        .ok_or_else(|| EngineError::invalid_argument(format!("no handler named '{anchor}'")))
}
