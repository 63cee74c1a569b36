// 流水线节点与事件游标
//
// - `EngineHandlerContext` 是链路中的节点：名称 + 处理器引用，由流水线独占持有；
// - `ChainContext` 是一次事件传播中的游标：借用当前链路快照与下标，前驱/后继通过下标计算，
//   链路本身不存在指针环；
// - 事件越过 tail（读）或 head（写）时落入本文件末尾的终端行为。
use alloc::{format, string::String, sync::Arc};
use core::fmt;

use bytes::Bytes;

use crate::engine::Engine;
use crate::envelope::{HeaderEnvelope, IncomingAmqpEnvelope, OutgoingAmqpEnvelope, SaslEnvelope};
use crate::error::{EngineError, Result};

use super::handler::EngineHandler;

/// 流水线节点。
pub struct EngineHandlerContext {
    name: String,
    handler: Arc<dyn EngineHandler>,
}

impl EngineHandlerContext {
    pub(crate) fn new(name: String, handler: Arc<dyn EngineHandler>) -> Self {
        Self { name, handler }
    }

    /// 节点名称，在流水线内唯一。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 节点持有的处理器。
    pub fn handler(&self) -> &Arc<dyn EngineHandler> {
        &self.handler
    }

    /// 是否持有同一个处理器实例（按地址比较）。
    pub fn holds(&self, handler: &Arc<dyn EngineHandler>) -> bool {
        core::ptr::addr_eq(Arc::as_ptr(&self.handler), Arc::as_ptr(handler))
    }
}

impl fmt::Debug for EngineHandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandlerContext")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub(crate) enum InboundEvent {
    Bytes(Bytes),
    Header(HeaderEnvelope),
    Sasl(SaslEnvelope),
    Amqp(IncomingAmqpEnvelope),
}

pub(crate) enum OutboundEvent {
    Header(HeaderEnvelope),
    Sasl(SaslEnvelope),
    Amqp(OutgoingAmqpEnvelope),
    Bytes(Bytes),
}

/// 事件传播游标，处理器通过它把事件交给相邻节点。
///
/// # 契约说明（What）
/// - `fire_read_*` 交给后继节点；越过 tail 时原始字节视为错误（没有解码器），信封被丢弃；
/// - `fire_write_*` 交给前驱节点；越过 head 时字节交给引擎输出，其余信封视为错误（没有编码器）；
/// - 游标只在一次回调内有效，不可跨回调保存。
#[derive(Clone, Copy)]
pub struct ChainContext<'a> {
    engine: &'a Engine,
    chain: &'a [Arc<EngineHandlerContext>],
    index: usize,
}

impl<'a> ChainContext<'a> {
    /// 所属引擎。
    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    /// 当前节点。
    pub fn context(&self) -> &'a EngineHandlerContext {
        &self.chain[self.index]
    }

    /// 当前节点名称。
    pub fn name(&self) -> &'a str {
        self.context().name()
    }

    /// 后继节点，位于 tail 时为 `None`。
    pub fn next(&self) -> Option<&'a EngineHandlerContext> {
        self.chain.get(self.index + 1).map(Arc::as_ref)
    }

    /// 前驱节点，位于 head 时为 `None`。
    pub fn previous(&self) -> Option<&'a EngineHandlerContext> {
        self.index
            .checked_sub(1)
            .and_then(|index| self.chain.get(index))
            .map(Arc::as_ref)
    }

    /// 把原始字节交给后继节点。
    pub fn fire_read_bytes(&self, bytes: Bytes) -> Result<()> {
        propagate_inbound(
            self.engine,
            self.chain,
            self.index + 1,
            InboundEvent::Bytes(bytes),
        )
    }

    /// 把协议头交给后继节点。
    pub fn fire_read_header(&self, header: HeaderEnvelope) -> Result<()> {
        propagate_inbound(
            self.engine,
            self.chain,
            self.index + 1,
            InboundEvent::Header(header),
        )
    }

    /// 把 SASL 帧交给后继节点。
    pub fn fire_read_sasl(&self, frame: SaslEnvelope) -> Result<()> {
        propagate_inbound(
            self.engine,
            self.chain,
            self.index + 1,
            InboundEvent::Sasl(frame),
        )
    }

    /// 把 AMQP 帧交给后继节点。
    pub fn fire_read_amqp(&self, frame: IncomingAmqpEnvelope) -> Result<()> {
        propagate_inbound(
            self.engine,
            self.chain,
            self.index + 1,
            InboundEvent::Amqp(frame),
        )
    }

    /// 把协议头交给前驱节点。
    pub fn fire_write_header(&self, header: HeaderEnvelope) -> Result<()> {
        propagate_outbound(
            self.engine,
            self.chain,
            self.index.checked_sub(1),
            OutboundEvent::Header(header),
        )
    }

    /// 把 SASL 帧交给前驱节点。
    pub fn fire_write_sasl(&self, frame: SaslEnvelope) -> Result<()> {
        propagate_outbound(
            self.engine,
            self.chain,
            self.index.checked_sub(1),
            OutboundEvent::Sasl(frame),
        )
    }

    /// 把 AMQP 帧交给前驱节点。
    pub fn fire_write_amqp(&self, frame: OutgoingAmqpEnvelope) -> Result<()> {
        propagate_outbound(
            self.engine,
            self.chain,
            self.index.checked_sub(1),
            OutboundEvent::Amqp(frame),
        )
    }

    /// 把已编码字节交给前驱节点。
    pub fn fire_write_bytes(&self, bytes: Bytes) -> Result<()> {
        propagate_outbound(
            self.engine,
            self.chain,
            self.index.checked_sub(1),
            OutboundEvent::Bytes(bytes),
        )
    }

    /// 把失败通知交给后继节点。
    pub fn fire_failed(&self, error: &EngineError) {
        propagate_failure(self.engine, self.chain, self.index + 1, error)
    }

    fn handler(&self) -> &'a dyn EngineHandler {
        self.context().handler().as_ref()
    }
}

pub(crate) fn propagate_inbound(
    engine: &Engine,
    chain: &[Arc<EngineHandlerContext>],
    index: usize,
    event: InboundEvent,
) -> Result<()> {
    if index >= chain.len() {
        return tail_inbound(event);
    }
    let ctx = ChainContext {
        engine,
        chain,
        index,
    };
    let handler = ctx.handler();
    match event {
        InboundEvent::Bytes(bytes) => handler.handle_read_bytes(&ctx, bytes),
        InboundEvent::Header(header) => handler.handle_read_header(&ctx, header),
        InboundEvent::Sasl(frame) => handler.handle_read_sasl(&ctx, frame),
        InboundEvent::Amqp(frame) => handler.handle_read_amqp(&ctx, frame),
    }
}

pub(crate) fn propagate_outbound(
    engine: &Engine,
    chain: &[Arc<EngineHandlerContext>],
    index: Option<usize>,
    event: OutboundEvent,
) -> Result<()> {
    let Some(index) = index.filter(|index| *index < chain.len()) else {
        return head_outbound(engine, event);
    };
    let ctx = ChainContext {
        engine,
        chain,
        index,
    };
    let handler = ctx.handler();
    match event {
        OutboundEvent::Header(header) => handler.handle_write_header(&ctx, header),
        OutboundEvent::Sasl(frame) => handler.handle_write_sasl(&ctx, frame),
        OutboundEvent::Amqp(frame) => handler.handle_write_amqp(&ctx, frame),
        OutboundEvent::Bytes(bytes) => handler.handle_write_bytes(&ctx, bytes),
    }
}

pub(crate) fn propagate_failure(
    engine: &Engine,
    chain: &[Arc<EngineHandlerContext>],
    index: usize,
    error: &EngineError,
) {
    if index >= chain.len() {
        return;
    }
    let ctx = ChainContext {
        engine,
        chain,
        index,
    };
    ctx.handler().engine_failed(&ctx, error);
}

fn tail_inbound(event: InboundEvent) -> Result<()> {
    match event {
        InboundEvent::Bytes(bytes) => Err(EngineError::engine_failure(format!(
            "no handler in the pipeline consumed {} inbound bytes",
            bytes.len()
        ))),
        InboundEvent::Header(header) => {
            tracing::trace!(header = ?header.kind(), "inbound header reached the pipeline tail");
            Ok(())
        }
        InboundEvent::Sasl(frame) => {
            tracing::trace!(
                performative = frame.body().kind().name(),
                "inbound SASL frame reached the pipeline tail"
            );
            Ok(())
        }
        InboundEvent::Amqp(frame) => {
            tracing::trace!(
                channel = frame.channel(),
                performative = frame.body().map(|body| body.kind().name()),
                "inbound AMQP frame reached the pipeline tail"
            );
            Ok(())
        }
    }
}

fn head_outbound(engine: &Engine, event: OutboundEvent) -> Result<()> {
    let unencoded = match event {
        OutboundEvent::Bytes(bytes) => {
            engine.emit_output(bytes);
            return Ok(());
        }
        OutboundEvent::Header(_) => "protocol header",
        OutboundEvent::Sasl(_) => "SASL frame",
        OutboundEvent::Amqp(_) => "AMQP frame",
    };
    Err(EngineError::engine_failure(format!(
        "no frame encoder in the pipeline for outbound {unencoded}"
    )))
}
