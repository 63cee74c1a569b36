use bytes::Bytes;

use crate::envelope::{HeaderEnvelope, IncomingAmqpEnvelope, OutgoingAmqpEnvelope, SaslEnvelope};
use crate::error::{EngineError, Result};

use super::context::{ChainContext, EngineHandlerContext};

/// 引擎流水线中的协议处理器。
///
/// # 契约说明（What）
/// - 读事件（`handle_read_*`）沿 head → tail 传播，写事件（`handle_write_*`）沿 tail → head 传播；
/// - 每个回调的默认实现都是“原样转发给下一个节点”，处理器只覆写自己关心的事件；
/// - 返回 `Err` 会中断本次传播，错误沿调用栈回到触发点，由 [`Engine`](crate::Engine) 统一上报为引擎失败；
/// - 回调以 `&self` 调用，有状态的处理器需自行使用内部可变性，且在调用 `ctx.fire_*` 之前释放内部锁，
///   下游处理器可能重入引擎。
///
/// # 前置条件
/// - 实现必须满足 `Send + Sync + 'static`，同一实例可以以不同名称多次加入流水线。
pub trait EngineHandler: Send + Sync + 'static {
    /// 节点加入流水线后调用。
    fn handler_added(&self, _context: &EngineHandlerContext) {}

    /// 节点离开流水线后调用。
    fn handler_removed(&self, _context: &EngineHandlerContext) {}

    /// 传输层送来的原始字节。
    fn handle_read_bytes(&self, ctx: &ChainContext<'_>, bytes: Bytes) -> Result<()> {
        ctx.fire_read_bytes(bytes)
    }

    /// 解码出的协议头。
    fn handle_read_header(&self, ctx: &ChainContext<'_>, header: HeaderEnvelope) -> Result<()> {
        ctx.fire_read_header(header)
    }

    /// 解码出的 SASL 帧。
    fn handle_read_sasl(&self, ctx: &ChainContext<'_>, frame: SaslEnvelope) -> Result<()> {
        ctx.fire_read_sasl(frame)
    }

    /// 解码出的 AMQP 帧。
    fn handle_read_amqp(&self, ctx: &ChainContext<'_>, frame: IncomingAmqpEnvelope) -> Result<()> {
        ctx.fire_read_amqp(frame)
    }

    /// 待写出的协议头。
    fn handle_write_header(&self, ctx: &ChainContext<'_>, header: HeaderEnvelope) -> Result<()> {
        ctx.fire_write_header(header)
    }

    /// 待写出的 SASL 帧。
    fn handle_write_sasl(&self, ctx: &ChainContext<'_>, frame: SaslEnvelope) -> Result<()> {
        ctx.fire_write_sasl(frame)
    }

    /// 待写出的 AMQP 帧。
    fn handle_write_amqp(&self, ctx: &ChainContext<'_>, frame: OutgoingAmqpEnvelope) -> Result<()> {
        ctx.fire_write_amqp(frame)
    }

    /// 已编码、待交给传输层的字节。
    fn handle_write_bytes(&self, ctx: &ChainContext<'_>, bytes: Bytes) -> Result<()> {
        ctx.fire_write_bytes(bytes)
    }

    /// 引擎进入失败态的通知，沿 head → tail 传播，不可失败。
    fn engine_failed(&self, ctx: &ChainContext<'_>, error: &EngineError) {
        ctx.fire_failed(error)
    }
}
