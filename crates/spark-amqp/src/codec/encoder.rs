use alloc::{format, sync::Arc};

use bytes::{BufMut, Bytes, BytesMut};

use crate::envelope::{FrameType, HeaderEnvelope, OutgoingAmqpEnvelope, SaslEnvelope};
use crate::error::{EngineError, Result};
use crate::performative::{DescribedTypeCodec, Performative, PerformativeCodec};
use crate::pipeline::{ChainContext, EngineHandler};

use super::decoder::FRAME_HEADER_SIZE;

/// 出站帧固定使用的数据偏移（以 4 字节为单位），即不携带扩展帧头。
const DEFAULT_DATA_OFFSET: u8 = 2;

/// 把出站信封序列化为字节的流水线处理器。
///
/// # 契约说明（What）
/// - 协议头写出为 8 个规范字节；
/// - AMQP/SASL 帧写出为 `size | DOFF=2 | type | channel | performative | payload`，
///   空的 [`OutgoingAmqpEnvelope`] 写出为 8 字节心跳帧；
/// - 超过配置上限的帧以 `ProtocolViolation` 拒绝，不会有任何字节到达传输层；
/// - 编码结果通过 `fire_write_bytes` 交给前驱节点，最终由引擎输出。
pub struct FrameEncodingHandler {
    codec: Arc<dyn PerformativeCodec>,
}

impl Default for FrameEncodingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncodingHandler {
    /// 使用 [`DescribedTypeCodec`] 编码 performative。
    pub fn new() -> Self {
        Self::with_codec(Arc::new(DescribedTypeCodec::new()))
    }

    /// 使用自定义 performative 编码器。
    pub fn with_codec(codec: Arc<dyn PerformativeCodec>) -> Self {
        Self { codec }
    }

    /// 编码一帧并回填帧长。
    pub fn encode_frame(
        &self,
        frame_type: FrameType,
        channel: u16,
        body: Option<&Performative>,
        payload: Option<&Bytes>,
        limit: u32,
    ) -> Result<Bytes> {
        if body.is_none() && payload.is_some_and(|payload| !payload.is_empty()) {
            return Err(EngineError::encode(
                "frame payload requires a performative",
            ));
        }
        let capacity = FRAME_HEADER_SIZE
            + body.map_or(0, Performative::encoded_len)
            + payload.map_or(0, Bytes::len);
        let mut frame = BytesMut::with_capacity(capacity);
        frame.put_u32(0);
        frame.put_u8(DEFAULT_DATA_OFFSET);
        frame.put_u8(frame_type.as_u8());
        frame.put_u16(channel);
        if let Some(body) = body {
            self.codec.encode(body, &mut frame)?;
        }
        if let Some(payload) = payload {
            frame.extend_from_slice(payload);
        }

        let size = u32::try_from(frame.len())
            .ok()
            .filter(|size| *size <= limit)
            .ok_or_else(|| {
                EngineError::protocol_violation(format!(
                    "outgoing frame size {} larger than maximum frame size {limit}",
                    frame.len()
                ))
            })?;
        frame[..4].copy_from_slice(&size.to_be_bytes());
        Ok(frame.freeze())
    }
}

impl EngineHandler for FrameEncodingHandler {
    fn handle_write_header(&self, ctx: &ChainContext<'_>, header: HeaderEnvelope) -> Result<()> {
        ctx.fire_write_bytes(Bytes::from_static(header.header()))
    }

    fn handle_write_sasl(&self, ctx: &ChainContext<'_>, frame: SaslEnvelope) -> Result<()> {
        let limit = ctx.engine().frame_limits().sasl_max_frame_size;
        let bytes = self.encode_frame(
            FrameType::Sasl,
            frame.channel(),
            Some(frame.body()),
            None,
            limit,
        )?;
        ctx.fire_write_bytes(bytes)
    }

    fn handle_write_amqp(&self, ctx: &ChainContext<'_>, frame: OutgoingAmqpEnvelope) -> Result<()> {
        let limit = ctx.engine().frame_limits().max_frame_size;
        let bytes = self.encode_frame(
            FrameType::Amqp,
            frame.channel(),
            frame.body(),
            frame.payload(),
            limit,
        )?;
        ctx.fire_write_bytes(bytes)
    }
}
