use alloc::{format, sync::Arc};

use bytes::{Buf, Bytes, BytesMut};
use spin::Mutex;

use crate::buffer::{hex_preview, read_u16_be, read_u32_be};
use crate::configuration::FrameLimits;
use crate::envelope::{
    FrameType, HEADER_SIZE, HeaderEnvelope, HeaderKind, IncomingAmqpEnvelope, SaslEnvelope,
};
use crate::error::{EngineError, Result};
use crate::performative::{DescribedTypeCodec, Performative, PerformativeCodec, PerformativeKind};
use crate::pipeline::{ChainContext, EngineHandler};

/// 固定帧头长度，同时也是最小帧长与最小数据偏移。
pub const FRAME_HEADER_SIZE: usize = 8;

/// 解析器产出的单个协议事件。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameEvent {
    /// 协议头。
    Header(HeaderEnvelope),
    /// SASL 帧。
    Sasl(SaslEnvelope),
    /// AMQP 帧。
    Amqp(IncomingAmqpEnvelope),
}

/// 解析器状态。
#[derive(Clone, Debug)]
enum ParserState {
    ExpectingHeader,
    ExpectingFrameHeader,
    ExpectingFrameBody {
        size: u32,
        data_offset: usize,
        frame_type: FrameType,
        channel: u16,
    },
    Failed(EngineError),
}

/// 协议头与帧头解析状态机。
///
/// # 契约说明（What）
/// - 输入通过 [`FrameParser::append`] 追加，事件通过 [`FrameParser::next_event`] 逐个取出；
///   字节如何被切分不影响产出的事件序列；
/// - 帧头的校验顺序固定：帧长下限、数据偏移下限、数据偏移不超过帧长、帧长上限、帧类型；
///   任何违规都在帧体被解释之前报告；
/// - 进入 `Failed` 后状态不可恢复，`append` 与 `next_event` 都返回同一份已存储的错误。
///
/// # 执行逻辑（How）
/// 1. `ExpectingHeader`：凑满 8 字节后与两种规范协议头逐字节比较；
/// 2. `ExpectingFrameHeader`：凑满 8 字节后读取帧长、DOFF、类型与通道并校验，帧头留在缓冲中；
/// 3. `ExpectingFrameBody`：凑满整帧后以 `split_to(size).freeze()` 切出，跳过扩展帧头，
///    把剩余部分交给 [`PerformativeCodec`]，未被 performative 占用的尾部作为负载视图；
/// 4. 携带 `sasl-outcome` 的 SASL 帧发出后回到 `ExpectingHeader`，此后只接受 AMQP 协议头。
#[derive(Debug)]
pub struct FrameParser {
    state: ParserState,
    buffer: BytesMut,
    negotiated: Option<HeaderKind>,
    sasl_completed: bool,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// 构造处于 `ExpectingHeader` 的解析器。
    pub fn new() -> Self {
        Self {
            state: ParserState::ExpectingHeader,
            buffer: BytesMut::new(),
            negotiated: None,
            sasl_completed: false,
        }
    }

    /// 追加输入。失败态下拒绝并返回已存储的错误。
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if let ParserState::Failed(error) = &self.state {
            return Err(error.clone());
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// 取出下一个完整事件；缓冲不足时返回 `Ok(None)`。
    pub fn next_event(
        &mut self,
        limits: FrameLimits,
        codec: &dyn PerformativeCodec,
    ) -> Result<Option<FrameEvent>> {
        loop {
            match self.state.clone() {
                ParserState::Failed(error) => return Err(error),
                ParserState::ExpectingHeader => return self.parse_header(),
                ParserState::ExpectingFrameHeader => {
                    if !self.parse_frame_header(limits)? {
                        return Ok(None);
                    }
                }
                ParserState::ExpectingFrameBody {
                    size,
                    data_offset,
                    frame_type,
                    channel,
                } => {
                    return self.parse_frame_body(size, data_offset, frame_type, channel, codec);
                }
            }
        }
    }

    /// 是否已进入失败态。
    pub fn is_failed(&self) -> bool {
        matches!(self.state, ParserState::Failed(_))
    }

    /// 失败态下存储的错误。
    pub fn failure(&self) -> Option<&EngineError> {
        match &self.state {
            ParserState::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// 协商出的协议头类型；SASL 结束后重置为 `None`，直到 AMQP 协议头到达。
    pub fn negotiated(&self) -> Option<HeaderKind> {
        self.negotiated
    }

    /// 尚未消费的字节数。
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn parse_header(&mut self) -> Result<Option<FrameEvent>> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }
        let kind = match HeaderKind::match_header(&self.buffer[..HEADER_SIZE]) {
            Some(HeaderKind::Sasl) if self.sasl_completed => {
                return Err(self.fail(EngineError::protocol_violation(
                    "unexpected SASL protocol header after SASL negotiation completed",
                )));
            }
            Some(kind) => kind,
            None => {
                let preview = hex_preview(&self.buffer[..HEADER_SIZE]);
                return Err(self.fail(EngineError::protocol_violation(format!(
                    "malformed protocol header: {preview}"
                ))));
            }
        };
        self.buffer.advance(HEADER_SIZE);
        self.negotiated = Some(kind);
        self.state = ParserState::ExpectingFrameHeader;
        Ok(Some(FrameEvent::Header(HeaderEnvelope::new(kind))))
    }

    /// 校验帧头；返回 `false` 表示字节不足。
    fn parse_frame_header(&mut self, limits: FrameLimits) -> Result<bool> {
        if self.buffer.len() < FRAME_HEADER_SIZE {
            return Ok(false);
        }
        let size = read_u32_be(&self.buffer, 0);
        let data_offset = usize::from(self.buffer[4]) * 4;
        let raw_type = self.buffer[5];
        let channel = read_u16_be(&self.buffer, 6);

        if (size as usize) < FRAME_HEADER_SIZE {
            return Err(self.fail(EngineError::protocol_violation(format!(
                "frame size {size} smaller than minimum {FRAME_HEADER_SIZE}"
            ))));
        }
        if data_offset < FRAME_HEADER_SIZE {
            return Err(self.fail(EngineError::protocol_violation(format!(
                "data offset {data_offset} smaller than minimum {FRAME_HEADER_SIZE}"
            ))));
        }
        if data_offset > size as usize {
            return Err(self.fail(EngineError::protocol_violation(format!(
                "data offset {data_offset} larger than the frame size {size}"
            ))));
        }
        let limit = match self.negotiated {
            Some(HeaderKind::Sasl) => limits.sasl_max_frame_size,
            _ => limits.max_frame_size,
        };
        if size > limit {
            return Err(self.fail(EngineError::protocol_violation(format!(
                "frame size {size} larger than maximum frame size {limit}"
            ))));
        }
        let Some(frame_type) = FrameType::from_u8(raw_type) else {
            return Err(self.fail(EngineError::protocol_violation(format!(
                "unknown frame type {raw_type}"
            ))));
        };
        let expected = self.negotiated.map(HeaderKind::frame_type);
        if expected != Some(frame_type) {
            return Err(self.fail(EngineError::protocol_violation(format!(
                "unexpected frame type {raw_type} after {} protocol header",
                header_name(self.negotiated)
            ))));
        }

        self.state = ParserState::ExpectingFrameBody {
            size,
            data_offset,
            frame_type,
            channel,
        };
        Ok(true)
    }

    fn parse_frame_body(
        &mut self,
        size: u32,
        data_offset: usize,
        frame_type: FrameType,
        channel: u16,
        codec: &dyn PerformativeCodec,
    ) -> Result<Option<FrameEvent>> {
        let frame_len = size as usize;
        if self.buffer.len() < frame_len {
            return Ok(None);
        }
        let frame = self.buffer.split_to(frame_len).freeze();
        self.state = ParserState::ExpectingFrameHeader;
        let body = frame.slice(data_offset..);

        let event = match frame_type {
            FrameType::Amqp => self.amqp_frame(channel, size, body, codec)?,
            FrameType::Sasl => self.sasl_frame(body, codec)?,
        };
        Ok(Some(event))
    }

    fn amqp_frame(
        &mut self,
        channel: u16,
        size: u32,
        body: Bytes,
        codec: &dyn PerformativeCodec,
    ) -> Result<FrameEvent> {
        if body.is_empty() {
            return Ok(FrameEvent::Amqp(IncomingAmqpEnvelope::new(
                channel, size, None, None,
            )));
        }
        let (performative, payload) = self.decode_body(FrameType::Amqp, &body, codec)?;
        Ok(FrameEvent::Amqp(IncomingAmqpEnvelope::new(
            channel,
            size,
            Some(performative),
            payload,
        )))
    }

    fn sasl_frame(&mut self, body: Bytes, codec: &dyn PerformativeCodec) -> Result<FrameEvent> {
        if body.is_empty() {
            return Err(self.fail(EngineError::protocol_violation(
                "empty SASL frame is not permitted",
            )));
        }
        let (performative, payload) = self.decode_body(FrameType::Sasl, &body, codec)?;
        if let Some(payload) = payload {
            return Err(self.fail(EngineError::protocol_violation(format!(
                "SASL frame carries {} trailing bytes after the performative",
                payload.len()
            ))));
        }
        if performative.kind() == PerformativeKind::SaslOutcome {
            self.sasl_completed = true;
            self.negotiated = None;
            self.state = ParserState::ExpectingHeader;
        }
        Ok(FrameEvent::Sasl(SaslEnvelope::new(performative)))
    }

    fn decode_body(
        &mut self,
        frame_type: FrameType,
        body: &Bytes,
        codec: &dyn PerformativeCodec,
    ) -> Result<(Performative, Option<Bytes>)> {
        let (performative, consumed) = match codec.decode(frame_type, body) {
            Ok(decoded) => decoded,
            Err(error) => return Err(self.fail(error)),
        };
        if consumed > body.len() {
            return Err(self.fail(EngineError::decode(format!(
                "performative decoder consumed {consumed} bytes of a {} byte frame body",
                body.len()
            ))));
        }
        let payload = (consumed < body.len()).then(|| body.slice(consumed..));
        Ok((performative, payload))
    }

    fn fail(&mut self, error: EngineError) -> EngineError {
        self.buffer.clear();
        self.state = ParserState::Failed(error.clone());
        error
    }
}

fn header_name(kind: Option<HeaderKind>) -> &'static str {
    match kind {
        Some(HeaderKind::Amqp) => "AMQP",
        Some(HeaderKind::Sasl) => "SASL",
        None => "no",
    }
}

/// 把原始字节解码为协议事件的流水线处理器。
///
/// # 契约说明（What）
/// - 消费 `handle_read_bytes`，向后继节点发出 `fire_read_header` / `fire_read_sasl` / `fire_read_amqp`；
/// - 帧长上限在每个帧头处从 [`Engine::frame_limits`](crate::Engine::frame_limits) 读取，
///   因此协商后调整上限会立即生效；
/// - 解析失败后，后续每一次读入都返回同一份错误。
///
/// # 执行逻辑（How）
/// - 解析器受 `spin::Mutex` 保护，每取出一个事件即释放锁再向下游发出，下游处理器可以重入引擎。
pub struct FrameDecodingHandler {
    parser: Mutex<FrameParser>,
    codec: Arc<dyn PerformativeCodec>,
}

impl Default for FrameDecodingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecodingHandler {
    /// 使用 [`DescribedTypeCodec`] 解码帧体。
    pub fn new() -> Self {
        Self::with_codec(Arc::new(DescribedTypeCodec::new()))
    }

    /// 使用自定义 performative 解码器。
    pub fn with_codec(codec: Arc<dyn PerformativeCodec>) -> Self {
        Self {
            parser: Mutex::new(FrameParser::new()),
            codec,
        }
    }

    /// 解析器是否已进入失败态。
    pub fn is_failed(&self) -> bool {
        self.parser.lock().is_failed()
    }
}

impl EngineHandler for FrameDecodingHandler {
    fn handle_read_bytes(&self, ctx: &ChainContext<'_>, bytes: Bytes) -> Result<()> {
        self.parser.lock().append(&bytes)?;
        loop {
            let limits = ctx.engine().frame_limits();
            let event = self.parser.lock().next_event(limits, self.codec.as_ref())?;
            match event {
                None => return Ok(()),
                Some(FrameEvent::Header(header)) => ctx.fire_read_header(header)?,
                Some(FrameEvent::Sasl(frame)) => ctx.fire_read_sasl(frame)?,
                Some(FrameEvent::Amqp(frame)) => ctx.fire_read_amqp(frame)?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::error::ErrorKind;
    use crate::envelope::AMQP_HEADER;

    fn drain(parser: &mut FrameParser) -> Result<Vec<FrameEvent>> {
        let codec = DescribedTypeCodec::new();
        let mut events = Vec::new();
        while let Some(event) = parser.next_event(FrameLimits::default(), &codec)? {
            events.push(event);
        }
        Ok(events)
    }

    fn violation_for(frame_header: [u8; 8]) -> EngineError {
        let mut parser = FrameParser::new();
        parser.append(&AMQP_HEADER).expect("追加协议头失败");
        parser.append(&frame_header).expect("追加帧头失败");
        drain(&mut parser).expect_err("非法帧头必须被拒绝")
    }

    #[test]
    fn partial_header_waits_for_more_input() {
        let mut parser = FrameParser::new();
        parser.append(b"AMQP").expect("追加失败");
        assert!(drain(&mut parser).expect("不应失败").is_empty());
        assert_eq!(parser.buffered(), 4);
        parser.append(&[0, 1, 0, 0]).expect("追加失败");
        assert_eq!(
            drain(&mut parser).expect("不应失败"),
            vec![FrameEvent::Header(HeaderEnvelope::AMQP)]
        );
        assert_eq!(parser.negotiated(), Some(HeaderKind::Amqp));
    }

    #[test]
    fn frame_header_checks_run_in_order() {
        let error = violation_for([0, 0, 0, 7, 2, 0, 0, 0]);
        assert_eq!(error.kind(), ErrorKind::ProtocolViolation);
        assert!(error.message().contains("frame size 7 smaller than minimum"));

        let error = violation_for([0, 0, 0, 8, 1, 0, 0, 0]);
        assert!(error.message().contains("data offset 4 smaller than minimum"));

        let error = violation_for([0, 0, 0, 8, 3, 0, 0, 0]);
        assert!(
            error
                .message()
                .contains("data offset 12 larger than the frame size 8")
        );

        let error = violation_for([0xa0, 0, 0, 0, 2, 0, 0, 0]);
        assert!(error.message().contains("2684354560"));
        assert!(error.message().contains("larger than maximum frame size"));

        let error = violation_for([0, 0, 0, 8, 2, 7, 0, 0]);
        assert!(error.message().contains("unknown frame type 7"));

        let error = violation_for([0, 0, 0, 8, 2, 1, 0, 0]);
        assert!(error.message().contains("unexpected frame type 1"));
    }

    #[test]
    fn failed_parser_rejects_every_later_input() {
        let mut parser = FrameParser::new();
        parser.append(b"HTTP/1.1").expect("追加失败");
        let first = drain(&mut parser).expect_err("非法协议头必须被拒绝");
        assert!(first.message().starts_with("malformed protocol header"));
        assert!(parser.is_failed());
        assert_eq!(parser.buffered(), 0);

        let second = parser.append(&AMQP_HEADER).expect_err("失败态必须拒绝输入");
        assert_eq!(second, first);
        assert_eq!(drain(&mut parser).expect_err("失败态必须拒绝解析"), first);
        assert_eq!(parser.failure(), Some(&first));
    }

    #[test]
    fn empty_frames_carry_no_body() {
        let mut parser = FrameParser::new();
        parser.append(&AMQP_HEADER).expect("追加失败");
        parser
            .append(&[0, 0, 0, 8, 2, 0, 0, 5, 0, 0, 0, 12, 3, 0, 0, 6, 0xff, 0xff, 0xff, 0xff])
            .expect("追加失败");
        let events = drain(&mut parser).expect("空帧应被接受");
        assert_eq!(events.len(), 3);
        let FrameEvent::Amqp(first) = &events[1] else {
            panic!("第二个事件应为 AMQP 帧");
        };
        assert_eq!(first.channel(), 5);
        assert!(first.is_empty_frame());
        assert!(first.payload().is_none());
        let FrameEvent::Amqp(second) = &events[2] else {
            panic!("第三个事件应为 AMQP 帧");
        };
        assert_eq!(second.channel(), 6);
        assert_eq!(second.frame_size(), 12);
        assert!(second.is_empty_frame());
    }

    #[test]
    fn sasl_outcome_returns_to_header_negotiation() {
        let outcome = [0x00, 0x53, 0x44, 0x45];
        let mut parser = FrameParser::new();
        parser.append(b"AMQP\x03\x01\x00\x00").expect("追加失败");
        parser.append(&[0, 0, 0, 12, 2, 1, 0, 0]).expect("追加失败");
        parser.append(&outcome).expect("追加失败");
        let events = drain(&mut parser).expect("SASL 帧应被接受");
        assert_eq!(events.len(), 2);
        let FrameEvent::Sasl(frame) = &events[1] else {
            panic!("第二个事件应为 SASL 帧");
        };
        assert_eq!(frame.body().kind(), PerformativeKind::SaslOutcome);
        assert_eq!(parser.negotiated(), None);

        parser.append(b"AMQP\x03\x01\x00\x00").expect("追加失败");
        let error = drain(&mut parser).expect_err("第二次 SASL 协议头必须被拒绝");
        assert!(error.message().contains("after SASL negotiation completed"));
    }

    #[test]
    fn empty_sasl_frame_is_a_violation() {
        let mut parser = FrameParser::new();
        parser.append(b"AMQP\x03\x01\x00\x00").expect("追加失败");
        parser.append(&[0, 0, 0, 8, 2, 1, 0, 0]).expect("追加失败");
        let error = drain(&mut parser).expect_err("空 SASL 帧必须被拒绝");
        assert_eq!(error.kind(), ErrorKind::ProtocolViolation);
    }

    #[test]
    fn sasl_limit_applies_while_negotiating() {
        let mut parser = FrameParser::new();
        parser.append(b"AMQP\x03\x01\x00\x00").expect("追加失败");
        parser.append(&[0, 0, 0x04, 0x00, 2, 1, 0, 0]).expect("追加失败");
        let error = drain(&mut parser).expect_err("超过 SASL 上限的帧必须被拒绝");
        assert!(
            error
                .message()
                .contains("frame size 1024 larger than maximum frame size 512")
        );
    }

    #[test]
    fn decode_errors_are_terminal() {
        let mut parser = FrameParser::new();
        parser.append(&AMQP_HEADER).expect("追加失败");
        parser.append(&[0, 0, 0, 9, 2, 0, 0, 0, 0x45]).expect("追加失败");
        let error = drain(&mut parser).expect_err("非 described 帧体必须被拒绝");
        assert_eq!(error.kind(), ErrorKind::Decode);
        assert!(parser.is_failed());
    }

    #[test]
    fn extended_header_is_skipped_and_payload_is_a_view() {
        let mut parser = FrameParser::new();
        parser.append(&AMQP_HEADER).expect("追加失败");
        parser
            .append(&[
                0, 0, 0, 19, 3, 0, 0, 1, 0xee, 0xee, 0xee, 0xee, 0x00, 0x53, 0x14, 0x45, b'a',
                b'b', b'c',
            ])
            .expect("追加失败");
        let events = drain(&mut parser).expect("帧应被接受");
        let FrameEvent::Amqp(frame) = &events[1] else {
            panic!("第二个事件应为 AMQP 帧");
        };
        let body = frame.body().expect("帧体应存在");
        assert_eq!(body.kind(), PerformativeKind::Transfer);
        assert_eq!(frame.payload().map(|payload| &payload[..]), Some(&b"abc"[..]));
    }
}
