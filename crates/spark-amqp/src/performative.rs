//! performative 解码边界。
//!
//! # 模块定位
//! 帧解码状态机只负责分帧；帧体中的 AMQP 类型系统由外部解码器处理。本模块定义该边界：
//! - [`PerformativeCodec`]：给定帧体视图，返回不透明的 [`Performative`] 以及它占用的字节数，剩余部分即应用负载；
//! - [`DescribedTypeCodec`]：默认实现，只“掠读”described list 的构造器与长度，不解析字段。
//!
//! # 线上格式（What）
//! ```text
//! 0x00 | descriptor (0x53 u8 | 0x80 u64 | 0x44 | 0xa3 sym8 | 0xb3 sym32) | list (0x45 | 0xc0 size8 .. | 0xd0 size32 ..)
//! ```

use alloc::{format, string::String};

use bytes::{Bytes, BytesMut};

use crate::buffer::{hex_preview, read_u32_be, read_u64_be};
use crate::envelope::FrameType;
use crate::error::{EngineError, Result};

const DESCRIBED: u8 = 0x00;
const SMALL_ULONG: u8 = 0x53;
const ULONG: u8 = 0x80;
const ULONG_ZERO: u8 = 0x44;
const SYM8: u8 = 0xa3;
const SYM32: u8 = 0xb3;
const LIST0: u8 = 0x45;
const LIST8: u8 = 0xc0;
const LIST32: u8 = 0xd0;

/// performative 的描述符。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Descriptor {
    /// 数值描述符，如 `0x10`（open）。
    Code(u64),
    /// 符号描述符，如 `amqp:open:list`。
    Symbol(Bytes),
}

/// performative 类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PerformativeKind {
    /// `0x10`
    Open,
    /// `0x11`
    Begin,
    /// `0x12`
    Attach,
    /// `0x13`
    Flow,
    /// `0x14`
    Transfer,
    /// `0x15`
    Disposition,
    /// `0x16`
    Detach,
    /// `0x17`
    End,
    /// `0x18`
    Close,
    /// `0x40`
    SaslMechanisms,
    /// `0x41`
    SaslInit,
    /// `0x42`
    SaslChallenge,
    /// `0x43`
    SaslResponse,
    /// `0x44`
    SaslOutcome,
    /// 未登记的描述符。
    Unknown(u64),
}

/// `(code, symbol, kind)` 对照表。
const KNOWN_KINDS: [(u64, &str, PerformativeKind); 14] = [
    (0x10, "amqp:open:list", PerformativeKind::Open),
    (0x11, "amqp:begin:list", PerformativeKind::Begin),
    (0x12, "amqp:attach:list", PerformativeKind::Attach),
    (0x13, "amqp:flow:list", PerformativeKind::Flow),
    (0x14, "amqp:transfer:list", PerformativeKind::Transfer),
    (0x15, "amqp:disposition:list", PerformativeKind::Disposition),
    (0x16, "amqp:detach:list", PerformativeKind::Detach),
    (0x17, "amqp:end:list", PerformativeKind::End),
    (0x18, "amqp:close:list", PerformativeKind::Close),
    (0x40, "amqp:sasl-mechanisms:list", PerformativeKind::SaslMechanisms),
    (0x41, "amqp:sasl-init:list", PerformativeKind::SaslInit),
    (0x42, "amqp:sasl-challenge:list", PerformativeKind::SaslChallenge),
    (0x43, "amqp:sasl-response:list", PerformativeKind::SaslResponse),
    (0x44, "amqp:sasl-outcome:list", PerformativeKind::SaslOutcome),
];

impl PerformativeKind {
    /// 按数值描述符识别。
    pub fn from_code(code: u64) -> Self {
        KNOWN_KINDS
            .iter()
            .find(|(known, _, _)| *known == code)
            .map(|(_, _, kind)| *kind)
            .unwrap_or(PerformativeKind::Unknown(code))
    }

    /// 按符号描述符识别；未知符号映射为 `Unknown(u64::MAX)`。
    pub fn from_symbol(symbol: &[u8]) -> Self {
        KNOWN_KINDS
            .iter()
            .find(|(_, name, _)| name.as_bytes() == symbol)
            .map(|(_, _, kind)| *kind)
            .unwrap_or(PerformativeKind::Unknown(u64::MAX))
    }

    /// 数值描述符。
    pub fn code(self) -> u64 {
        match self {
            PerformativeKind::Unknown(code) => code,
            known => KNOWN_KINDS
                .iter()
                .find(|(_, _, kind)| *kind == known)
                .map(|(code, _, _)| *code)
                .unwrap_or(u64::MAX),
        }
    }

    /// 日志使用的短名称。
    pub fn name(self) -> &'static str {
        match self {
            PerformativeKind::Open => "open",
            PerformativeKind::Begin => "begin",
            PerformativeKind::Attach => "attach",
            PerformativeKind::Flow => "flow",
            PerformativeKind::Transfer => "transfer",
            PerformativeKind::Disposition => "disposition",
            PerformativeKind::Detach => "detach",
            PerformativeKind::End => "end",
            PerformativeKind::Close => "close",
            PerformativeKind::SaslMechanisms => "sasl-mechanisms",
            PerformativeKind::SaslInit => "sasl-init",
            PerformativeKind::SaslChallenge => "sasl-challenge",
            PerformativeKind::SaslResponse => "sasl-response",
            PerformativeKind::SaslOutcome => "sasl-outcome",
            PerformativeKind::Unknown(_) => "unknown",
        }
    }

    /// 是否属于 SASL 层。
    pub fn is_sasl(self) -> bool {
        matches!(
            self,
            PerformativeKind::SaslMechanisms
                | PerformativeKind::SaslInit
                | PerformativeKind::SaslChallenge
                | PerformativeKind::SaslResponse
                | PerformativeKind::SaslOutcome
        )
    }

    /// 能否出现在给定类型的帧中。
    pub fn permitted_in(self, frame_type: FrameType) -> bool {
        match self {
            PerformativeKind::Unknown(_) => false,
            kind => kind.is_sasl() == (frame_type == FrameType::Sasl),
        }
    }
}

/// 不透明的 performative：描述符加上整个 described value 的编码视图。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Performative {
    descriptor: Descriptor,
    kind: PerformativeKind,
    encoded: Bytes,
}

impl Performative {
    /// 由外部解码器构造；`encoded` 必须是完整的 described value。
    pub fn new(descriptor: Descriptor, encoded: Bytes) -> Self {
        let kind = match &descriptor {
            Descriptor::Code(code) => PerformativeKind::from_code(*code),
            Descriptor::Symbol(symbol) => PerformativeKind::from_symbol(symbol),
        };
        Self {
            descriptor,
            kind,
            encoded,
        }
    }

    /// 构造字段为空的 described list，例如 `00 53 10 45` 表示空的 open。
    pub fn described_list(kind: PerformativeKind) -> Self {
        let code = kind.code();
        let mut raw = BytesMut::with_capacity(12);
        raw.extend_from_slice(&[DESCRIBED]);
        if let Ok(small) = u8::try_from(code) {
            raw.extend_from_slice(&[SMALL_ULONG, small]);
        } else {
            raw.extend_from_slice(&[ULONG]);
            raw.extend_from_slice(&code.to_be_bytes());
        }
        raw.extend_from_slice(&[LIST0]);
        Self::new(Descriptor::Code(code), raw.freeze())
    }

    /// 描述符。
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// performative 类型。
    pub fn kind(&self) -> PerformativeKind {
        self.kind
    }

    /// 编码视图。
    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }

    /// 编码长度。
    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }
}

/// performative 编解码边界。
///
/// # 契约说明（What）
/// - `decode`：`body` 从 performative 的首字节开始、到帧尾结束；返回值中的 `usize` 是 performative 占用的字节数，
///   必须 `<= body.len()`，其后的字节作为负载交给下游；
/// - `encode`：把 performative 追加到 `dst` 末尾，不得改动已有内容；
/// - 两个方法都只能返回 `Decode`/`Encode` 类错误，解码器会据此进入失败态。
pub trait PerformativeCodec: Send + Sync + 'static {
    /// 解码帧体开头的 performative。
    fn decode(&self, frame_type: FrameType, body: &Bytes) -> Result<(Performative, usize)>;

    /// 编码 performative。
    fn encode(&self, performative: &Performative, dst: &mut BytesMut) -> Result<()>;
}

/// 默认的 described list 掠读器。
#[derive(Clone, Copy, Debug, Default)]
pub struct DescribedTypeCodec;

impl DescribedTypeCodec {
    /// 构造实例。
    pub fn new() -> Self {
        Self
    }
}

impl PerformativeCodec for DescribedTypeCodec {
    fn decode(&self, frame_type: FrameType, body: &Bytes) -> Result<(Performative, usize)> {
        let mut cursor = Cursor::new(body);

        let constructor = cursor.u8()?;
        if constructor != DESCRIBED {
            return Err(EngineError::decode(format!(
                "performative must be a described type, found constructor 0x{constructor:02x}"
            )));
        }

        let descriptor = match cursor.u8()? {
            SMALL_ULONG => Descriptor::Code(u64::from(cursor.u8()?)),
            ULONG => Descriptor::Code(read_u64_be(cursor.take(8)?, 0)),
            ULONG_ZERO => Descriptor::Code(0),
            SYM8 => {
                let len = usize::from(cursor.u8()?);
                Descriptor::Symbol(cursor.slice(len)?)
            }
            SYM32 => {
                let len = cursor.u32_len()?;
                Descriptor::Symbol(cursor.slice(len)?)
            }
            other => {
                return Err(EngineError::decode(format!(
                    "unsupported descriptor constructor 0x{other:02x}"
                )));
            }
        };

        match cursor.u8()? {
            LIST0 => {}
            LIST8 => {
                let size = usize::from(cursor.u8()?);
                cursor.take(size)?;
            }
            LIST32 => {
                let size = cursor.u32_len()?;
                cursor.take(size)?;
            }
            other => {
                return Err(EngineError::decode(format!(
                    "performative body must be a list, found constructor 0x{other:02x}"
                )));
            }
        }

        let consumed = cursor.position();
        let performative = Performative::new(descriptor, body.slice(..consumed));
        if !performative.kind().permitted_in(frame_type) {
            return Err(EngineError::decode(format!(
                "performative {} (descriptor {}) not permitted in {:?} frame",
                performative.kind().name(),
                describe(performative.descriptor()),
                frame_type
            )));
        }
        Ok((performative, consumed))
    }

    fn encode(&self, performative: &Performative, dst: &mut BytesMut) -> Result<()> {
        if performative.encoded().is_empty() {
            return Err(EngineError::encode(format!(
                "performative {} has no encoded form",
                performative.kind().name()
            )));
        }
        dst.extend_from_slice(performative.encoded());
        Ok(())
    }
}

fn describe(descriptor: &Descriptor) -> String {
    match descriptor {
        Descriptor::Code(code) => format!("0x{code:x}"),
        Descriptor::Symbol(symbol) => String::from_utf8_lossy(symbol).into_owned(),
    }
}

/// 带越界检查的只读游标。
struct Cursor<'a> {
    src: &'a Bytes,
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a Bytes) -> Self {
        Self { src, position: 0 }
    }

    fn position(&self) -> usize {
        self.position
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .filter(|end| *end <= self.src.len())
            .ok_or_else(|| {
                EngineError::decode(format!(
                    "truncated performative: needed {} bytes at offset {} of {} ({})",
                    len,
                    self.position,
                    self.src.len(),
                    hex_preview(self.src)
                ))
            })?;
        let src: &'a [u8] = self.src.as_ref();
        let taken = &src[self.position..end];
        self.position = end;
        Ok(taken)
    }

    fn slice(&mut self, len: usize) -> Result<Bytes> {
        let start = self.position;
        self.take(len)?;
        Ok(self.src.slice(start..self.position))
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32_len(&mut self) -> Result<usize> {
        let raw = read_u32_be(self.take(4)?, 0);
        usize::try_from(raw)
            .map_err(|_| EngineError::decode(format!("length {raw} exceeds address space")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn empty_list_reports_its_length() {
        let body = Bytes::from_static(&[0x00, 0x53, 0x10, 0x45, 0xaa, 0xbb]);
        let (performative, consumed) = DescribedTypeCodec
            .decode(FrameType::Amqp, &body)
            .expect("空 open 可解码");
        assert_eq!(consumed, 4);
        assert_eq!(performative.kind(), PerformativeKind::Open);
        assert_eq!(performative.encoded().as_ref(), &[0x00, 0x53, 0x10, 0x45]);
    }

    #[test]
    fn list8_skips_its_fields() {
        // transfer: list8 size=3 count=2 fields=[uint0, null]，末尾 0x01 为负载
        let body = Bytes::from_static(&[0x00, 0x53, 0x14, 0xc0, 0x03, 0x02, 0x43, 0x40, 0x01]);
        let (performative, consumed) = DescribedTypeCodec
            .decode(FrameType::Amqp, &body)
            .expect("transfer 可解码");
        assert_eq!(performative.kind(), PerformativeKind::Transfer);
        assert_eq!(consumed, 8);
    }

    #[test]
    fn symbolic_descriptor_is_recognised() {
        let mut raw = alloc::vec![0x00, 0xa3, 14];
        raw.extend_from_slice(b"amqp:open:list");
        raw.push(0x45);
        let body = Bytes::from(raw);
        let (performative, consumed) = DescribedTypeCodec
            .decode(FrameType::Amqp, &body)
            .expect("符号描述符可解码");
        assert_eq!(performative.kind(), PerformativeKind::Open);
        assert_eq!(consumed, body.len());
    }

    #[test]
    fn truncated_list_is_a_decode_error() {
        let body = Bytes::from_static(&[0x00, 0x53, 0x10, 0xc0, 0x09, 0x01]);
        let err = DescribedTypeCodec
            .decode(FrameType::Amqp, &body)
            .expect_err("截断的 list 必须报错");
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.message().contains("truncated"));
    }

    #[test]
    fn sasl_performative_in_amqp_frame_is_rejected() {
        let body = Bytes::from_static(&[0x00, 0x53, 0x41, 0x45]);
        assert!(DescribedTypeCodec.decode(FrameType::Amqp, &body).is_err());
        assert!(DescribedTypeCodec.decode(FrameType::Sasl, &body).is_ok());
    }

    #[test]
    fn described_list_round_trips_through_codec() {
        let outcome = Performative::described_list(PerformativeKind::SaslOutcome);
        let mut dst = BytesMut::new();
        DescribedTypeCodec.encode(&outcome, &mut dst).expect("编码成功");
        let (decoded, consumed) = DescribedTypeCodec
            .decode(FrameType::Sasl, &dst.freeze())
            .expect("解码成功");
        assert_eq!(decoded, outcome);
        assert_eq!(consumed, 4);
    }

    #[test]
    fn large_code_uses_ulong_descriptor() {
        let custom = Performative::described_list(PerformativeKind::Unknown(0x1_0000));
        assert_eq!(custom.encoded()[1], ULONG);
        assert_eq!(custom.encoded_len(), 11);
        assert_eq!(custom.kind(), PerformativeKind::Unknown(0x1_0000));
    }
}
