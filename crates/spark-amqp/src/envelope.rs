//! 流水线中流转的帧信封。
//!
//! # 契约说明（What）
//! - [`HeaderEnvelope`]：两种规范协议头之一（AMQP / SASL）；
//! - [`IncomingAmqpEnvelope`] / [`OutgoingAmqpEnvelope`]：通道号、可空 performative（空表示心跳帧）、可空负载视图；
//! - [`SaslEnvelope`]：一个 SASL performative，SASL 帧总是位于通道 0 且必然带有 performative。
//!
//! 负载均为 `Bytes` 视图，信封之间克隆不会复制底层内存。

use bytes::Bytes;

use crate::performative::Performative;

/// AMQP 协议头：`'A' 'M' 'Q' 'P' 0 1 0 0`。
pub const AMQP_HEADER: [u8; 8] = [b'A', b'M', b'Q', b'P', 0, 1, 0, 0];

/// SASL 协议头：`'A' 'M' 'Q' 'P' 3 1 0 0`。
pub const SASL_HEADER: [u8; 8] = [b'A', b'M', b'Q', b'P', 3, 1, 0, 0];

/// 协议头与帧头的固定长度。
pub const HEADER_SIZE: usize = 8;

/// 协议头类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    /// 协议 id 0。
    Amqp,
    /// 协议 id 3。
    Sasl,
}

impl HeaderKind {
    /// 规范协议头字节。
    pub fn bytes(self) -> &'static [u8; HEADER_SIZE] {
        match self {
            HeaderKind::Amqp => &AMQP_HEADER,
            HeaderKind::Sasl => &SASL_HEADER,
        }
    }

    /// 与协议头逐字节比较，完全匹配时返回对应类型。
    pub fn match_header(raw: &[u8]) -> Option<Self> {
        if raw == AMQP_HEADER {
            Some(HeaderKind::Amqp)
        } else if raw == SASL_HEADER {
            Some(HeaderKind::Sasl)
        } else {
            None
        }
    }

    /// 协商后期望的帧类型。
    pub fn frame_type(self) -> FrameType {
        match self {
            HeaderKind::Amqp => FrameType::Amqp,
            HeaderKind::Sasl => FrameType::Sasl,
        }
    }
}

/// 帧头中的类型字节。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// `0x00`
    Amqp = 0x00,
    /// `0x01`
    Sasl = 0x01,
}

impl FrameType {
    /// 识别类型字节，未知类型返回 `None`。
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(FrameType::Amqp),
            0x01 => Some(FrameType::Sasl),
            _ => None,
        }
    }

    /// 线上编码。
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 协议头信封。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeaderEnvelope {
    kind: HeaderKind,
}

impl HeaderEnvelope {
    /// AMQP 协议头。
    pub const AMQP: Self = Self {
        kind: HeaderKind::Amqp,
    };

    /// SASL 协议头。
    pub const SASL: Self = Self {
        kind: HeaderKind::Sasl,
    };

    /// 按类型构造。
    pub fn new(kind: HeaderKind) -> Self {
        Self { kind }
    }

    /// 协议头类型。
    pub fn kind(&self) -> HeaderKind {
        self.kind
    }

    /// 规范字节。
    pub fn header(&self) -> &'static [u8; HEADER_SIZE] {
        self.kind.bytes()
    }

    /// 是否为 SASL 协议头。
    pub fn is_sasl(&self) -> bool {
        self.kind == HeaderKind::Sasl
    }
}

/// 入站 AMQP 帧。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingAmqpEnvelope {
    channel: u16,
    frame_size: u32,
    body: Option<Performative>,
    payload: Option<Bytes>,
}

impl IncomingAmqpEnvelope {
    pub(crate) fn new(
        channel: u16,
        frame_size: u32,
        body: Option<Performative>,
        payload: Option<Bytes>,
    ) -> Self {
        Self {
            channel,
            frame_size,
            body,
            payload,
        }
    }

    /// 通道号。
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// 帧总长度（含 8 字节帧头）。
    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    /// 解码出的 performative；`None` 表示空帧（心跳）。
    pub fn body(&self) -> Option<&Performative> {
        self.body.as_ref()
    }

    /// performative 之后的应用负载视图。
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// 是否为空帧。
    pub fn is_empty_frame(&self) -> bool {
        self.body.is_none()
    }

    /// 拆解为 `(channel, body, payload)`。
    pub fn into_parts(self) -> (u16, Option<Performative>, Option<Bytes>) {
        (self.channel, self.body, self.payload)
    }
}

/// 出站 AMQP 帧。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingAmqpEnvelope {
    channel: u16,
    body: Option<Performative>,
    payload: Option<Bytes>,
}

impl OutgoingAmqpEnvelope {
    /// 携带 performative 的帧。
    pub fn new(channel: u16, body: Performative) -> Self {
        Self {
            channel,
            body: Some(body),
            payload: None,
        }
    }

    /// 通道 0 上的空帧，用作心跳。
    pub fn heartbeat() -> Self {
        Self {
            channel: 0,
            body: None,
            payload: None,
        }
    }

    /// 附加应用负载。
    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = Some(payload);
        self
    }

    /// 通道号。
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// 待编码的 performative。
    pub fn body(&self) -> Option<&Performative> {
        self.body.as_ref()
    }

    /// 应用负载。
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }
}

/// SASL 帧。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaslEnvelope {
    body: Performative,
}

impl SaslEnvelope {
    /// 包装 SASL performative。
    pub fn new(body: Performative) -> Self {
        Self { body }
    }

    /// SASL performative。
    pub fn body(&self) -> &Performative {
        &self.body
    }

    /// SASL 帧固定在通道 0。
    pub fn channel(&self) -> u16 {
        0
    }

    /// 取出 performative。
    pub fn into_body(self) -> Performative {
        self.body
    }
}
