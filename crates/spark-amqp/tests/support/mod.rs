//! 集成测试共用的记录型处理器与帧构造工具。

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use spark_amqp::{
    AMQP_HEADER, ChainContext, EngineError, EngineHandler, HeaderEnvelope, HeaderKind,
    IncomingAmqpEnvelope, OutgoingAmqpEnvelope, PerformativeKind, Result, SaslEnvelope,
};

/// 处理器观察到的事件摘要。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observed {
    Header(HeaderKind),
    Sasl(PerformativeKind),
    Amqp {
        channel: u16,
        body: Option<PerformativeKind>,
        payload: Option<Vec<u8>>,
    },
    WriteHeader(HeaderKind),
    WriteAmqp(u16),
    WriteBytes(Vec<u8>),
    Failed(String),
}

/// 记录经过自身的事件并原样转发。
#[derive(Default)]
pub struct Recorder {
    label: &'static str,
    events: Mutex<Vec<Observed>>,
    journal: Option<Arc<Mutex<Vec<String>>>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 把 `label` 写入共享日志，用于断言处理器之间的调用顺序。
    pub fn journaled(label: &'static str, journal: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            label,
            events: Mutex::new(Vec::new()),
            journal: Some(journal),
        })
    }

    pub fn events(&self) -> Vec<Observed> {
        self.events.lock().expect("记录锁中毒").clone()
    }

    /// 只保留读方向的协议事件。
    pub fn inbound(&self) -> Vec<Observed> {
        self.events()
            .into_iter()
            .filter(|event| {
                matches!(
                    event,
                    Observed::Header(_) | Observed::Sasl(_) | Observed::Amqp { .. }
                )
            })
            .collect()
    }

    fn record(&self, event: Observed) {
        if let Some(journal) = &self.journal {
            journal.lock().expect("日志锁中毒").push(self.label.to_string());
        }
        self.events.lock().expect("记录锁中毒").push(event);
    }
}

impl EngineHandler for Recorder {
    fn handle_read_header(&self, ctx: &ChainContext<'_>, header: HeaderEnvelope) -> Result<()> {
        self.record(Observed::Header(header.kind()));
        ctx.fire_read_header(header)
    }

    fn handle_read_sasl(&self, ctx: &ChainContext<'_>, frame: SaslEnvelope) -> Result<()> {
        self.record(Observed::Sasl(frame.body().kind()));
        ctx.fire_read_sasl(frame)
    }

    fn handle_read_amqp(&self, ctx: &ChainContext<'_>, frame: IncomingAmqpEnvelope) -> Result<()> {
        self.record(Observed::Amqp {
            channel: frame.channel(),
            body: frame.body().map(|body| body.kind()),
            payload: frame.payload().map(|payload| payload.to_vec()),
        });
        ctx.fire_read_amqp(frame)
    }

    fn handle_write_header(&self, ctx: &ChainContext<'_>, header: HeaderEnvelope) -> Result<()> {
        self.record(Observed::WriteHeader(header.kind()));
        ctx.fire_write_header(header)
    }

    fn handle_write_amqp(&self, ctx: &ChainContext<'_>, frame: OutgoingAmqpEnvelope) -> Result<()> {
        self.record(Observed::WriteAmqp(frame.channel()));
        ctx.fire_write_amqp(frame)
    }

    fn handle_write_bytes(&self, ctx: &ChainContext<'_>, bytes: Bytes) -> Result<()> {
        self.record(Observed::WriteBytes(bytes.to_vec()));
        ctx.fire_write_bytes(bytes)
    }

    fn engine_failed(&self, ctx: &ChainContext<'_>, error: &EngineError) {
        self.record(Observed::Failed(error.message().to_string()));
        ctx.fire_failed(error)
    }
}

/// 拼接一个 DOFF=2 的帧。
pub fn frame(frame_type: u8, channel: u16, body: &[u8]) -> Vec<u8> {
    let size = u32::try_from(8 + body.len()).expect("测试帧过大");
    let mut raw = size.to_be_bytes().to_vec();
    raw.push(2);
    raw.push(frame_type);
    raw.extend_from_slice(&channel.to_be_bytes());
    raw.extend_from_slice(body);
    raw
}

/// 空的 described list performative。
pub fn performative(code: u8) -> Vec<u8> {
    vec![0x00, 0x53, code, 0x45]
}

/// 协议头 + open + begin + 心跳 + 带负载的 transfer + close。
pub fn valid_stream() -> Vec<u8> {
    let mut stream = AMQP_HEADER.to_vec();
    stream.extend(frame(0, 0, &performative(0x10)));
    stream.extend(frame(0, 1, &performative(0x11)));
    stream.extend(frame(0, 0, &[]));
    let mut transfer = performative(0x14);
    transfer.extend_from_slice(b"payload");
    stream.extend(frame(0, 1, &transfer));
    stream.extend(frame(0, 0, &performative(0x18)));
    stream
}
