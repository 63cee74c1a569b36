use bytes::Bytes;

use crate::envelope::{
    HeaderEnvelope, HeaderKind, IncomingAmqpEnvelope, OutgoingAmqpEnvelope, SaslEnvelope,
};
use crate::error::Result;
use crate::performative::Performative;
use crate::pipeline::{ChainContext, EngineHandler};

const INBOUND: &str = "inbound";
const OUTBOUND: &str = "outbound";

/// 以 `trace!` 记录每个协议头与帧的透传处理器。
///
/// 字段：`direction`（`inbound`/`outbound`）、`channel`、`performative`、`payload_len`。
/// 处理器从不修改、吞掉或重排事件。
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameLoggingHandler;

impl FrameLoggingHandler {
    /// 构造实例。
    pub fn new() -> Self {
        Self
    }
}

fn header_label(header: &HeaderEnvelope) -> &'static str {
    match header.kind() {
        HeaderKind::Amqp => "amqp",
        HeaderKind::Sasl => "sasl",
    }
}

fn performative_name(body: Option<&Performative>) -> &'static str {
    body.map_or("empty", |body| body.kind().name())
}

fn payload_len(payload: Option<&Bytes>) -> usize {
    payload.map_or(0, Bytes::len)
}

impl EngineHandler for FrameLoggingHandler {
    fn handle_read_header(&self, ctx: &ChainContext<'_>, header: HeaderEnvelope) -> Result<()> {
        tracing::trace!(direction = INBOUND, header = header_label(&header), "protocol header");
        ctx.fire_read_header(header)
    }

    fn handle_read_sasl(&self, ctx: &ChainContext<'_>, frame: SaslEnvelope) -> Result<()> {
        tracing::trace!(
            direction = INBOUND,
            channel = frame.channel(),
            performative = frame.body().kind().name(),
            payload_len = 0usize,
            "sasl frame"
        );
        ctx.fire_read_sasl(frame)
    }

    fn handle_read_amqp(&self, ctx: &ChainContext<'_>, frame: IncomingAmqpEnvelope) -> Result<()> {
        tracing::trace!(
            direction = INBOUND,
            channel = frame.channel(),
            performative = performative_name(frame.body()),
            payload_len = payload_len(frame.payload()),
            "amqp frame"
        );
        ctx.fire_read_amqp(frame)
    }

    fn handle_write_header(&self, ctx: &ChainContext<'_>, header: HeaderEnvelope) -> Result<()> {
        tracing::trace!(direction = OUTBOUND, header = header_label(&header), "protocol header");
        ctx.fire_write_header(header)
    }

    fn handle_write_sasl(&self, ctx: &ChainContext<'_>, frame: SaslEnvelope) -> Result<()> {
        tracing::trace!(
            direction = OUTBOUND,
            channel = frame.channel(),
            performative = frame.body().kind().name(),
            payload_len = 0usize,
            "sasl frame"
        );
        ctx.fire_write_sasl(frame)
    }

    fn handle_write_amqp(&self, ctx: &ChainContext<'_>, frame: OutgoingAmqpEnvelope) -> Result<()> {
        tracing::trace!(
            direction = OUTBOUND,
            channel = frame.channel(),
            performative = performative_name(frame.body()),
            payload_len = payload_len(frame.payload()),
            "amqp frame"
        );
        ctx.fire_write_amqp(frame)
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use crate::configuration::EngineConfiguration;
    use crate::engine::Engine;
    use crate::envelope::{AMQP_HEADER, HeaderEnvelope, OutgoingAmqpEnvelope};
    use crate::performative::{Performative, PerformativeKind};

    #[test]
    #[traced_test]
    fn records_both_directions_without_altering_events() {
        let engine = Engine::with_frame_codec(EngineConfiguration::default().with_trace_frames(true))
            .expect("构造引擎失败");

        let mut inbound = AMQP_HEADER.to_vec();
        inbound.extend_from_slice(&[0, 0, 0, 15, 2, 0, 0, 3, 0x00, 0x53, 0x14, 0x45, b'a', b'b', b'c']);
        engine.ingest(inbound).expect("入站帧应被接受");

        engine
            .write_header(HeaderEnvelope::AMQP)
            .expect("写出协议头失败");
        engine
            .write_amqp(OutgoingAmqpEnvelope::new(
                1,
                Performative::described_list(PerformativeKind::Flow),
            ))
            .expect("写出帧失败");

        assert!(logs_contain("protocol header"));
        assert!(logs_contain("amqp frame"));
        assert!(logs_contain("inbound"));
        assert!(logs_contain("outbound"));
        assert!(logs_contain("transfer"));
        assert!(logs_contain("flow"));
        assert!(logs_contain("payload_len=3"));

        let output = engine.take_output();
        assert_eq!(output.len(), 2);
        assert_eq!(&output[0][..], &AMQP_HEADER);
        assert_eq!(&output[1][..], &[0, 0, 0, 12, 2, 0, 0, 1, 0x00, 0x53, 0x13, 0x45]);
    }
}
