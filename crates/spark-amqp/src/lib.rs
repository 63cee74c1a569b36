//! `spark-amqp`：传输无关的 AMQP 1.0 协议引擎。
//!
//! # 模块定位（Why）
//! - 把任意切分的原始字节流转换为有序的协议事件（协议头、SASL 帧、AMQP 帧），
//!   并把出站事件序列化回字节，同时在帧体被解释之前完成所有分帧校验；
//! - 与套接字、TLS、连接/会话状态机解耦：这些组件以处理器或回调的形式接入引擎。
//!
//! # 设计概要（How）
//! - [`pipeline`]：具名、有序、可变的处理器链，读事件 head → tail，写事件 tail → head；
//! - [`codec`]：分帧解码状态机、帧编码器与帧日志处理器；
//! - [`Engine`]：持有流水线、字节入口与失败/关闭信号，失败只上报一次；
//! - [`performative`]：帧体解码边界，默认实现只掠读 described list 的跨度。
//!
//! # 命名约定（Consistency）
//! - 错误统一为 [`EngineError`]，错误码遵循 `amqp.<领域>.<语义>`；
//! - 处理器回调以 `handle_read_*` / `handle_write_*` 命名，传播方法以 `fire_*` 命名。

#![warn(missing_docs)]

extern crate alloc;

mod buffer;
pub mod codec;
pub mod configuration;
mod engine;
pub mod envelope;
pub mod error;
pub mod performative;
pub mod pipeline;

pub use codec::{
    FRAME_HEADER_SIZE, FrameDecodingHandler, FrameEncodingHandler, FrameEvent,
    FrameLoggingHandler, FrameParser,
};
pub use configuration::{EngineConfiguration, FrameLimits};
pub use engine::{
    Engine, ErrorHandler, FRAME_DECODER, FRAME_ENCODER, FRAME_LOGGER, OutputHandler,
    ShutdownHandler,
};
pub use envelope::{
    AMQP_HEADER, FrameType, HEADER_SIZE, HeaderEnvelope, HeaderKind, IncomingAmqpEnvelope,
    OutgoingAmqpEnvelope, SASL_HEADER, SaslEnvelope,
};
pub use error::{EngineError, ErrorKind, Result, codes};
pub use performative::{
    DescribedTypeCodec, Descriptor, Performative, PerformativeCodec, PerformativeKind,
};
pub use pipeline::{ChainContext, EngineHandler, EngineHandlerContext, EnginePipeline};
