//! 协议引擎：持有流水线、字节入口与失败/关闭信号。
//!
//! # 模块定位（Why）
//! - 引擎是传输层与协议处理器之间唯一的交界面：传输层调用 [`Engine::ingest`] 注入字节，
//!   通过输出回调（或 [`Engine::take_output`]）取回待发送字节；
//! - 流水线内任何未处理的错误都在这里被收敛为一次引擎失败。
//!
//! # 并发约束
//! - 引擎以同步、单驱动方式运行：同一时刻只有一次读或写穿过流水线；
//! - 回调在不持有任何内部锁的情况下调用，处理器可以重入引擎。

use alloc::{collections::VecDeque, sync::Arc, vec::Vec};
use core::fmt;

use bytes::Bytes;
use spin::{Mutex, RwLock};

use crate::codec::{FrameDecodingHandler, FrameEncodingHandler, FrameLoggingHandler};
use crate::configuration::{EngineConfiguration, FrameLimits};
use crate::envelope::{HeaderEnvelope, OutgoingAmqpEnvelope, SaslEnvelope};
use crate::error::{EngineError, Result};
use crate::performative::{DescribedTypeCodec, PerformativeCodec};
use crate::pipeline::EnginePipeline;

/// 默认流水线中解码器的名称。
pub const FRAME_DECODER: &str = "frame-decoder";
/// 默认流水线中编码器的名称。
pub const FRAME_ENCODER: &str = "frame-encoder";
/// 默认流水线中帧日志处理器的名称。
pub const FRAME_LOGGER: &str = "frame-logger";

/// 接收待写出字节的回调。
pub type OutputHandler = Arc<dyn Fn(Bytes) + Send + Sync>;
/// 引擎失败时调用一次的回调。
pub type ErrorHandler = Arc<dyn Fn(&EngineError) + Send + Sync>;
/// 引擎关闭时调用一次的回调。
pub type ShutdownHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Lifecycle {
    failure: Option<EngineError>,
    shut_down: bool,
}

/// AMQP 1.0 协议引擎。
///
/// # 契约说明（What）
/// - 构造后以 `Arc<Engine>` 共享，流水线以弱引用指回引擎；
/// - 读写入口在关闭后返回 `EngineShutdown`，在失败后返回已存储的失败错误；
/// - 流水线抛出的错误经 [`Engine::engine_failed`] 上报，错误回调至多调用一次；
/// - 越过流水线 head 的字节交给输出回调；未设置回调时排队，由 [`Engine::take_output`] 取走。
pub struct Engine {
    configuration: RwLock<EngineConfiguration>,
    pipeline: EnginePipeline,
    lifecycle: Mutex<Lifecycle>,
    output_handler: Mutex<Option<OutputHandler>>,
    error_handler: Mutex<Option<ErrorHandler>>,
    shutdown_handler: Mutex<Option<ShutdownHandler>>,
    pending_output: Mutex<VecDeque<Bytes>>,
}

impl Engine {
    /// 构造流水线为空的引擎。
    ///
    /// # 错误
    /// - 配置未通过 [`EngineConfiguration::validate`] 时返回 `InvalidArgument`。
    pub fn new(configuration: EngineConfiguration) -> Result<Arc<Self>> {
        configuration.validate()?;
        Ok(Arc::new_cyclic(|engine| Self {
            configuration: RwLock::new(configuration),
            pipeline: EnginePipeline::new(engine.clone()),
            lifecycle: Mutex::new(Lifecycle::default()),
            output_handler: Mutex::new(None),
            error_handler: Mutex::new(None),
            shutdown_handler: Mutex::new(None),
            pending_output: Mutex::new(VecDeque::new()),
        }))
    }

    /// 构造装好分帧处理器的引擎，帧体使用 [`DescribedTypeCodec`]。
    pub fn with_frame_codec(configuration: EngineConfiguration) -> Result<Arc<Self>> {
        Self::with_performative_codec(configuration, Arc::new(DescribedTypeCodec::new()))
    }

    /// 构造装好分帧处理器的引擎，帧体使用给定的编解码器。
    ///
    /// 链路为 `frame-decoder → frame-encoder`，`trace_frames` 打开时在 tail 追加 `frame-logger`。
    pub fn with_performative_codec(
        configuration: EngineConfiguration,
        codec: Arc<dyn PerformativeCodec>,
    ) -> Result<Arc<Self>> {
        let trace_frames = configuration.trace_frames;
        let engine = Self::new(configuration)?;
        engine
            .pipeline()
            .add_last(
                FRAME_DECODER,
                Arc::new(FrameDecodingHandler::with_codec(Arc::clone(&codec))),
            )?
            .add_last(FRAME_ENCODER, Arc::new(FrameEncodingHandler::with_codec(codec)))?;
        if trace_frames {
            engine
                .pipeline()
                .add_last(FRAME_LOGGER, Arc::new(FrameLoggingHandler::new()))?;
        }
        Ok(engine)
    }

    /// 引擎流水线。
    pub fn pipeline(&self) -> &EnginePipeline {
        &self.pipeline
    }

    /// 当前配置的副本。
    pub fn configuration(&self) -> EngineConfiguration {
        self.configuration.read().clone()
    }

    /// 原地修改配置；修改结果未通过校验时保持原配置不变。
    pub fn update_configuration(
        &self,
        update: impl FnOnce(&mut EngineConfiguration),
    ) -> Result<()> {
        let mut candidate = self.configuration();
        update(&mut candidate);
        candidate.validate()?;
        *self.configuration.write() = candidate;
        Ok(())
    }

    /// 当前帧长上限。
    pub fn frame_limits(&self) -> FrameLimits {
        self.configuration.read().limits()
    }

    /// 注入传输层收到的字节。
    pub fn ingest(&self, bytes: impl Into<Bytes>) -> Result<()> {
        self.ensure_running()?;
        self.pipeline
            .fire_read_bytes(bytes.into())
            .map_err(|error| self.engine_failed(error))
    }

    /// 写出协议头。
    pub fn write_header(&self, header: HeaderEnvelope) -> Result<()> {
        self.ensure_running()?;
        self.pipeline
            .fire_write_header(header)
            .map_err(|error| self.engine_failed(error))
    }

    /// 写出 AMQP 帧。
    pub fn write_amqp(&self, frame: OutgoingAmqpEnvelope) -> Result<()> {
        self.ensure_running()?;
        self.pipeline
            .fire_write_amqp(frame)
            .map_err(|error| self.engine_failed(error))
    }

    /// 写出 SASL 帧。
    pub fn write_sasl(&self, frame: SaslEnvelope) -> Result<()> {
        self.ensure_running()?;
        self.pipeline
            .fire_write_sasl(frame)
            .map_err(|error| self.engine_failed(error))
    }

    /// 报告引擎失败。
    ///
    /// # 契约说明（What）
    /// - 首次调用存储错误、记录 `warn!`、沿流水线广播失败事件并调用错误回调，返回该错误；
    /// - 之后的调用不再通知任何人，直接返回首次存储的错误；
    /// - 关闭后的引擎不再记录失败，原样返回入参。
    pub fn engine_failed(&self, error: EngineError) -> EngineError {
        {
            let mut lifecycle = self.lifecycle.lock();
            if let Some(stored) = &lifecycle.failure {
                return stored.clone();
            }
            if lifecycle.shut_down {
                tracing::debug!(code = error.code(), error = %error, "failure after engine shutdown ignored");
                return error;
            }
            lifecycle.failure = Some(error.clone());
        }
        tracing::warn!(code = error.code(), error = %error, "amqp engine failed");
        self.pipeline.fire_failed(&error);
        let handler = self.error_handler.lock().clone();
        if let Some(handler) = handler {
            handler(&error);
        }
        error
    }

    /// 关闭引擎；重复调用为无操作，关闭回调只调用一次。
    pub fn shutdown(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.shut_down {
                return;
            }
            lifecycle.shut_down = true;
        }
        tracing::debug!("amqp engine shut down");
        let handler = self.shutdown_handler.lock().clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    /// 是否已失败。
    pub fn is_failed(&self) -> bool {
        self.lifecycle.lock().failure.is_some()
    }

    /// 是否已关闭。
    pub fn is_shutdown(&self) -> bool {
        self.lifecycle.lock().shut_down
    }

    /// 首次失败的原因。
    pub fn failure_cause(&self) -> Option<EngineError> {
        self.lifecycle.lock().failure.clone()
    }

    /// 设置输出回调；已排队的字节会立即按顺序交给新回调。
    pub fn set_output_handler(&self, handler: impl Fn(Bytes) + Send + Sync + 'static) {
        let handler: OutputHandler = Arc::new(handler);
        *self.output_handler.lock() = Some(Arc::clone(&handler));
        let pending: Vec<Bytes> = self.pending_output.lock().drain(..).collect();
        for bytes in pending {
            handler(bytes);
        }
    }

    /// 设置错误回调。
    pub fn set_error_handler(&self, handler: impl Fn(&EngineError) + Send + Sync + 'static) {
        *self.error_handler.lock() = Some(Arc::new(handler));
    }

    /// 设置关闭回调。
    pub fn set_shutdown_handler(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.shutdown_handler.lock() = Some(Arc::new(handler));
    }

    /// 取走尚未交给输出回调的字节，按写出顺序排列。
    pub fn take_output(&self) -> Vec<Bytes> {
        self.pending_output.lock().drain(..).collect()
    }

    pub(crate) fn emit_output(&self, bytes: Bytes) {
        let handler = self.output_handler.lock().clone();
        match handler {
            Some(handler) => handler(bytes),
            None => self.pending_output.lock().push_back(bytes),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        let lifecycle = self.lifecycle.lock();
        if lifecycle.shut_down {
            return Err(EngineError::shutdown("engine has been shut down"));
        }
        match &lifecycle.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = self.lifecycle.lock();
        f.debug_struct("Engine")
            .field("handlers", &self.pipeline.names())
            .field("failure", &lifecycle.failure)
            .field("shut_down", &lifecycle.shut_down)
            .finish_non_exhaustive()
    }
}
