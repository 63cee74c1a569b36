//! 引擎错误契约：稳定错误码、错误分类与 [`EngineError`]。

use alloc::borrow::Cow;
use core::fmt;

/// 稳定错误码集合，遵循 `<领域>.<语义>` 命名约定。
///
/// # 契约说明（What）
/// - 码值一经发布不得修改，日志与告警按码值聚合；
/// - 新增码值时需同步扩展 [`ErrorKind::code`] 的映射。
pub mod codes {
    /// 构造或配置阶段的非法参数。
    pub const ARGUMENT_INVALID: &str = "amqp.argument.invalid";
    /// 协议头或帧头违反 AMQP 1.0 分帧规则。
    pub const PROTOCOL_VIOLATION: &str = "amqp.protocol.violation";
    /// 帧体中的 performative 无法被识别。
    pub const CODEC_DECODE: &str = "amqp.codec.decode_failed";
    /// 出站 performative 无法写入缓冲。
    pub const CODEC_ENCODE: &str = "amqp.codec.encode_failed";
    /// 流水线中未被处理的错误，最终以引擎失败的形式上报。
    pub const ENGINE_FAILED: &str = "amqp.engine.failed";
    /// 引擎已关闭，拒绝继续读写。
    pub const ENGINE_SHUTDOWN: &str = "amqp.engine.shutdown";
}

/// 错误的主要分类，决定调用方的处置策略。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 非法参数：空名称、重复名称、零容量池等；不改变任何引擎状态。
    InvalidArgument,
    /// 协议违规：错误的协议头、过小/过大的帧、非法数据偏移等；解码器进入终态。
    ProtocolViolation,
    /// 帧体解码失败。
    Decode,
    /// 出站编码失败。
    Encode,
    /// 流水线抛出的未处理错误。
    EngineFailure,
    /// 引擎已关闭。
    EngineShutdown,
}

impl ErrorKind {
    /// 映射为稳定错误码。
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => codes::ARGUMENT_INVALID,
            ErrorKind::ProtocolViolation => codes::PROTOCOL_VIOLATION,
            ErrorKind::Decode => codes::CODEC_DECODE,
            ErrorKind::Encode => codes::CODEC_ENCODE,
            ErrorKind::EngineFailure => codes::ENGINE_FAILED,
            ErrorKind::EngineShutdown => codes::ENGINE_SHUTDOWN,
        }
    }

    /// 该类错误是否会让连接失去继续处理字节流的能力。
    pub fn is_fatal(self) -> bool {
        !matches!(self, ErrorKind::InvalidArgument)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// `EngineError` 是引擎内所有可观察错误的最终形态。
///
/// # 契约说明（What）
/// - `kind`：错误分类，同时决定稳定错误码；
/// - `message`：面向排障人员的描述，协议违规时包含触发违规的具体数值；
/// - 实现 `Clone`：解码器进入失败态后，后续每次调用都返回**同一份**已存储的错误，而不是重新推导。
///
/// # 执行逻辑（How）
/// - 构造函数按分类命名（[`EngineError::protocol_violation`] 等），调用点无需关心错误码；
/// - `Display` 只输出消息本身，错误码通过 [`EngineError::code`] 读取。
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    kind: ErrorKind,
    message: Cow<'static, str>,
}

impl EngineError {
    /// 以指定分类构造错误。
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 非法参数。
    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// 协议违规。
    pub fn protocol_violation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::ProtocolViolation, message)
    }

    /// performative 解码失败。
    pub fn decode(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    /// performative 编码失败。
    pub fn encode(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Encode, message)
    }

    /// 引擎失败。
    pub fn engine_failure(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::EngineFailure, message)
    }

    /// 引擎已关闭。
    pub fn shutdown(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::EngineShutdown, message)
    }

    /// 错误分类。
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// 人类可读描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 是否为协议违规。
    pub fn is_protocol_violation(&self) -> bool {
        self.kind == ErrorKind::ProtocolViolation
    }
}

/// crate 统一的结果别名。
pub type Result<T, E = EngineError> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn code_follows_kind() {
        let err = EngineError::protocol_violation("frame size 7 smaller than minimum 8");
        assert_eq!(err.code(), codes::PROTOCOL_VIOLATION);
        assert!(err.is_protocol_violation());
        assert_eq!(format!("{err}"), "frame size 7 smaller than minimum 8");
    }

    #[test]
    fn invalid_argument_is_not_fatal() {
        assert!(!ErrorKind::InvalidArgument.is_fatal());
        assert!(ErrorKind::ProtocolViolation.is_fatal());
        assert!(ErrorKind::EngineShutdown.is_fatal());
    }

    #[test]
    fn clones_compare_equal() {
        let err = EngineError::decode("unexpected constructor 0x71");
        let copy = err.clone();
        assert_eq!(err, copy);
        assert_eq!(copy.kind(), ErrorKind::Decode);
    }
}
