//! 引擎配置：入站帧上限与帧日志开关。
//!
//! # 契约说明（What）
//! - 所有字段均带默认值，TOML 中缺省的键回落到 [`EngineConfiguration::default`]；
//! - [`EngineConfiguration::validate`] 在装载后执行，任何低于 AMQP 最小帧上限（512 字节）的配置都被拒绝；
//! - 配置由 [`Engine`](crate::Engine) 持有，解码器在每个帧头到达时读取最新值，因此 Open 协商后调高上限会立即生效。

use alloc::format;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// AMQP 1.0 规定的最小“最大帧长度”，任何一端都必须能够接收这一尺寸的帧。
pub const MIN_MAX_FRAME_SIZE: u32 = 512;

/// 默认的入站 AMQP 帧上限。
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 65_536;

/// 默认的入站 SASL 帧上限。
pub const DEFAULT_SASL_MAX_FRAME_SIZE: u32 = MIN_MAX_FRAME_SIZE;

/// 引擎配置快照。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfiguration {
    /// 协商为 AMQP 后允许的最大入站帧（含 8 字节帧头）。
    pub max_frame_size: u32,
    /// 协商为 SASL 期间允许的最大入站帧。
    pub sasl_max_frame_size: u32,
    /// 是否在默认流水线中安装帧日志处理器。
    pub trace_frames: bool,
}

impl Default for EngineConfiguration {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            sasl_max_frame_size: DEFAULT_SASL_MAX_FRAME_SIZE,
            trace_frames: false,
        }
    }
}

impl EngineConfiguration {
    /// 从 TOML 文本装载配置并立即校验。
    ///
    /// # 执行逻辑（How）
    /// 1. 使用 `toml` 反序列化，未知键直接报错；
    /// 2. 调用 [`Self::validate`]，两类错误都映射为 `InvalidArgument`。
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let configuration: Self = toml::from_str(source).map_err(|err| {
            EngineError::invalid_argument(format!("invalid engine configuration: {err}"))
        })?;
        configuration.validate()?;
        Ok(configuration)
    }

    /// 设置 AMQP 帧上限。
    pub fn with_max_frame_size(mut self, max_frame_size: u32) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// 设置 SASL 帧上限。
    pub fn with_sasl_max_frame_size(mut self, sasl_max_frame_size: u32) -> Self {
        self.sasl_max_frame_size = sasl_max_frame_size;
        self
    }

    /// 开关帧日志。
    pub fn with_trace_frames(mut self, trace_frames: bool) -> Self {
        self.trace_frames = trace_frames;
        self
    }

    /// 校验帧上限不低于 [`MIN_MAX_FRAME_SIZE`]。
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_size < MIN_MAX_FRAME_SIZE {
            return Err(EngineError::invalid_argument(format!(
                "max_frame_size {} smaller than the AMQP minimum {}",
                self.max_frame_size, MIN_MAX_FRAME_SIZE
            )));
        }
        if self.sasl_max_frame_size < MIN_MAX_FRAME_SIZE {
            return Err(EngineError::invalid_argument(format!(
                "sasl_max_frame_size {} smaller than the AMQP minimum {}",
                self.sasl_max_frame_size, MIN_MAX_FRAME_SIZE
            )));
        }
        Ok(())
    }

    pub(crate) fn limits(&self) -> FrameLimits {
        FrameLimits {
            max_frame_size: self.max_frame_size,
            sasl_max_frame_size: self.sasl_max_frame_size,
        }
    }
}

/// 解码器在单次解析中使用的上限快照。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLimits {
    /// AMQP 帧上限。
    pub max_frame_size: u32,
    /// SASL 帧上限。
    pub sasl_max_frame_size: u32,
}

impl Default for FrameLimits {
    fn default() -> Self {
        EngineConfiguration::default().limits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn empty_document_yields_defaults() {
        let configuration = EngineConfiguration::from_toml_str("").expect("空配置应回落默认值");
        assert_eq!(configuration, EngineConfiguration::default());
        assert_eq!(configuration.max_frame_size, 65_536);
        assert_eq!(configuration.sasl_max_frame_size, 512);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let configuration =
            EngineConfiguration::from_toml_str("max_frame_size = 1048576\ntrace_frames = true")
                .expect("合法配置");
        assert_eq!(configuration.max_frame_size, 1_048_576);
        assert_eq!(configuration.sasl_max_frame_size, DEFAULT_SASL_MAX_FRAME_SIZE);
        assert!(configuration.trace_frames);
    }

    #[test]
    fn limit_below_minimum_is_rejected() {
        let err = EngineConfiguration::from_toml_str("max_frame_size = 256")
            .expect_err("低于 512 的上限必须被拒绝");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.message().contains("256"));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = EngineConfiguration::from_toml_str("idle_timeout = 5")
            .expect_err("未知键必须报错");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
