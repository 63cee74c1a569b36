//! 分帧处理器：入站解码、出站编码与帧日志。
//!
//! 三者都是普通的 [`EngineHandler`](crate::pipeline::EngineHandler)，
//! [`Engine::with_frame_codec`](crate::Engine::with_frame_codec) 按
//! `frame-decoder → frame-encoder → frame-logger` 的顺序安装它们。

mod decoder;
mod encoder;
mod logging;

pub use decoder::{FRAME_HEADER_SIZE, FrameDecodingHandler, FrameEvent, FrameParser};
pub use encoder::FrameEncodingHandler;
pub use logging::FrameLoggingHandler;
