//! 引擎流水线：具名处理器链与事件传播。
//!
//! - [`EngineHandler`]：处理器能力集合，每个回调默认原样转发；
//! - [`EngineHandlerContext`]：链路节点；
//! - [`ChainContext`]：一次事件传播中的游标；
//! - [`EnginePipeline`]：链路的增删查与事件入口。

mod context;
mod handler;
#[allow(clippy::module_inception)]
mod pipeline;

pub use context::{ChainContext, EngineHandlerContext};
pub use handler::EngineHandler;
pub use pipeline::EnginePipeline;
