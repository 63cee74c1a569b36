use alloc::boxed::Box;

use serde::{Deserialize, Serialize};
use spark_amqp::Result;

use crate::empty::EmptyTagGenerator;
use crate::pooled::{DEFAULT_POOL_CAPACITY, PooledTagGenerator};
use crate::sequential::SequentialTagGenerator;
use crate::tag::DeliveryTag;
use crate::uuid_tag::UuidTagGenerator;

/// 投递标签生成器。
///
/// # 契约说明（What）
/// - `next_tag` 总是返回一个标签；
/// - 对返回标签调用 [`DeliveryTag::release`] 任意次都是安全的，是否复用由具体策略决定。
pub trait DeliveryTagGenerator: Send {
    /// 生成下一个标签。
    fn next_tag(&mut self) -> DeliveryTag;
}

/// 链路配置阶段选择的标签策略。
///
/// 以 `kind` 字段区分，例如 TOML 中的 `kind = "pooled"` 与 `capacity = 1024`。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryTagStrategy {
    /// 零长度标签。
    Empty,
    /// 最小宽度编码的递增计数。
    #[default]
    Sequential,
    /// 复用已释放标签的池。
    Pooled {
        /// 池容量，范围 `1..=65536`。
        #[serde(default = "default_capacity")]
        capacity: usize,
    },
    /// 随机 UUID。
    Uuid,
}

fn default_capacity() -> usize {
    DEFAULT_POOL_CAPACITY
}

impl DeliveryTagStrategy {
    /// 按策略构造生成器。
    ///
    /// # 错误
    /// - 池容量不合法时返回 `InvalidArgument`。
    pub fn new_generator(self) -> Result<Box<dyn DeliveryTagGenerator>> {
        Ok(match self {
            DeliveryTagStrategy::Empty => Box::new(EmptyTagGenerator::new()),
            DeliveryTagStrategy::Sequential => Box::new(SequentialTagGenerator::new()),
            DeliveryTagStrategy::Pooled { capacity } => {
                Box::new(PooledTagGenerator::with_capacity(capacity)?)
            }
            DeliveryTagStrategy::Uuid => Box::new(UuidTagGenerator::new()),
        })
    }
}
