use std::sync::OnceLock;

use bytes::Bytes;

use crate::generator::DeliveryTagGenerator;
use crate::tag::DeliveryTag;

static EMPTY_TAG: OnceLock<DeliveryTag> = OnceLock::new();

/// 总是返回同一个进程级零长度标签的生成器。
///
/// 生成器本身是零大小类型，所有实例行为一致；交出的标签对象在整个进程内唯一。
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyTagGenerator;

impl EmptyTagGenerator {
    /// 构造实例。
    pub fn new() -> Self {
        Self
    }

    /// 进程级共享的零长度标签。
    pub fn shared_tag() -> DeliveryTag {
        EMPTY_TAG
            .get_or_init(|| DeliveryTag::unpooled(Bytes::new()))
            .clone()
    }
}

impl DeliveryTagGenerator for EmptyTagGenerator {
    fn next_tag(&mut self) -> DeliveryTag {
        Self::shared_tag()
    }
}
