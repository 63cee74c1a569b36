use bytes::Bytes;
use uuid::Uuid;

use crate::generator::DeliveryTagGenerator;
use crate::tag::DeliveryTag;

/// 每次生成随机 16 字节（UUID v4）标签的生成器，标签从不复用。
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidTagGenerator;

impl UuidTagGenerator {
    /// 构造实例。
    pub fn new() -> Self {
        Self
    }
}

impl DeliveryTagGenerator for UuidTagGenerator {
    fn next_tag(&mut self) -> DeliveryTag {
        let id = Uuid::new_v4();
        DeliveryTag::unpooled(Bytes::copy_from_slice(id.as_bytes()))
    }
}
