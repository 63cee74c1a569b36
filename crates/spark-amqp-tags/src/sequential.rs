use crate::generator::DeliveryTagGenerator;
use crate::tag::DeliveryTag;
use crate::width::encode_minimal;

/// 以最小宽度编码递增计数的生成器。
///
/// 计数从 0 开始，每次加 1，越过 `u64::MAX` 后静默回绕到 0；标签从不复用。
#[derive(Clone, Debug, Default)]
pub struct SequentialTagGenerator {
    next: u64,
}

impl SequentialTagGenerator {
    /// 从 0 开始计数。
    pub fn new() -> Self {
        Self::default()
    }

    /// 从给定值开始计数。
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    /// 下一次将要编码的计数值。
    pub fn peek(&self) -> u64 {
        self.next
    }
}

impl DeliveryTagGenerator for SequentialTagGenerator {
    fn next_tag(&mut self) -> DeliveryTag {
        let tag = DeliveryTag::unpooled(encode_minimal(self.next));
        self.next = self.next.wrapping_add(1);
        tag
    }
}
