use alloc::{collections::VecDeque, format, sync::Arc, vec, vec::Vec};

use spark_amqp::{EngineError, Result};
use spin::Mutex;

use crate::generator::DeliveryTagGenerator;
use crate::tag::DeliveryTag;
use crate::width::encode_minimal;

/// 默认池容量。
pub const DEFAULT_POOL_CAPACITY: usize = 65_535;

/// 池化区间的标签以 2 字节编码，容量上限为 `u16` 的取值个数。
pub const MAX_POOL_CAPACITY: usize = 1 << 16;

/// 生成器与其交出的标签共享的复用队列。
pub(crate) struct PoolShared {
    free: Mutex<FreeList>,
}

struct FreeList {
    queue: VecDeque<u16>,
    released: Vec<u64>,
}

impl FreeList {
    fn is_free(&self, id: u16) -> bool {
        let index = usize::from(id);
        self.released[index / 64] & (1 << (index % 64)) != 0
    }

    fn set_free(&mut self, id: u16, free: bool) {
        let index = usize::from(id);
        let mask = 1u64 << (index % 64);
        if free {
            self.released[index / 64] |= mask;
        } else {
            self.released[index / 64] &= !mask;
        }
    }
}

impl PoolShared {
    fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(FreeList {
                queue: VecDeque::new(),
                released: vec![0; capacity.div_ceil(64)],
            }),
        }
    }

    pub(crate) fn release(&self, id: u16) {
        let mut free = self.free.lock();
        if free.is_free(id) {
            return;
        }
        free.set_free(id, true);
        free.queue.push_back(id);
    }

    fn acquire(&self) -> Option<u16> {
        let mut free = self.free.lock();
        let id = free.queue.pop_front()?;
        free.set_free(id, false);
        Some(id)
    }
}

/// 复用已释放标签对象的生成器。
///
/// # 契约说明（What）
/// - 池化区间为 id `0..capacity`，这些标签以 2 字节大端编码，对象在整个生成器生命周期内保持不变；
/// - `next_tag` 优先按释放顺序（FIFO）复用已释放的池化标签；其次交出尚未使用过的池化 id；
///   池化区间全部在外时，从 `capacity` 开始以最小宽度编码铸造溢出标签，计数到 `u64::MAX` 后回绕到 `capacity`；
/// - 溢出标签不受池跟踪，其 `release` 为无操作；池化标签重复释放不会在复用队列中重复出现。
///
/// # 执行逻辑（How）
/// - 池化标签对象按需创建并存入 arena，复用时克隆 arena 中的同一对象；
/// - 复用队列与“已释放”位图由 `spin::Mutex` 保护，标签通过弱引用回到池，生成器销毁后释放自动失效。
pub struct PooledTagGenerator {
    shared: Arc<PoolShared>,
    arena: Vec<DeliveryTag>,
    capacity: usize,
    overflow: u64,
    exhausted_logged: bool,
}

impl PooledTagGenerator {
    /// 以默认容量构造。
    pub fn new() -> Self {
        Self::build(DEFAULT_POOL_CAPACITY)
    }

    /// 以给定容量构造。
    ///
    /// # 错误
    /// - 容量为 0 或超过 [`MAX_POOL_CAPACITY`] 时返回 `InvalidArgument`。
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_POOL_CAPACITY {
            return Err(EngineError::invalid_argument(format!(
                "delivery tag pool capacity {capacity} outside 1..={MAX_POOL_CAPACITY}"
            )));
        }
        Ok(Self::build(capacity))
    }

    fn build(capacity: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared::new(capacity)),
            arena: Vec::new(),
            capacity,
            overflow: capacity as u64,
            exhausted_logged: false,
        }
    }

    /// 池容量。
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn mint_overflow(&mut self) -> DeliveryTag {
        if !self.exhausted_logged {
            self.exhausted_logged = true;
            tracing::debug!(
                capacity = self.capacity,
                "delivery tag pool exhausted, minting overflow tags"
            );
        }
        let tag = DeliveryTag::unpooled(encode_minimal(self.overflow));
        self.overflow = match self.overflow.checked_add(1) {
            Some(next) => next,
            None => self.capacity as u64,
        };
        tag
    }
}

impl Default for PooledTagGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryTagGenerator for PooledTagGenerator {
    fn next_tag(&mut self) -> DeliveryTag {
        if let Some(id) = self.shared.acquire() {
            return self.arena[usize::from(id)].clone();
        }
        if self.arena.len() < self.capacity {
            // arena 长度即下一个未使用的 id，容量上限保证其落在 u16 内
            let id = self.arena.len() as u16;
            let tag = DeliveryTag::pooled(id, Arc::downgrade(&self.shared));
            self.arena.push(tag.clone());
            return tag;
        }
        self.mint_overflow()
    }
}
