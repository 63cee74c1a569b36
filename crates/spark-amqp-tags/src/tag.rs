use alloc::sync::{Arc, Weak};
use core::{
    fmt,
    hash::{Hash, Hasher},
};

use bytes::{BufMut, Bytes, BytesMut};

use crate::pooled::PoolShared;

/// 池化标签在池中的位置。
struct PoolSlot {
    id: u16,
    pool: Weak<PoolShared>,
}

struct TagInner {
    bytes: Bytes,
    slot: Option<PoolSlot>,
}

/// 投递标签。
///
/// # 契约说明（What）
/// - 克隆共享同一个对象：池化生成器复用标签时返回的正是此前交出的对象，可用 [`DeliveryTag::ptr_eq`] 验证；
/// - 相等性与哈希只看字节，不看身份；
/// - [`DeliveryTag::release`] 幂等：池化标签首次释放时回到池的复用队列，其余情况为无操作。
#[derive(Clone)]
pub struct DeliveryTag {
    inner: Arc<TagInner>,
}

impl DeliveryTag {
    /// 由线上收到的字节构造，不参与任何池。
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::unpooled(bytes.into())
    }

    pub(crate) fn unpooled(bytes: Bytes) -> Self {
        Self {
            inner: Arc::new(TagInner { bytes, slot: None }),
        }
    }

    pub(crate) fn pooled(id: u16, pool: Weak<PoolShared>) -> Self {
        Self {
            inner: Arc::new(TagInner {
                bytes: Bytes::copy_from_slice(&id.to_be_bytes()),
                slot: Some(PoolSlot { id, pool }),
            }),
        }
    }

    /// 标签字节。
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner.bytes
    }

    /// 标签字节的共享视图。
    pub fn bytes(&self) -> &Bytes {
        &self.inner.bytes
    }

    /// 字节长度。
    pub fn len(&self) -> usize {
        self.inner.bytes.len()
    }

    /// 是否为零长度标签。
    pub fn is_empty(&self) -> bool {
        self.inner.bytes.is_empty()
    }

    /// 追加写入缓冲。
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.put_slice(&self.inner.bytes);
    }

    /// 是否与 `other` 为同一个对象。
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// 是否来自池化生成器的可复用区间。
    pub fn is_pooled(&self) -> bool {
        self.inner.slot.is_some()
    }

    /// 把标签交还给所属池；非池化标签、已释放的标签或池已销毁时为无操作。
    pub fn release(&self) {
        if let Some(slot) = &self.inner.slot
            && let Some(pool) = slot.pool.upgrade()
        {
            pool.release(slot.id);
        }
    }
}

impl PartialEq for DeliveryTag {
    fn eq(&self, other: &Self) -> bool {
        self.inner.bytes == other.inner.bytes
    }
}

impl Eq for DeliveryTag {}

impl Hash for DeliveryTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.bytes.hash(state);
    }
}

impl AsRef<[u8]> for DeliveryTag {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("DeliveryTag");
        debug.field("bytes", &self.inner.bytes);
        if let Some(slot) = &self.inner.slot {
            debug.field("pool_id", &slot.id);
        }
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_identity() {
        let left = DeliveryTag::from_bytes(vec![1, 2, 3]);
        let right = DeliveryTag::from_bytes(Bytes::from_static(&[1, 2, 3]));
        assert_eq!(left, right);
        assert!(!left.ptr_eq(&right));
        assert!(left.ptr_eq(&left.clone()));
    }

    #[test]
    fn unpooled_release_is_a_no_op() {
        let tag = DeliveryTag::from_bytes(vec![9]);
        tag.release();
        tag.release();
        assert!(!tag.is_pooled());
        let mut buffer = BytesMut::new();
        tag.write_to(&mut buffer);
        assert_eq!(&buffer[..], &[9]);
    }
}
