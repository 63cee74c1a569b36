use bytes::Bytes;

/// 表示 `value` 所需的最小字节宽度：1、2、4 或 8。
pub fn width_for(value: u64) -> usize {
    if value <= u64::from(u8::MAX) {
        1
    } else if value <= u64::from(u16::MAX) {
        2
    } else if value <= u64::from(u32::MAX) {
        4
    } else {
        8
    }
}

/// 以最小宽度大端编码。
pub(crate) fn encode_minimal(value: u64) -> Bytes {
    let width = width_for(value);
    Bytes::copy_from_slice(&value.to_be_bytes()[8 - width..])
}

/// 从线上字节还原数值；长度不是 1/2/4/8 时返回 `None`。
pub fn decode_minimal(raw: &[u8]) -> Option<u64> {
    match raw.len() {
        1 | 2 | 4 | 8 => Some(
            raw.iter()
                .fold(0u64, |value, byte| (value << 8) | u64::from(*byte)),
        ),
        _ => None,
    }
}
