//! 帧解析共享的字节辅助函数。
//!
//! 入站字节统一以 `bytes::BytesMut` 累积，完整帧通过 `split_to(..).freeze()` 切出，
//! 负载是该帧的 `Bytes::slice` 视图，整个解码路径不复制负载。

use alloc::string::String;

/// 违规消息中最多展示的字节数。
const PREVIEW_LIMIT: usize = 16;

/// 读取大端 `u32`；调用方保证 `src.len() >= offset + 4`。
pub(crate) fn read_u32_be(src: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        src[offset],
        src[offset + 1],
        src[offset + 2],
        src[offset + 3],
    ])
}

/// 读取大端 `u16`；调用方保证 `src.len() >= offset + 2`。
pub(crate) fn read_u16_be(src: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([src[offset], src[offset + 1]])
}

/// 读取大端 `u64`；调用方保证 `src.len() >= offset + 8`。
pub(crate) fn read_u64_be(src: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&src[offset..offset + 8]);
    u64::from_be_bytes(raw)
}

/// 把字节序列渲染为十六进制预览，超过上限时以 `..` 截断。
pub(crate) fn hex_preview(src: &[u8]) -> String {
    if src.len() <= PREVIEW_LIMIT {
        hex::encode(src)
    } else {
        let mut rendered = hex::encode(&src[..PREVIEW_LIMIT]);
        rendered.push_str("..");
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_fields() {
        let raw = [0xa0, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x02];
        assert_eq!(read_u32_be(&raw, 0), 0xa000_0000);
        assert_eq!(read_u16_be(&raw, 6), 0x0102);
        assert_eq!(read_u64_be(&raw, 0), 0xa000_0000_0200_0102);
    }

    #[test]
    fn preview_truncates_long_input() {
        assert_eq!(hex_preview(b"AMQP"), "414d5150");
        let long = [0u8; 20];
        let rendered = hex_preview(&long);
        assert!(rendered.ends_with(".."));
        assert_eq!(rendered.len(), PREVIEW_LIMIT * 2 + 2);
    }
}
