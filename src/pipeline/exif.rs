//! # EXIF 元数据模块
//!
//! ## 设计思路
//!
//! 元数据提取是旁路能力：失败只记日志，绝不中断摄取链路。
//! 从原始字节解析（解码后的位图已丢弃元数据），输出"标签名 → 展示值"映射，
//! 供快照层直接透出。

use std::collections::BTreeMap;
use std::io::Cursor;

/// 从原始图片字节提取 EXIF 元数据。
///
/// 无元数据、容器不支持或解析失败时返回 `None`。
pub(crate) fn extract_exif(bytes: &[u8]) -> Option<BTreeMap<String, String>> {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(reader) => reader,
        Err(err) => {
            log::debug!("EXIF 解析失败（忽略）：{}", err);
            return None;
        }
    };

    let mut metadata = BTreeMap::new();
    for field in reader.fields() {
        // 仅收主图目录，忽略缩略图目录的重复标签
        if field.ifd_num != exif::In::PRIMARY {
            continue;
        }

        metadata.insert(
            field.tag.to_string(),
            field.display_value().with_unit(&reader).to_string(),
        );
    }

    if metadata.is_empty() {
        None
    } else {
        log::info!("📷 提取到 {} 条 EXIF 元数据", metadata.len());
        Some(metadata)
    }
}
