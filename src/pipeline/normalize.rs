//! # 格式归一化模块
//!
//! ## 设计思路
//!
//! 标准解码器不认识 HEIC 系容器（相机原生格式）。摄取前先做签名识别，
//! 命中时调用注入的转换原语，把像素内容转成可直接解码的标准栅格。
//! 转换失败必须中断摄取，绝不把原始字节继续喂给解码器。
//!
//! 转换原语本身是外部协作者（平台解码库 / 外部进程），流水线只依赖
//! `NormalizePrimitive` 契约，未注入原语时命中即失败。

use super::error::PipelineError;

/// HEIC 系容器的 ftyp 品牌标识。
const HEIF_BRANDS: [&[u8; 4]; 6] = [b"heic", b"heix", b"hevc", b"hevx", b"mif1", b"msf1"];

/// 非标准容器转换原语契约。
///
/// 输入 HEIC 系字节，输出可直接解码的标准栅格字节（默认约定为无损 PNG）。
pub trait NormalizePrimitive: Send + Sync {
    /// 执行容器转换，保持像素内容不变。
    fn normalize(&self, bytes: &[u8]) -> Result<Vec<u8>, PipelineError>;

    /// 转换产物的媒体类型。
    fn output_media_type(&self) -> &'static str {
        "image/png"
    }
}

/// 判断字节是否属于标准解码器无法直接处理的 HEIC 系容器。
///
/// ISO BMFF 布局：偏移 4 起为 `ftyp`，紧随其后 4 字节是主品牌。
pub fn is_nonstandard_format(bytes: &[u8]) -> bool {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return false;
    }

    let brand = &bytes[8..12];
    HEIF_BRANDS.iter().any(|known| &brand == known)
}

/// 非标准容器对应的媒体类型标识。
pub(crate) fn nonstandard_media_type(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| "image/heic".to_string())
}

/// 按需执行归一化。
///
/// 返回（可解码字节，媒体类型，原始媒体类型）。未命中非标准签名时原样透传。
pub(crate) fn normalize_if_needed(
    primitive: Option<&dyn NormalizePrimitive>,
    bytes: Vec<u8>,
) -> Result<(Vec<u8>, Option<&'static str>, Option<String>), PipelineError> {
    if !is_nonstandard_format(&bytes) {
        return Ok((bytes, None, None));
    }

    let original_media_type = nonstandard_media_type(&bytes);

    let Some(primitive) = primitive else {
        return Err(PipelineError::NormalizationFailure(format!(
            "缺少 {} 的转换原语",
            original_media_type
        )));
    };

    log::info!("🔄 检测到非标准容器（{}），执行归一化", original_media_type);

    let normalized = primitive.normalize(&bytes)?;
    Ok((
        normalized,
        Some(primitive.output_media_type()),
        Some(original_media_type),
    ))
}
