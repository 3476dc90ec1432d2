//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将"外部输入语义"和"流水线中间/最终结果"解耦：
//! - `ImageSource` 表示外部来源语义（文件 / URL / 剪贴板）
//! - `RawImage` 表示已加载、已归一化但未解码的字节
//! - `SourceImage` 表示解码成功后持有的源图
//! - `ProcessedImage` 表示一次处理运行产出的派生图
//! - `TransformRequest` 表示调用方可调的目标参数

use image::DynamicImage;

/// 图片输入来源。
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// 本地文件路径来源。
    FilePath(String),
    /// 网络地址来源。
    Url(String),
    /// 系统剪贴板来源。
    Clipboard,
}

/// 加载阶段输出：原始字节、嗅探出的媒体类型与来源标识。
pub(crate) struct RawImage {
    /// 归一化之后的图片字节。
    pub(crate) bytes: Vec<u8>,
    /// 当前字节对应的媒体类型（如 `image/png`）。
    pub(crate) media_type: String,
    /// 若发生过格式归一化，记录输入原始的媒体类型。
    pub(crate) original_media_type: Option<String>,
    /// 摄取前输入的字节数（归一化不改变该值）。
    pub(crate) origin_byte_size: u64,
    /// 从归一化前的原始字节提取到的 EXIF 元数据。
    pub(crate) exif: Option<std::collections::BTreeMap<String, String>>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 当前持有的源图。
///
/// 宽高只在解码成功后被设置，合法实例恒为正值。
/// 位图由流水线实例独占持有，切换来源时整体释放。
pub struct SourceImage {
    /// 解码后的位图。
    pub(crate) raster: DynamicImage,
    /// 输入字节数。
    pub byte_size: u64,
    /// 固有宽度（像素）。
    pub width: u32,
    /// 固有高度（像素）。
    pub height: u32,
    /// 媒体类型（如 `image/png`）。
    pub media_type: String,
    /// 发生过归一化时的原始媒体类型（如 `image/heic`）。
    pub original_media_type: Option<String>,
}

impl SourceImage {
    /// 源图总像素数。
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// 一次处理运行的产物。
///
/// 每次运行整体替换旧值；重新摄取源图时被清空。
pub struct ProcessedImage {
    /// 编码后的输出字节。
    pub bytes: Vec<u8>,
    /// 输出字节数。
    pub byte_size: u64,
    /// 输出宽度（像素）。
    pub width: u32,
    /// 输出高度（像素）。
    pub height: u32,
    /// 输出媒体类型。
    pub media_type: String,
    /// 实际生效的质量值（仅有损格式有语义，其余恒为 100）。
    pub quality: u8,
    /// 相对源图的像素缩减率（百分比，一位小数，可为负）。
    pub pixel_reduction: f64,
}

/// 输出目标格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpg,
    Webp,
    Gif,
    Ico,
}

impl OutputFormat {
    /// 从外部字符串解析格式，未识别的值回落为 PNG。
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpg,
            "webp" => Self::Webp,
            "gif" => Self::Gif,
            "ico" => Self::Ico,
            _ => Self::Png,
        }
    }

    /// 稳定格式名，供快照与持久化使用。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Ico => "ico",
        }
    }

    /// 固定的媒体类型映射。
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Ico => "image/x-icon",
        }
    }

    /// 输出文件的常用扩展名。
    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    /// 是否为带质量参数的有损格式。
    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Jpg | Self::Webp)
    }
}

/// 目标参数集合。
///
/// 不变式：当格式不是 jpg/webp 时质量恒为 100，该约束在 `set_format`
/// 内收口，外部无法构造出违例状态。
#[derive(Debug, Clone)]
pub struct TransformRequest {
    /// 目标宽度；未设置时由规划器按源图推导。
    pub target_width: Option<u32>,
    /// 目标高度；未设置时由规划器按源图推导。
    pub target_height: Option<u32>,
    /// 目标格式。
    pub format: OutputFormat,
    /// 压缩质量（1–100），仅对有损格式生效。
    pub quality: u8,
}

impl Default for TransformRequest {
    fn default() -> Self {
        Self {
            target_width: None,
            target_height: None,
            format: OutputFormat::Png,
            quality: 90,
        }
    }
}

impl TransformRequest {
    /// 切换目标格式。切到非有损格式时质量强制回到 100。
    pub fn set_format(&mut self, format: OutputFormat) {
        self.format = format;
        if !format.is_lossy() {
            self.quality = 100;
        }
    }

    /// 设置压缩质量，收敛到 1–100。
    pub fn set_quality(&mut self, quality: u8) {
        self.quality = quality.clamp(1, 100);
    }
}
