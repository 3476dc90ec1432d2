//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载流水线全链路的失败来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 每个分支都有稳定的 `code()` 标识，错误态快照与日志统一携带该标识，
//! 便于前端归类展示与告警聚合。

/// 流水线统一错误类型。
///
/// 摄取 / 归一化 / 解码 / 编码各阶段的失败最终都会收敛到编排器边界，
/// 以 `Error` 状态 + 通知的形式暴露，不会越过编排器向外抛出。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 输入不是可解码的图片类型。
    #[error("不支持的图片格式：{0}")]
    UnsupportedFormat(String),

    /// 字节已就位但无法解码为位图。
    #[error("图片解码失败：{0}")]
    DecodeFailure(String),

    /// 非标准容器（HEIC 系）转换失败，或缺少可用的转换原语。
    #[error("格式归一化失败：{0}")]
    NormalizationFailure(String),

    /// 网络获取阶段失败（URL 解析 / 连接 / 传输 / 超时）。
    #[error("图片下载失败：{0}")]
    FetchFailure(String),

    /// 剪贴板内容中找不到图片（既无位图条目，文本也不是图片地址）。
    #[error("剪贴板中没有找到图片")]
    NoImageFound,

    /// 剪贴板本身不可用或读取失败。
    #[error("剪贴板读取失败：{0}")]
    TransferFailure(String),

    /// 目标格式编码器无法产出字节。
    #[error("图片编码失败：{0}")]
    EncodeFailure(String),

    /// 体积 / 像素 / 内存等资源上限被触发。
    #[error("资源限制：{0}")]
    ResourceLimit(String),
}

impl PipelineError {
    /// 稳定错误码，供错误态快照与日志检索使用。
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::DecodeFailure(_) => "decode_failure",
            Self::NormalizationFailure(_) => "normalization_failure",
            Self::FetchFailure(_) => "fetch_failure",
            Self::NoImageFound => "no_image_found",
            Self::TransferFailure(_) => "transfer_failure",
            Self::EncodeFailure(_) => "encode_failure",
            Self::ResourceLimit(_) => "resource_limit",
        }
    }
}

impl From<PipelineError> for String {
    /// 兼容部分仍使用字符串错误的调用点。
    fn from(error: PipelineError) -> Self {
        error.to_string()
    }
}
