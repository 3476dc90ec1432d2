//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有"可调策略"集中到 `PipelineConfig`，保证运行时行为可观测、可调整、可测试。
//! 字段覆盖下载、解码与重采样三个阶段；`Default` 提供生产可用的平衡配置。

use image::imageops::FilterType;

/// 流水线处理配置。
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 摄取原始字节时允许的最大体积（字节）。
    pub max_file_size: u64,
    /// 网络下载整体超时时间（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 下载首包超时时间（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 下载分块读取超时时间（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 最大重定向次数，避免无限跳转或恶意链路。
    pub max_redirects: usize,
    /// 是否允许访问内网或本地地址（默认关闭，防 SSRF）。
    pub allow_private_network: bool,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 重采样滤镜策略。缩放时必须是卷积类滤镜，不使用最近邻。
    pub resize_filter: FilterType,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            max_redirects: 5,
            allow_private_network: false,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            resize_filter: FilterType::CatmullRom,
        }
    }
}
