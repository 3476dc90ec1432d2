//! # 图片摄取·变换·压缩流水线 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     调用方 (CLI / 上层应用)               │
//! │                                                          │
//! │   Pipeline::ingest(…) ── set_* 参数调整 ── process()      │
//! │                    ↕ PipelineSnapshot                    │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ Result<T, PipelineError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕          pipeline (Rust)                         │
//! │                                                          │
//! │  ┌─ error ──────── PipelineError (统一错误类型 + 错误码)  │
//! │  │                                                       │
//! │  ├─ ingest ─────── 文件/URL/剪贴板摄取 + 安全校验          │
//! │  ├─ normalize ──── HEIC 系容器识别与转换原语               │
//! │  ├─ plan ───────── 等比尺寸规划（纯函数）                  │
//! │  ├─ encode ─────── 卷积重采样 + png/jpg/webp/gif/ico 编码 │
//! │  ├─ metrics ────── 压缩率 / 像素缩减率                    │
//! │  ├─ exif ───────── 旁路元数据提取                         │
//! │  ├─ notify ─────── 结果通知出口                           │
//! │  └─ orchestrator ─ Pipeline 状态机 + 快照                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`pipeline::error`] | 统一错误类型 `PipelineError`，携带稳定错误码 |
//! | [`pipeline::config`] | 下载/解码/重采样的可调安全阈值 |
//! | [`pipeline::ingest`] | 文件、URL、剪贴板三条摄取链路与 SSRF/大小校验 |
//! | [`pipeline::normalize`] | HEIC 系容器签名识别与 `NormalizePrimitive` 契约 |
//! | [`pipeline::plan`] | 按单边约束等比推导目标尺寸 |
//! | [`pipeline::encode`] | `fast_image_resize` 卷积重采样与目标格式编码 |
//! | [`pipeline::metrics`] | 字节压缩率、像素缩减率派生指标 |
//! | [`pipeline::exif`] | 原始字节中的 EXIF 元数据提取（旁路，失败不中断） |
//! | [`pipeline::orchestrator`] | `Pipeline` 状态机、参数编辑、快照输出 |

pub mod pipeline;

pub use pipeline::{
    ImageSource, LogNotifier, NormalizePrimitive, NotificationSink, OutputFormat, Pipeline,
    PipelineConfig, PipelineError, PipelineSnapshot, PipelineState, ProcessedImage, Severity,
    SourceImage, TransformRequest,
};
