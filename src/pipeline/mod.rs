//! # 图片变换流水线
//!
//! ## 架构
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌─────────┐   ┌───────────┐
//! │  ingest   │ → │ normalize │ → │  plan   │ → │  encode   │
//! │ 来源摄取  │   │ 格式归一化│   │ 尺寸规划│   │ 重采样/编码│
//! └───────────┘   └───────────┘   └─────────┘   └───────────┘
//!        └──────────── orchestrator 状态机统一驱动 ────────────┘
//! ```
//!
//! - `source`：来源语义与中间/产物模型
//! - `ingest`：文件 / URL / 剪贴板三条摄取链路与安全校验
//! - `normalize`：HEIC 系容器识别与转换原语契约
//! - `plan`：等比尺寸规划（纯函数）
//! - `encode`：卷积重采样与目标格式编码
//! - `metrics`：压缩率 / 像素缩减率派生指标（纯函数）
//! - `exif`：旁路 EXIF 元数据提取
//! - `notify`：结果通知出口契约
//! - `orchestrator`：`Pipeline` 状态机与对外快照

pub mod config;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod notify;
pub mod orchestrator;
pub mod plan;
pub mod source;

mod encode;
mod exif;
mod ingest;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use normalize::NormalizePrimitive;
pub use notify::{LogNotifier, NotificationSink, Severity};
pub use orchestrator::{
    Pipeline, PipelineSnapshot, PipelineState, ProcessedSummary, SourceSummary,
};
pub use source::{ImageSource, OutputFormat, ProcessedImage, SourceImage, TransformRequest};
