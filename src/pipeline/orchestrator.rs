//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `Pipeline` 把原来散落的状态变量收敛为一台显式状态机：
//!
//! ```text
//! Idle → Loading → Loaded → Processing → Processed
//!            ↓         ↓          ↓            ↓
//!          Error     Error      Error     （可再次 Processing）
//! ```
//!
//! 所有迁移都经由本模块的方法发生，外部无法绕过方法单独改写字段。
//! `Error` 非终态：携带错误码与可读消息，调用方可直接重试摄取。
//!
//! ## 实现思路
//!
//! - 摄取与处理都是 `&mut self` 的 async 方法，借用检查静态保证
//!   同一实例不会并发跑两条链路，天然杜绝"后发先至"竞态。
//! - 派生值（压缩率 / 可压缩格式标志）按读取重新计算，不冗余存储。
//! - 各阶段失败统一收敛：状态置 `Error`、发通知、按值返回错误。
//! - 记录 load / render / encode / total 阶段耗时，便于性能诊断。

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use super::config::PipelineConfig;
use super::encode;
use super::error::PipelineError;
use super::ingest::ClipboardPayload;
use super::metrics;
use super::normalize::NormalizePrimitive;
use super::notify::{LogNotifier, NotificationSink, Severity};
use super::plan::plan_dimensions;
use super::source::{ImageSource, ProcessedImage, RawImage, SourceImage, TransformRequest};
pub use super::source::OutputFormat;

/// 流水线状态。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    /// 尚未摄取任何来源。
    Idle,
    /// 摄取进行中。
    Loading,
    /// 源图就位，等待参数调整或处理请求。
    Loaded,
    /// 处理运行中。
    Processing,
    /// 最近一次处理已产出结果。
    Processed,
    /// 最近一次摄取/处理失败；非终态，可重试。
    Error {
        /// 稳定错误码（见 [`PipelineError::code`]）。
        code: &'static str,
        /// 面向用户的可读消息。
        message: String,
    },
}

impl PipelineState {
    /// 稳定状态名，供快照与日志使用。
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Error { .. } => "error",
        }
    }
}

/// 图片变换流水线编排器。
///
/// 持有当前源图、最近产物与目标参数，顺序驱动
/// 摄取 → 规划 → 重采样 → 编码 各组件。
///
/// # 示例
/// ```rust,no_run
/// use imagepress::pipeline::{OutputFormat, Pipeline};
///
/// # async fn demo() -> Result<(), imagepress::pipeline::PipelineError> {
/// let mut pipeline = Pipeline::new();
/// pipeline.ingest_from_file("photo.jpg".as_ref()).await?;
/// pipeline.set_target_width(Some(800));
/// pipeline.set_format(OutputFormat::Webp);
/// pipeline.set_quality(80);
/// pipeline.process().await?;
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    normalizer: Option<Box<dyn NormalizePrimitive>>,
    notifier: Box<dyn NotificationSink>,
    state: PipelineState,
    source: Option<SourceImage>,
    processed: Option<ProcessedImage>,
    request: TransformRequest,
    exif: Option<BTreeMap<String, String>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// 使用默认配置创建流水线。
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    /// 使用自定义配置创建流水线。
    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            config,
            normalizer: None,
            notifier: Box::new(LogNotifier),
            state: PipelineState::Idle,
            source: None,
            processed: None,
            request: TransformRequest::default(),
            exif: None,
        }
    }

    /// 注入非标准容器转换原语。
    pub fn with_normalizer(mut self, normalizer: Box<dyn NormalizePrimitive>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// 注入通知出口，替代默认的日志投递。
    pub fn with_notifier(mut self, notifier: Box<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub(super) fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub(super) fn normalizer(&self) -> Option<&dyn NormalizePrimitive> {
        self.normalizer.as_deref()
    }

    // ------------------------------------------------------------------
    // 摄取入口
    // ------------------------------------------------------------------

    /// 按来源语义分派摄取。
    pub async fn ingest(&mut self, source: ImageSource) -> Result<(), PipelineError> {
        match source {
            ImageSource::FilePath(path) => self.ingest_from_file(Path::new(&path)).await,
            ImageSource::Url(url) => self.ingest_from_url(&url).await,
            ImageSource::Clipboard => self.ingest_from_clipboard().await,
        }
    }

    /// 从本地文件摄取源图。
    pub async fn ingest_from_file(&mut self, path: &Path) -> Result<(), PipelineError> {
        self.begin_ingest();
        let outcome = self.load_from_file_raw(path);
        self.finish_ingest(outcome, "图片已读取")
    }

    /// 从 URL 摄取源图。
    pub async fn ingest_from_url(&mut self, url: &str) -> Result<(), PipelineError> {
        self.begin_ingest();
        let outcome = self.load_from_url_raw(url).await;
        self.finish_ingest(outcome, "已从 URL 读取图片")
    }

    /// 从系统剪贴板摄取源图。
    ///
    /// 位图条目优先；缺失时按文本语义回退（Data URL / http 地址）。
    pub async fn ingest_from_clipboard(&mut self) -> Result<(), PipelineError> {
        self.begin_ingest();

        let payload = match self.read_clipboard() {
            Ok(payload) => payload,
            Err(err) => return self.fail(err),
        };

        let outcome = match payload {
            ClipboardPayload::Raster(bytes) => self.prepare_raw_bytes(bytes, "clipboard"),
            ClipboardPayload::DataUri(data) => self.load_from_base64_raw(&data),
            ClipboardPayload::Url(url) => self.load_from_url_raw(&url).await,
        };

        self.finish_ingest(outcome, "已从剪贴板读取图片")
    }

    /// 摄取起点：进入 Loading，并先行丢弃旧产物。
    ///
    /// 旧产物在新来源就位前清空，保证任何时刻产物都派生自当前源图。
    fn begin_ingest(&mut self) {
        self.state = PipelineState::Loading;
        self.processed = None;
    }

    /// 摄取终点：落盘源图与元数据，或收敛为错误态。
    fn finish_ingest(
        &mut self,
        outcome: Result<RawImage, PipelineError>,
        success_message: &str,
    ) -> Result<(), PipelineError> {
        let mut raw = match outcome {
            Ok(raw) => raw,
            Err(err) => return self.fail(err),
        };

        let exif = raw.exif.take();
        let source = match self.decode_source(raw) {
            Ok(source) => source,
            Err(err) => return self.fail(err),
        };

        self.source = Some(source);
        self.exif = exif;
        // 新源图就位后目标尺寸回到"未约束"
        self.request.target_width = None;
        self.request.target_height = None;
        self.state = PipelineState::Loaded;
        self.notifier.notify(Severity::Success, success_message);

        Ok(())
    }

    // ------------------------------------------------------------------
    // 参数编辑（Loaded → Loaded，纯状态修改）
    // ------------------------------------------------------------------

    /// 设置目标宽度；`None` 表示不约束该边。
    pub fn set_target_width(&mut self, width: Option<u32>) {
        self.request.target_width = width;
    }

    /// 设置目标高度；`None` 表示不约束该边。
    pub fn set_target_height(&mut self, height: Option<u32>) {
        self.request.target_height = height;
    }

    /// 切换目标格式。切到非有损格式时质量强制回到 100。
    pub fn set_format(&mut self, format: OutputFormat) {
        self.request.set_format(format);
    }

    /// 设置压缩质量（1–100），仅对有损格式生效。
    pub fn set_quality(&mut self, quality: u8) {
        self.request.set_quality(quality);
    }

    // ------------------------------------------------------------------
    // 处理
    // ------------------------------------------------------------------

    /// 执行一次处理运行：规划尺寸 → 重采样 → 编码 → 产出指标。
    ///
    /// 源图未就位时忽略请求；可携带新参数反复运行，无需重新摄取。
    pub async fn process(&mut self) -> Result<(), PipelineError> {
        let Some(source) = self.source.as_ref() else {
            log::warn!("⚠️ 尚未加载源图，忽略处理请求");
            return Ok(());
        };

        self.state = PipelineState::Processing;
        let total_start = Instant::now();

        let planned = plan_dimensions(
            (source.width, source.height),
            self.request.target_width,
            self.request.target_height,
        );

        let render_start = Instant::now();
        let rendered = match encode::render(&source.raster, planned, self.config.resize_filter) {
            Ok(rendered) => rendered,
            Err(err) => return self.fail(err),
        };
        let render_elapsed = render_start.elapsed();

        // 质量只对有损格式有语义，其余格式恒按 100 记录
        let applied_quality = if self.request.format.is_lossy() {
            self.request.quality
        } else {
            100
        };

        let encode_start = Instant::now();
        let bytes = match encode::encode(&rendered, self.request.format, applied_quality) {
            Ok(bytes) => bytes,
            Err(err) => return self.fail(err),
        };
        let encode_elapsed = encode_start.elapsed();

        let pixel_reduction = metrics::pixel_reduction((source.width, source.height), planned);

        // 整体替换旧产物，旧字节随替换释放
        self.processed = Some(ProcessedImage {
            byte_size: bytes.len() as u64,
            bytes,
            width: planned.0,
            height: planned.1,
            media_type: self.request.format.media_type().to_string(),
            quality: applied_quality,
            pixel_reduction,
        });
        self.state = PipelineState::Processed;

        log::info!(
            "✅ 图片处理完成 - {}x{} {} q={} render={}ms encode={}ms total={}ms",
            planned.0,
            planned.1,
            self.request.format.as_str(),
            applied_quality,
            render_elapsed.as_millis(),
            encode_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );
        self.notifier.notify(Severity::Success, "图片处理完成");

        Ok(())
    }

    /// 失败收敛：状态置 Error、发通知、按值返回错误。
    fn fail(&mut self, err: PipelineError) -> Result<(), PipelineError> {
        log::error!("❌ 流水线失败（{}）：{}", err.code(), err);
        self.state = PipelineState::Error {
            code: err.code(),
            message: err.to_string(),
        };
        self.notifier.notify(Severity::Error, &err.to_string());
        Err(err)
    }

    // ------------------------------------------------------------------
    // 读取
    // ------------------------------------------------------------------

    /// 当前状态。
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// 当前持有的源图。
    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    /// 最近一次处理的产物。
    pub fn processed(&self) -> Option<&ProcessedImage> {
        self.processed.as_ref()
    }

    /// 当前目标参数。
    pub fn request(&self) -> &TransformRequest {
        &self.request
    }

    /// 当前源图的 EXIF 元数据。
    pub fn exif(&self) -> Option<&BTreeMap<String, String>> {
        self.exif.as_ref()
    }

    /// 摄取是否进行中。
    pub fn is_loading(&self) -> bool {
        matches!(self.state, PipelineState::Loading)
    }

    /// 处理是否进行中。调用方应据此闸住重复的处理请求。
    pub fn is_processing(&self) -> bool {
        matches!(self.state, PipelineState::Processing)
    }

    /// 字节压缩率（百分比，一位小数）。按读取计算，产物缺失时为 0。
    pub fn compression_ratio(&self) -> f64 {
        metrics::compression_ratio(
            self.source.as_ref().map(|s| s.byte_size),
            self.processed.as_ref().map(|p| p.byte_size),
        )
    }

    /// 当前目标格式是否带质量参数（jpg / webp）。
    pub fn is_compressible_format(&self) -> bool {
        self.request.format.is_lossy()
    }

    /// 当前状态快照，供外层直接序列化展示。
    pub fn snapshot(&self) -> PipelineSnapshot {
        let (error_code, error_message) = match &self.state {
            PipelineState::Error { code, message } => (Some(*code), Some(message.clone())),
            _ => (None, None),
        };

        PipelineSnapshot {
            state: self.state.label(),
            error_code,
            error_message,
            source: self.source.as_ref().map(|s| SourceSummary {
                byte_size: s.byte_size,
                width: s.width,
                height: s.height,
                media_type: s.media_type.clone(),
                original_media_type: s.original_media_type.clone(),
            }),
            processed: self.processed.as_ref().map(|p| ProcessedSummary {
                byte_size: p.byte_size,
                width: p.width,
                height: p.height,
                media_type: p.media_type.clone(),
                quality: p.quality,
                pixel_reduction: p.pixel_reduction,
            }),
            target_width: self.request.target_width,
            target_height: self.request.target_height,
            format: self.request.format.as_str(),
            quality: self.request.quality,
            exif: self.exif.clone(),
            compression_ratio: self.compression_ratio(),
            is_compressible_format: self.is_compressible_format(),
            is_loading: self.is_loading(),
            is_processing: self.is_processing(),
        }
    }
}

/// 对外快照：当前状态 + 源图/产物摘要 + 目标参数 + 派生指标。
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineSnapshot {
    pub state: &'static str,
    pub error_code: Option<&'static str>,
    pub error_message: Option<String>,
    pub source: Option<SourceSummary>,
    pub processed: Option<ProcessedSummary>,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    pub format: &'static str,
    pub quality: u8,
    pub exif: Option<BTreeMap<String, String>>,
    pub compression_ratio: f64,
    pub is_compressible_format: bool,
    pub is_loading: bool,
    pub is_processing: bool,
}

/// 快照中的源图摘要。
#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceSummary {
    pub byte_size: u64,
    pub width: u32,
    pub height: u32,
    pub media_type: String,
    pub original_media_type: Option<String>,
}

/// 快照中的产物摘要。
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProcessedSummary {
    pub byte_size: u64,
    pub width: u32,
    pub height: u32,
    pub media_type: String,
    pub quality: u8,
    pub pixel_reduction: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::NormalizePrimitive;
    use image::{ImageBuffer, Rgba};
    use std::io::{Cursor, Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x % 255) as u8;
            let g = (y % 255) as u8;
            let b = ((x + y) % 255) as u8;
            Rgba([r, g, b, 255])
        });

        let dyn_img = image::DynamicImage::ImageRgba8(img);
        let mut cursor = Cursor::new(Vec::new());
        dyn_img
            .write_to(&mut cursor, image::ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    fn write_temp_png(dir: &tempfile::TempDir, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, create_png_bytes(width, height)).expect("write temp png failed");
        path
    }

    fn private_network_pipeline() -> Pipeline {
        let mut config = crate::pipeline::config::PipelineConfig::default();
        config.allow_private_network = true;
        Pipeline::with_config(config)
    }

    #[tokio::test]
    async fn file_ingestion_moves_idle_to_loaded() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = write_temp_png(&dir, "a.png", 40, 30);

        let mut pipeline = Pipeline::new();
        assert_eq!(pipeline.state().label(), "idle");

        pipeline
            .ingest_from_file(&path)
            .await
            .expect("ingest should succeed");

        assert_eq!(pipeline.state().label(), "loaded");
        let source = pipeline.source().expect("source should be set");
        assert_eq!((source.width, source.height), (40, 30));
        assert_eq!(source.media_type, "image/png");
        assert!(source.original_media_type.is_none());
        assert!(pipeline.processed().is_none());
    }

    #[tokio::test]
    async fn non_image_file_fails_with_unsupported_format() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("not-image.txt");
        std::fs::write(&path, b"plain text, definitely not pixels").expect("write failed");

        let mut pipeline = Pipeline::new();
        let result = pipeline.ingest_from_file(&path).await;

        assert!(matches!(result, Err(PipelineError::UnsupportedFormat(_))));
        assert!(matches!(
            pipeline.state(),
            PipelineState::Error { code: "unsupported_format", .. }
        ));
        assert!(pipeline.source().is_none());
    }

    #[tokio::test]
    async fn url_fetch_failure_moves_to_error_without_source() {
        // 先占住端口再释放，保证连接必然被拒绝
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
        let port = listener.local_addr().expect("local addr failed").port();
        drop(listener);

        let mut pipeline = private_network_pipeline();
        let url = format!("http://127.0.0.1:{}/y.png", port);
        let result = pipeline.ingest_from_url(&url).await;

        assert!(matches!(result, Err(PipelineError::FetchFailure(_))));
        assert!(matches!(
            pipeline.state(),
            PipelineState::Error { code: "fetch_failure", .. }
        ));
        assert!(pipeline.source().is_none());
        assert!(!pipeline.snapshot().is_loading);
    }

    #[tokio::test]
    async fn url_ingestion_succeeds_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");
        let body = create_png_bytes(16, 16);
        let body_for_server = body.clone();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");

            let mut req_buf = [0u8; 1024];
            let _ = stream.read(&mut req_buf);

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body_for_server.len()
            );

            stream
                .write_all(response.as_bytes())
                .expect("write headers failed");
            stream.write_all(&body_for_server).expect("write body failed");
            stream.flush().expect("flush failed");
        });

        let mut pipeline = private_network_pipeline();
        let url = format!("http://127.0.0.1:{}/pic.png", addr.port());
        pipeline
            .ingest_from_url(&url)
            .await
            .expect("url ingest should succeed");

        server.join().expect("server thread failed");

        let source = pipeline.source().expect("source should be set");
        assert_eq!((source.width, source.height), (16, 16));
        assert_eq!(source.byte_size, body.len() as u64);
        assert_eq!(pipeline.state().label(), "loaded");
    }

    #[tokio::test]
    async fn url_with_non_image_body_fails_despite_image_content_type() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");

            let mut req_buf = [0u8; 1024];
            let _ = stream.read(&mut req_buf);

            let body = b"hello world";
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );

            stream
                .write_all(response.as_bytes())
                .expect("write headers failed");
            stream.write_all(body).expect("write body failed");
            stream.flush().expect("flush failed");
        });

        let mut pipeline = private_network_pipeline();
        let url = format!("http://127.0.0.1:{}/fake.png", addr.port());
        let result = pipeline.ingest_from_url(&url).await;

        server.join().expect("server thread failed");

        assert!(matches!(result, Err(PipelineError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn processing_produces_planned_dimensions_and_format() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = write_temp_png(&dir, "src.png", 400, 300);

        let mut pipeline = Pipeline::new();
        pipeline
            .ingest_from_file(&path)
            .await
            .expect("ingest should succeed");

        pipeline.set_format(OutputFormat::Jpg);
        pipeline.set_quality(80);
        pipeline.set_target_width(Some(200));
        pipeline.process().await.expect("process should succeed");

        assert_eq!(pipeline.state().label(), "processed");
        let processed = pipeline.processed().expect("processed should be set");
        assert_eq!((processed.width, processed.height), (200, 150));
        assert_eq!(processed.media_type, "image/jpeg");
        assert_eq!(processed.quality, 80);
        assert_eq!(processed.pixel_reduction, 75.0);
        assert_eq!(&processed.bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn reprocessing_with_new_parameters_replaces_output() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = write_temp_png(&dir, "src.png", 100, 100);

        let mut pipeline = Pipeline::new();
        pipeline
            .ingest_from_file(&path)
            .await
            .expect("ingest should succeed");

        pipeline.set_target_width(Some(50));
        pipeline.process().await.expect("first run should succeed");
        assert_eq!(pipeline.processed().expect("missing output").width, 50);

        pipeline.set_target_width(None);
        pipeline.process().await.expect("second run should succeed");
        let processed = pipeline.processed().expect("missing output");
        assert_eq!((processed.width, processed.height), (100, 100));
        assert_eq!(processed.pixel_reduction, 0.0);
    }

    #[tokio::test]
    async fn new_ingestion_clears_previous_output_and_resets_targets() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let first = write_temp_png(&dir, "first.png", 60, 60);
        let second = write_temp_png(&dir, "second.png", 80, 40);

        let mut pipeline = Pipeline::new();
        pipeline
            .ingest_from_file(&first)
            .await
            .expect("first ingest failed");
        pipeline.set_target_width(Some(30));
        pipeline.process().await.expect("process failed");
        assert!(pipeline.processed().is_some());

        pipeline
            .ingest_from_file(&second)
            .await
            .expect("second ingest failed");

        assert!(pipeline.processed().is_none());
        assert_eq!(pipeline.request().target_width, None);
        assert_eq!(pipeline.request().target_height, None);
        let source = pipeline.source().expect("source should be replaced");
        assert_eq!((source.width, source.height), (80, 40));
    }

    #[tokio::test]
    async fn process_without_source_is_a_noop() {
        let mut pipeline = Pipeline::new();
        pipeline.process().await.expect("noop should not fail");
        assert_eq!(pipeline.state().label(), "idle");
        assert!(pipeline.processed().is_none());
    }

    #[tokio::test]
    async fn compression_ratio_is_zero_without_output() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = write_temp_png(&dir, "src.png", 32, 32);

        let mut pipeline = Pipeline::new();
        assert_eq!(pipeline.compression_ratio(), 0.0);

        pipeline
            .ingest_from_file(&path)
            .await
            .expect("ingest failed");
        assert_eq!(pipeline.compression_ratio(), 0.0);

        pipeline.process().await.expect("process failed");
        // 产物就位后派生值跟随字节数变化
        let processed = pipeline.processed().expect("missing output");
        let expected = crate::pipeline::metrics::compression_ratio(
            Some(pipeline.source().expect("missing source").byte_size),
            Some(processed.byte_size),
        );
        assert_eq!(pipeline.compression_ratio(), expected);
    }

    #[tokio::test]
    async fn format_switch_forces_quality_through_pipeline_api() {
        let mut pipeline = Pipeline::new();
        pipeline.set_format(OutputFormat::Jpg);
        pipeline.set_quality(55);
        assert_eq!(pipeline.request().quality, 55);
        assert!(pipeline.is_compressible_format());

        pipeline.set_format(OutputFormat::Ico);
        assert_eq!(pipeline.request().quality, 100);
        assert!(!pipeline.is_compressible_format());
    }

    #[tokio::test]
    async fn oversized_ico_failure_surfaces_and_marks_error_state() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = write_temp_png(&dir, "big.png", 512, 512);

        let mut pipeline = Pipeline::new();
        pipeline
            .ingest_from_file(&path)
            .await
            .expect("ingest failed");
        pipeline.set_format(OutputFormat::Ico);

        let result = pipeline.process().await;
        assert!(matches!(result, Err(PipelineError::EncodeFailure(_))));
        assert!(matches!(
            pipeline.state(),
            PipelineState::Error { code: "encode_failure", .. }
        ));
        // 错误非终态：换个能编码的目标再跑一次即可恢复
        pipeline.set_format(OutputFormat::Png);
        pipeline.process().await.expect("retry should succeed");
        assert_eq!(pipeline.state().label(), "processed");
    }

    struct PngStubConverter;

    impl NormalizePrimitive for PngStubConverter {
        fn normalize(&self, _bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
            Ok(create_png_bytes(12, 12))
        }
    }

    #[tokio::test]
    async fn heic_file_is_normalized_and_records_original_type() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("photo.heic");
        std::fs::write(&path, crate::pipeline::normalize::tests::heic_header())
            .expect("write heic stub failed");

        let mut pipeline = Pipeline::new().with_normalizer(Box::new(PngStubConverter));
        pipeline
            .ingest_from_file(&path)
            .await
            .expect("heic ingest should succeed");

        let source = pipeline.source().expect("source should be set");
        assert_eq!(source.media_type, "image/png");
        assert_eq!(source.original_media_type.as_deref(), Some("image/heic"));
        assert_eq!((source.width, source.height), (12, 12));
    }

    #[tokio::test]
    async fn heic_without_primitive_fails_normalization() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("photo.heic");
        std::fs::write(&path, crate::pipeline::normalize::tests::heic_header())
            .expect("write heic stub failed");

        let mut pipeline = Pipeline::new();
        let result = pipeline.ingest_from_file(&path).await;

        assert!(matches!(result, Err(PipelineError::NormalizationFailure(_))));
        assert!(matches!(
            pipeline.state(),
            PipelineState::Error { code: "normalization_failure", .. }
        ));
    }

    struct CountingSink {
        events: Arc<Mutex<Vec<(Severity, String)>>>,
    }

    impl NotificationSink for CountingSink {
        fn notify(&self, severity: Severity, message: &str) {
            if let Ok(mut guard) = self.events.lock() {
                guard.push((severity, message.to_string()));
            }
        }
    }

    #[tokio::test]
    async fn notifications_fire_on_success_and_failure() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = write_temp_png(&dir, "a.png", 16, 16);
        let missing = dir.path().join("missing.png");

        let mut pipeline = Pipeline::new().with_notifier(Box::new(CountingSink {
            events: Arc::clone(&events),
        }));

        pipeline
            .ingest_from_file(&path)
            .await
            .expect("ingest failed");
        let _ = pipeline.ingest_from_file(&missing).await;

        let guard = events.lock().expect("lock events failed");
        assert_eq!(guard.len(), 2);
        assert_eq!(guard[0].0, Severity::Success);
        assert_eq!(guard[1].0, Severity::Error);
    }

    #[tokio::test]
    async fn snapshot_reflects_full_state() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = write_temp_png(&dir, "a.png", 100, 50);

        let mut pipeline = Pipeline::new();
        pipeline
            .ingest_from_file(&path)
            .await
            .expect("ingest failed");
        pipeline.set_format(OutputFormat::Webp);
        pipeline.set_quality(70);
        pipeline.set_target_height(Some(25));
        pipeline.process().await.expect("process failed");

        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.state, "processed");
        assert_eq!(snapshot.format, "webp");
        assert_eq!(snapshot.quality, 70);
        assert!(snapshot.is_compressible_format);
        assert!(!snapshot.is_loading);
        assert!(!snapshot.is_processing);

        let processed = snapshot.processed.expect("snapshot missing output");
        assert_eq!((processed.width, processed.height), (50, 25));
        assert_eq!(processed.media_type, "image/webp");

        let json = serde_json::to_string(&pipeline.snapshot()).expect("serialize failed");
        assert!(json.contains("\"state\":\"processed\""));
    }

    #[tokio::test]
    #[ignore = "requires system clipboard access"]
    async fn clipboard_ingestion_roundtrip() {
        let png = create_png_bytes(24, 24);
        let decoded = image::load_from_memory(&png).expect("decode failed").to_rgba8();

        let mut clipboard = arboard::Clipboard::new().expect("clipboard init failed");
        clipboard
            .set_image(arboard::ImageData {
                width: 24,
                height: 24,
                bytes: decoded.into_raw().into(),
            })
            .expect("set clipboard image failed");

        let mut pipeline = Pipeline::new();
        pipeline
            .ingest_from_clipboard()
            .await
            .expect("clipboard ingest should succeed");

        let source = pipeline.source().expect("source should be set");
        assert_eq!((source.width, source.height), (24, 24));
    }

    #[tokio::test]
    #[ignore = "requires system clipboard access"]
    async fn plain_text_clipboard_reports_no_image() {
        let mut clipboard = arboard::Clipboard::new().expect("clipboard init failed");
        clipboard
            .set_text("just some plain words")
            .expect("set clipboard text failed");

        let mut pipeline = Pipeline::new();
        let result = pipeline.ingest_from_clipboard().await;

        assert!(matches!(result, Err(PipelineError::NoImageFound)));
        assert!(matches!(
            pipeline.state(),
            PipelineState::Error { code: "no_image_found", .. }
        ));
    }
}
