//! # 图片流水线 — 命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与结果落盘。
//! 业务逻辑全部在 `pipeline` 模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use imagepress::{ImageSource, OutputFormat, Pipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "imagepress", about = "图片摄取 · 变换 · 压缩流水线", version)]
struct Cli {
    #[command(subcommand)]
    source: SourceCommand,

    /// 目标宽度（像素）；省略时按高度等比推导或保持原尺寸
    #[arg(long, global = true)]
    width: Option<u32>,

    /// 目标高度（像素）；省略时按宽度等比推导或保持原尺寸
    #[arg(long, global = true)]
    height: Option<u32>,

    /// 输出格式：png / jpg / webp / gif / ico（未识别的值回落为 png）
    #[arg(long, global = true, default_value = "png")]
    format: String,

    /// 压缩质量 1-100，仅对 jpg/webp 生效
    #[arg(long, global = true, default_value_t = 90)]
    quality: u8,

    /// 输出文件路径；省略时写入 output.<扩展名>
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,

    /// 允许访问本地/内网地址（仅限可信环境）
    #[arg(long, global = true)]
    allow_private_network: bool,
}

#[derive(Subcommand)]
enum SourceCommand {
    /// 从本地文件读取图片
    File {
        /// 图片文件路径
        path: PathBuf,
    },
    /// 从 URL 下载图片
    Url {
        /// 图片地址（http/https）
        url: String,
    },
    /// 从系统剪贴板读取图片
    Clipboard,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = PipelineConfig::default();
    config.allow_private_network = cli.allow_private_network;
    let mut pipeline = Pipeline::with_config(config);

    let source = match cli.source {
        SourceCommand::File { path } => ImageSource::FilePath(path.display().to_string()),
        SourceCommand::Url { url } => ImageSource::Url(url),
        SourceCommand::Clipboard => ImageSource::Clipboard,
    };

    pipeline.ingest(source).await?;

    let format = OutputFormat::from_name(&cli.format);
    pipeline.set_format(format);
    pipeline.set_quality(cli.quality);
    pipeline.set_target_width(cli.width);
    pipeline.set_target_height(cli.height);

    pipeline.process().await?;

    let snapshot = pipeline.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if let Some(processed) = pipeline.processed() {
        let output_path = cli
            .output
            .unwrap_or_else(|| PathBuf::from(format!("output.{}", format.extension())));
        std::fs::write(&output_path, &processed.bytes)?;
        log::info!(
            "💾 已写入 {}（{} bytes）",
            output_path.display(),
            processed.byte_size
        );
    }

    Ok(())
}
