//! # 来源摄取模块
//!
//! ## 设计思路
//!
//! 统一处理三种来源（本地文件 / URL / 剪贴板）的原始字节加载，并在
//! "尽可能早"的阶段执行输入校验，尽快失败，减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - 文件：存在性 + metadata 体积限制 + 读取。
//! - URL：协议 + 主机安全 + 内容类型 + 体积校验 + 流式下载 + 手工重定向。
//! - 剪贴板：优先结构化位图读取，缺失时回退文本（Data URL / http 地址）。
//! - 所有来源最终汇聚到 `prepare_raw_bytes`：EXIF 旁路提取 → 归一化 →
//!   签名嗅探 → `RawImage`，再经 `decode_source` 产出 `SourceImage`。

use base64::{Engine as _, engine::general_purpose};
use image::GenericImageView;
use std::io::Cursor;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use super::error::PipelineError;
use super::exif::extract_exif;
use super::normalize::normalize_if_needed;
use super::orchestrator::Pipeline;
use super::source::{RawImage, SourceImage};

const STREAM_SIGNATURE_PROBE_BYTES: usize = 4096;
const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

/// 剪贴板读取的中间结果。
///
/// 结构化位图命中时直接携带 PNG 字节；否则按文本语义路由。
pub(super) enum ClipboardPayload {
    /// 剪贴板位图，已编码为 PNG 字节。
    Raster(Vec<u8>),
    /// 文本是一个 http(s) 地址。
    Url(String),
    /// 文本是一个 `data:image/...;base64,` 形式的 Data URL。
    DataUri(String),
}

impl Pipeline {
    /// 从本地路径加载图片原始字节。
    pub(super) fn load_from_file_raw(&self, path: &Path) -> Result<RawImage, PipelineError> {
        log::info!("📁 开始读取本地图片 - 路径: {}", path.display());

        if !path.exists() {
            return Err(PipelineError::DecodeFailure(format!(
                "文件不存在：{}",
                path.display()
            )));
        }

        let metadata = std::fs::metadata(path)
            .map_err(|e| PipelineError::DecodeFailure(format!("无法读取文件信息：{}", e)))?;

        if metadata.len() > self.config().max_file_size {
            return Err(PipelineError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                self.config().max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = std::fs::read(path)
            .map_err(|e| PipelineError::DecodeFailure(format!("无法读取图片文件：{}", e)))?;

        self.prepare_raw_bytes(bytes, "file")
    }

    /// 从 URL 加载图片原始字节。
    pub(super) async fn load_from_url_raw(&self, url: &str) -> Result<RawImage, PipelineError> {
        log::info!("🌐 开始下载图片 - URL: {}", redact_url_for_log(url));

        self.validate_url_safety(url)?;
        let bytes = self.download_with_validation(url).await?;

        let file_name = file_name_from_url(url);
        log::debug!("📄 下载完成 - 文件名: {} ({} bytes)", file_name, bytes.len());

        self.prepare_raw_bytes(bytes, "url")
    }

    /// 从 Data URL / 纯 Base64 字符串加载图片原始字节。
    pub(super) fn load_from_base64_raw(&self, data: &str) -> Result<RawImage, PipelineError> {
        log::info!("📝 开始处理 base64 图片");

        let bytes = parse_base64_with_limit(data, self.config().max_file_size)?;
        self.prepare_raw_bytes(bytes, "base64")
    }

    /// 读取系统剪贴板，按优先级返回位图或可路由的文本。
    ///
    /// 优先结构化位图访问；缺失时回退文本语义（Data URL → 字节解码，
    /// http 地址 → URL 摄取）。两条路径都落空时报 `NoImageFound`。
    pub(super) fn read_clipboard(&self) -> Result<ClipboardPayload, PipelineError> {
        let mut clipboard = arboard::Clipboard::new()
            .map_err(|e| PipelineError::TransferFailure(format!("剪贴板不可用：{}", e)))?;

        match clipboard.get_image() {
            Ok(image_data) => {
                log::info!(
                    "📋 剪贴板命中位图 - {}x{}",
                    image_data.width,
                    image_data.height
                );
                return Ok(ClipboardPayload::Raster(encode_clipboard_raster(
                    image_data,
                )?));
            }
            Err(arboard::Error::ContentNotAvailable) => {}
            Err(err) => {
                log::debug!("剪贴板位图读取失败，回退文本路径：{}", err);
            }
        }

        match clipboard.get_text() {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.starts_with("data:image") {
                    Ok(ClipboardPayload::DataUri(trimmed.to_string()))
                } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
                    Ok(ClipboardPayload::Url(trimmed.to_string()))
                } else {
                    Err(PipelineError::NoImageFound)
                }
            }
            Err(arboard::Error::ContentNotAvailable) => Err(PipelineError::NoImageFound),
            Err(err) => Err(PipelineError::TransferFailure(format!(
                "剪贴板文本读取失败：{}",
                err
            ))),
        }
    }

    /// 字节就位后的统一收口：EXIF 旁路 → 归一化 → 签名嗅探。
    pub(super) fn prepare_raw_bytes(
        &self,
        bytes: Vec<u8>,
        source_hint: &'static str,
    ) -> Result<RawImage, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::UnsupportedFormat("图片内容为空".to_string()));
        }

        if bytes.len() as u64 > self.config().max_file_size {
            return Err(PipelineError::ResourceLimit(format!(
                "输入体积过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                self.config().max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let origin_byte_size = bytes.len() as u64;

        // 元数据从归一化前的原始字节提取，转换产物不再携带 EXIF
        let exif = extract_exif(&bytes);

        let (bytes, normalized_type, original_media_type) =
            normalize_if_needed(self.normalizer(), bytes)?;

        let media_type = match normalized_type {
            Some(media_type) => media_type.to_string(),
            None => sniff_image_media_type(&bytes)?,
        };

        Ok(RawImage {
            bytes,
            media_type,
            original_media_type,
            origin_byte_size,
            exif,
            source_hint,
        })
    }

    /// 将已加载的原始字节解码为源图。
    ///
    /// 先通过图片头读取宽高做像素/内存上限检查，再执行完整解码，
    /// 降低恶意输入触发高内存开销的风险。
    pub(super) fn decode_source(&self, raw: RawImage) -> Result<SourceImage, PipelineError> {
        let (header_width, header_height) = inspect_dimensions_from_memory(&raw.bytes)?;
        self.validate_decode_limits(header_width, header_height)?;

        let decoded = image::load_from_memory(&raw.bytes)
            .map_err(|e| PipelineError::DecodeFailure(format!("图片解码失败：{}", e)))?;

        let (width, height) = decoded.dimensions();
        self.validate_decode_limits(width, height)?;

        if width == 0 || height == 0 {
            return Err(PipelineError::DecodeFailure(
                "解码结果宽高为零".to_string(),
            ));
        }

        log::info!(
            "✅ 图片解码成功 - 来源: {} 类型: {} 尺寸: {}x{} 体积: {} bytes",
            raw.source_hint,
            raw.media_type,
            width,
            height,
            raw.origin_byte_size
        );

        Ok(SourceImage {
            raster: decoded,
            byte_size: raw.origin_byte_size,
            width,
            height,
            media_type: raw.media_type,
            original_media_type: raw.original_media_type,
        })
    }

    /// 校验像素数与解码内存估算是否超过配置上限。
    fn validate_decode_limits(&self, width: u32, height: u32) -> Result<(), PipelineError> {
        let pixels = u64::from(width)
            .checked_mul(u64::from(height))
            .ok_or_else(|| PipelineError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > self.config().max_decoded_pixels {
            return Err(PipelineError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels,
                self.config().max_decoded_pixels
            )));
        }

        let estimated = pixels
            .checked_mul(4)
            .ok_or_else(|| PipelineError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > self.config().max_decoded_bytes {
            return Err(PipelineError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                self.config().max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }

    /// 执行带校验的网络下载。
    ///
    /// 使用流式读取避免一次性读入导致内存峰值过高；手工跟随重定向，
    /// 每一跳都重新做主机安全校验。
    pub(super) async fn download_with_validation(
        &self,
        url: &str,
    ) -> Result<Vec<u8>, PipelineError> {
        let config = self.config();
        let mut current_url = reqwest::Url::parse(url)
            .map_err(|e| PipelineError::FetchFailure(format!("URL 格式错误：{}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| PipelineError::FetchFailure(format!("无法创建 HTTP 客户端：{}", e)))?;

        for redirect_count in 0..=config.max_redirects {
            let response = client
                .get(current_url.clone())
                .header(
                    reqwest::header::ACCEPT,
                    "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8",
                )
                .send()
                .await
                .map_err(|e| self.map_reqwest_error(e, current_url.as_str()))?;

            if response.status().is_redirection() {
                if redirect_count >= config.max_redirects {
                    return Err(PipelineError::FetchFailure(format!(
                        "重定向次数超过限制（{}）",
                        config.max_redirects
                    )));
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .ok_or_else(|| {
                        PipelineError::FetchFailure("重定向响应缺少 Location 头".to_string())
                    })?;

                let location_str = location.to_str().map_err(|e| {
                    PipelineError::FetchFailure(format!("重定向地址无效：{}", e))
                })?;

                let next_url = current_url.join(location_str).map_err(|e| {
                    PipelineError::FetchFailure(format!("重定向 URL 解析失败：{}", e))
                })?;

                self.validate_url_safety(next_url.as_str())?;

                log::debug!("↪️ 跳转到: {}", redact_url_for_log(next_url.as_str()));
                current_url = next_url;
                continue;
            }

            if !response.status().is_success() {
                return Err(PipelineError::FetchFailure(format!(
                    "HTTP {}: {}",
                    response.status().as_u16(),
                    status_message(response.status().as_u16())
                )));
            }

            if let Some(ct) = response.headers().get(reqwest::header::CONTENT_TYPE) {
                if let Ok(ct_str) = ct.to_str() {
                    if !is_image_content_type(ct_str) {
                        return Err(PipelineError::UnsupportedFormat(format!(
                            "不是图片类型：{}",
                            ct_str
                        )));
                    }
                }
            }

            let total_len = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|cl| cl.to_str().ok())
                .and_then(|cl| cl.parse::<u64>().ok());

            if let Some(size) = total_len {
                if size > config.max_file_size {
                    return Err(PipelineError::ResourceLimit(format!(
                        "文件过大：{:.2} MB（限制：{:.2} MB）",
                        size as f64 / 1024.0 / 1024.0,
                        config.max_file_size as f64 / 1024.0 / 1024.0
                    )));
                }
            }

            return self.read_response_stream(response, total_len).await;
        }

        Err(PipelineError::FetchFailure("下载流程异常结束".to_string()))
    }

    async fn read_response_stream(
        &self,
        mut response: reqwest::Response,
        total_len: Option<u64>,
    ) -> Result<Vec<u8>, PipelineError> {
        let config = self.config();
        let initial_capacity = total_len
            .map(|len| len.min(config.max_file_size).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);

        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut total: u64 = 0;
        let mut signature_validated = false;
        let mut received_first_chunk = false;

        loop {
            let read_timeout = if received_first_chunk {
                Duration::from_millis(config.stream_chunk_timeout_ms)
            } else {
                Duration::from_millis(config.stream_first_byte_timeout_ms)
            };

            let next_chunk_result = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        PipelineError::FetchFailure("下载数据流读取超时".to_string())
                    } else {
                        PipelineError::FetchFailure("下载首包超时".to_string())
                    }
                })?;

            let Some(chunk) = next_chunk_result
                .map_err(|e| PipelineError::FetchFailure(format!("下载失败：{}", e)))?
            else {
                break;
            };

            received_first_chunk = true;

            total = total.saturating_add(chunk.len() as u64);
            if total > config.max_file_size {
                return Err(PipelineError::ResourceLimit(
                    "下载后文件超过大小限制".to_string(),
                ));
            }
            buffer.extend_from_slice(&chunk);

            if !signature_validated {
                signature_validated =
                    validate_stream_signature_probe(&buffer, STREAM_SIGNATURE_PROBE_BYTES)?;
            }
        }

        if !signature_validated {
            validate_image_signature(&buffer)?;
        }

        log::debug!("✅ 下载完成 - {} bytes", total);
        Ok(buffer)
    }

    /// 校验 URL 安全性。
    ///
    /// 默认阻止本地/内网目标，防止 SSRF 风险。
    fn validate_url_safety(&self, url: &str) -> Result<(), PipelineError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| PipelineError::FetchFailure(format!("URL 格式错误：{}", e)))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(PipelineError::FetchFailure("仅支持 HTTP/HTTPS".to_string()));
        }

        if self.config().allow_private_network {
            return Ok(());
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| PipelineError::FetchFailure("URL 缺少主机地址".to_string()))?;

        if is_local_hostname(host) {
            return Err(PipelineError::FetchFailure(format!(
                "禁止访问本地网络地址：{}",
                host
            )));
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            if is_private_or_local_ip(ip) {
                return Err(PipelineError::FetchFailure(format!(
                    "禁止访问内网 IP：{}",
                    ip
                )));
            }
        }

        Ok(())
    }

    /// 统一映射 reqwest 错误到业务错误。
    fn map_reqwest_error(&self, e: reqwest::Error, url: &str) -> PipelineError {
        let err_msg = e.to_string().replace(url, &redact_url_for_log(url));

        if e.is_timeout() {
            PipelineError::FetchFailure(format!(
                "下载超时（{}秒）",
                self.config().download_timeout
            ))
        } else if e.is_connect() {
            PipelineError::FetchFailure(format!("无法连接：{}", err_msg))
        } else {
            PipelineError::FetchFailure(format!("请求失败：{}", err_msg))
        }
    }
}

/// 将剪贴板位图（RGBA 裸字节）编码为 PNG 字节。
fn encode_clipboard_raster(image_data: arboard::ImageData<'_>) -> Result<Vec<u8>, PipelineError> {
    let width = u32::try_from(image_data.width)
        .map_err(|_| PipelineError::TransferFailure("剪贴板位图宽度异常".to_string()))?;
    let height = u32::try_from(image_data.height)
        .map_err(|_| PipelineError::TransferFailure("剪贴板位图高度异常".to_string()))?;

    let buffer = image::ImageBuffer::<image::Rgba<u8>, Vec<u8>>::from_raw(
        width,
        height,
        image_data.bytes.into_owned(),
    )
    .ok_or_else(|| PipelineError::TransferFailure("剪贴板位图长度异常".to_string()))?;

    let mut cursor = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(buffer)
        .write_to(&mut cursor, image::ImageFormat::Png)
        .map_err(|e| PipelineError::TransferFailure(format!("剪贴板位图编码失败：{}", e)))?;

    Ok(cursor.into_inner())
}

/// 仅通过内存中的图片头信息读取宽高。
///
/// 用于在完整解码前做像素限制检查。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), PipelineError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PipelineError::UnsupportedFormat(format!("无法识别图片格式：{}", e)))?;

    reader
        .into_dimensions()
        .map_err(|e| PipelineError::UnsupportedFormat(format!("无法读取图片尺寸：{}", e)))
}

/// 通过文件签名（magic bytes）嗅探图片媒体类型。
fn sniff_image_media_type(bytes: &[u8]) -> Result<String, PipelineError> {
    let kind = infer::get(bytes)
        .ok_or_else(|| PipelineError::UnsupportedFormat("无法识别图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(PipelineError::UnsupportedFormat(format!(
            "文件签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(kind.mime_type().to_string())
}

/// 校验输入整体是否为图片签名。
fn validate_image_signature(bytes: &[u8]) -> Result<(), PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::UnsupportedFormat("图片内容为空".to_string()));
    }

    sniff_image_media_type(bytes).map(|_| ())
}

/// 流式下载阶段的签名探测：尽早识别并拒绝非图片内容。
///
/// 返回值：
/// - `Ok(true)`：已识别为图片，可视为完成签名校验
/// - `Ok(false)`：当前字节不足以判断，继续下载
/// - `Err(...)`：已识别为非图片，或达到探测上限仍无法识别
fn validate_stream_signature_probe(
    bytes: &[u8],
    probe_limit: usize,
) -> Result<bool, PipelineError> {
    if bytes.is_empty() {
        return Ok(false);
    }

    if let Some(kind) = infer::get(bytes) {
        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(PipelineError::UnsupportedFormat(format!(
                "下载内容不是图片类型：{}",
                kind.mime_type()
            )));
        }
        return Ok(true);
    }

    if bytes.len() >= probe_limit {
        return Err(PipelineError::UnsupportedFormat(format!(
            "下载前 {} 字节内无法识别图片类型",
            probe_limit
        )));
    }

    Ok(false)
}

/// 解析 Base64 输入（支持 Data URL / 纯 Base64），解码前先按体积估算拦截。
fn parse_base64_with_limit(data: &str, max_file_size: u64) -> Result<Vec<u8>, PipelineError> {
    let normalized = data.trim();

    let base64_data = if normalized.starts_with("data:image/") {
        let base64_start = normalized.find(";base64,").ok_or_else(|| {
            PipelineError::UnsupportedFormat("Data URL 缺少 base64 标记".to_string())
        })?;
        &normalized[base64_start + 8..]
    } else {
        normalized
    };

    let estimated_len = estimate_base64_decoded_upper_bound_len(base64_data)?;
    if estimated_len > max_file_size {
        return Err(PipelineError::ResourceLimit(format!(
            "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
            estimated_len as f64 / 1024.0 / 1024.0,
            max_file_size as f64 / 1024.0 / 1024.0
        )));
    }

    general_purpose::STANDARD
        .decode(base64_data)
        .map_err(|e| PipelineError::DecodeFailure(format!("Base64 解码失败：{}", e)))
}

fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, PipelineError> {
    let len = base64_data.trim().len() as u64;
    let groups = len
        .checked_add(3)
        .ok_or_else(|| PipelineError::ResourceLimit("Base64 输入长度溢出".to_string()))?
        / 4;

    groups
        .checked_mul(3)
        .ok_or_else(|| PipelineError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
}

/// 从 URL 路径推导文件名，仅用于日志与诊断。
fn file_name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.last().map(|s| s.to_string()))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "image".to_string())
}

/// 常见 HTTP 状态码本地化文案。
fn status_message(code: u16) -> &'static str {
    match code {
        404 => "未找到",
        403 => "访问被拒绝",
        500..=599 => "服务器错误",
        _ => "请求失败",
    }
}

fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
}

fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

    format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
}

/// 判断主机名是否指向本地地址。
fn is_local_hostname(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host.eq_ignore_ascii_case("localhost.")
        || host.ends_with(".local")
}

/// 判断 IP 是否属于本地/内网/链路本地等受限范围。
fn is_private_or_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            if v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_unspecified()
                || v4.is_multicast()
            {
                return true;
            }

            let octets = v4.octets();
            octets[0] == 0 || (octets[0] == 100 && (octets[1] & 0b1100_0000) == 0b0100_0000)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
        }
    }
}
