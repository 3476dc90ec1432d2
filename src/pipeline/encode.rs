//! # 重采样与编码模块
//!
//! ## 设计思路
//!
//! 把"位图 → 目标尺寸 → 目标格式字节"的过程集中管理：
//! - 缩放走 `fast_image_resize` 卷积重采样（高质量插值，绝不最近邻），
//!   构建缓冲失败时回退 `image::resize_exact`。
//! - 编码按目标格式分派到各编码器；质量参数只对 jpg/webp 生效，
//!   其余格式即使传入也被忽略。
//! - 编码器无法产出字节时原样上抛 `EncodeFailure`，不做静默替代。

use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageBuffer, ImageEncoder, ImageFormat, Rgba};
use std::io::Cursor;

use super::error::PipelineError;
use super::source::OutputFormat;

/// 将源位图绘制到规划尺寸。
///
/// 尺寸一致时直接复用源位图，不做无谓重采样。
pub(crate) fn render(
    source: &DynamicImage,
    planned: (u32, u32),
    filter: FilterType,
) -> Result<DynamicImage, PipelineError> {
    let (target_width, target_height) = planned;

    if (source.width(), source.height()) == planned {
        return Ok(source.clone());
    }

    match resize_with_fast_image_resize(source, target_width, target_height, filter) {
        Ok(resized) => Ok(resized),
        Err(err) => {
            log::warn!("⚠️ fast_image_resize 重采样失败，回退 image::resize_exact：{}", err);
            Ok(source.resize_exact(target_width, target_height, filter))
        }
    }
}

/// 序列化到目标格式。
///
/// 质量仅对有损格式生效；返回编码后的完整字节。
pub(crate) fn encode(
    image: &DynamicImage,
    format: OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, PipelineError> {
    match format {
        OutputFormat::Png => encode_with_image_crate(image, ImageFormat::Png),
        OutputFormat::Gif => encode_with_image_crate(image, ImageFormat::Gif),
        OutputFormat::Ico => encode_ico(image),
        OutputFormat::Jpg => encode_jpeg(image, quality),
        OutputFormat::Webp => encode_webp(image, quality),
    }
}

fn encode_with_image_crate(
    image: &DynamicImage,
    format: ImageFormat,
) -> Result<Vec<u8>, PipelineError> {
    // 统一转 RGBA8，避免个别编码器不支持源位图的色彩布局
    let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
    let mut cursor = Cursor::new(Vec::new());

    rgba.write_to(&mut cursor, format)
        .map_err(|e| PipelineError::EncodeFailure(format!("{:?} 编码失败：{}", format, e)))?;

    Ok(cursor.into_inner())
}

fn encode_ico(image: &DynamicImage) -> Result<Vec<u8>, PipelineError> {
    // ICO 容器单边上限 256 像素，越界由编码器报错并原样上抛
    encode_with_image_crate(image, ImageFormat::Ico)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let rgb = image.to_rgb8();
    let mut cursor = Cursor::new(Vec::new());

    let encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
    encoder
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| PipelineError::EncodeFailure(format!("JPEG 编码失败：{}", e)))?;

    Ok(cursor.into_inner())
}

fn encode_webp(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
    let encoder = webp::Encoder::from_image(&rgba)
        .map_err(|e| PipelineError::EncodeFailure(format!("WebP 编码器构建失败：{}", e)))?;

    // 质量 100 时走无损路径，不引入量化损失
    let encoded = if quality < 100 {
        encoder.encode(f32::from(quality))
    } else {
        encoder.encode_lossless()
    };

    Ok(encoded.to_vec())
}

fn resize_with_fast_image_resize(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> Result<DynamicImage, PipelineError> {
    let src = image.to_rgba8();
    let (src_width, src_height) = src.dimensions();

    let src_image =
        fr::images::Image::from_vec_u8(src_width, src_height, src.into_raw(), fr::PixelType::U8x4)
            .map_err(|e| PipelineError::EncodeFailure(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options =
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| PipelineError::EncodeFailure(format!("fast_image_resize 执行失败：{}", e)))?;

    let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
        target_width,
        target_height,
        dst_image.into_vec(),
    )
    .ok_or_else(|| {
        PipelineError::EncodeFailure("fast_image_resize 输出缓冲长度异常".to_string())
    })?;

    Ok(DynamicImage::ImageRgba8(rgba))
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}
