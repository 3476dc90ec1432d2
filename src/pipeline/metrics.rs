//! # 对比指标模块
//!
//! ## 设计思路
//!
//! 压缩率与像素缩减率都是"源图 vs 产物"的派生值，按读取时重新计算，
//! 不在状态里冗余存储。统一保留一位小数；产物比源图更大时结果为负，
//! 不做截断。

/// 一位小数取整。
fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// 字节压缩率（百分比）。
///
/// `(1 - processed / original) * 100`，任一操作数缺失或源体积为零时返回 0。
pub fn compression_ratio(original_bytes: Option<u64>, processed_bytes: Option<u64>) -> f64 {
    let (Some(original), Some(processed)) = (original_bytes, processed_bytes) else {
        return 0.0;
    };

    if original == 0 {
        return 0.0;
    }

    round_one_decimal((1.0 - processed as f64 / original as f64) * 100.0)
}

/// 像素缩减率（百分比）。
///
/// `(1 - outW*outH / srcW*srcH) * 100`，放大时为负值。
pub fn pixel_reduction(source_dims: (u32, u32), output_dims: (u32, u32)) -> f64 {
    let source_pixels = u64::from(source_dims.0) * u64::from(source_dims.1);
    let output_pixels = u64::from(output_dims.0) * u64::from(output_dims.1);

    if source_pixels == 0 {
        return 0.0;
    }

    round_one_decimal((1.0 - output_pixels as f64 / source_pixels as f64) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sizes_give_zero_ratio() {
        assert_eq!(compression_ratio(Some(12_345), Some(12_345)), 0.0);
    }

    #[test]
    fn missing_operand_gives_zero() {
        assert_eq!(compression_ratio(None, Some(100)), 0.0);
        assert_eq!(compression_ratio(Some(100), None), 0.0);
        assert_eq!(compression_ratio(None, None), 0.0);
        assert_eq!(compression_ratio(Some(0), Some(100)), 0.0);
    }

    #[test]
    fn ratio_is_rounded_to_one_decimal() {
        // 1 - 2/3 = 33.333...%
        assert_eq!(compression_ratio(Some(3000), Some(2000)), 33.3);
    }

    #[test]
    fn larger_output_gives_negative_ratio() {
        assert_eq!(compression_ratio(Some(100), Some(150)), -50.0);
    }

    #[test]
    fn quarter_pixels_is_seventy_five_percent() {
        assert_eq!(pixel_reduction((100, 100), (50, 50)), 75.0);
    }

    #[test]
    fn same_dimensions_give_zero_reduction() {
        assert_eq!(pixel_reduction((400, 300), (400, 300)), 0.0);
    }

    #[test]
    fn upscale_gives_negative_reduction() {
        assert_eq!(pixel_reduction((100, 100), (200, 200)), -300.0);
    }
}
