//! # 尺寸规划模块
//!
//! ## 设计思路
//!
//! 输出尺寸计算是纯函数：不访问状态、不会失败。
//! 只约束"单边给定时按源图宽高比推导另一边"，双边给定时按调用方意图直出，
//! 不做宽高比保护。非正输入属于调用方契约违例，不在此处兜底。

/// 计算最终输出尺寸。
///
/// - 两边都未给定：输出 = 源图尺寸
/// - 仅给定宽：高 = round(宽 × srcH / srcW)
/// - 仅给定高：宽 = round(高 × srcW / srcH)
/// - 两边都给定：原样使用
pub fn plan_dimensions(
    source: (u32, u32),
    target_width: Option<u32>,
    target_height: Option<u32>,
) -> (u32, u32) {
    let (source_width, source_height) = source;

    match (target_width, target_height) {
        (None, None) => (source_width, source_height),
        (Some(width), None) => {
            let height =
                (f64::from(width) * f64::from(source_height) / f64::from(source_width)).round();
            (width, height as u32)
        }
        (None, Some(height)) => {
            let width =
                (f64::from(height) * f64::from(source_width) / f64::from(source_height)).round();
            (width as u32, height)
        }
        (Some(width), Some(height)) => (width, height),
    }
}
