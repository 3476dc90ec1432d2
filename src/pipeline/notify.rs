//! # 通知出口模块
//!
//! ## 设计思路
//!
//! 流水线只负责产生"面向用户的成功/失败事件"，投递方式由调用方注入。
//! 默认实现落到 `log`，保证无宿主环境时行为仍可观测；通知永不阻塞流水线。

/// 通知严重级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// 操作成功。
    Success,
    /// 操作失败。
    Error,
}

/// 通知出口契约。
///
/// 实现方负责实际投递（toast / 状态栏 / 日志），必须立即返回。
pub trait NotificationSink: Send + Sync {
    fn notify(&self, severity: Severity, message: &str);
}

/// 默认通知出口：写入日志。
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Success => log::info!("✅ {}", message),
            Severity::Error => log::error!("❌ {}", message),
        }
    }
}
