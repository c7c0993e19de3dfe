//! 核心错误分类
//!
//! 这里没有任何会终止进程的错误：最坏情况是视图暂时过期，
//! 下一轮刷新总能恢复。

use thiserror::Error;

use crate::provider::ProviderError;

/// 核心操作错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    /// 提供方不可用（本次会话不再重试）
    #[error("下载提供方不可用")]
    ProviderUnavailable,
    /// 单次提供方调用失败（本地恢复：记日志、提示用户、不自动重试）
    #[error("{op} 调用失败: {source}")]
    ProviderCallFailed {
        op: &'static str,
        #[source]
        source: ProviderError,
    },
    /// 链接未通过本地校验，未发起任何提供方调用
    #[error("无效的下载链接: {0}")]
    InvalidUrl(String),
}

impl MirrorError {
    pub(crate) fn call_failed(op: &'static str, source: ProviderError) -> Self {
        if source == ProviderError::Unavailable {
            MirrorError::ProviderUnavailable
        } else {
            MirrorError::ProviderCallFailed { op, source }
        }
    }
}
