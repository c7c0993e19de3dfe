use thiserror::Error;

use super::types::DownloadId;

/// 提供方调用失败的分类
///
/// 每个异步调用都可能单独失败；核心根据类别决定是
/// 当作过期操作忽略、提示用户，还是本次会话彻底放弃
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// 记录不存在（过期操作的典型来源）
    #[error("记录不存在: {0}")]
    NotFound(DownloadId),
    /// 当前状态不支持该操作
    #[error("当前状态不支持操作 {op}: 记录 {id}")]
    Unsupported { id: DownloadId, op: &'static str },
    /// 权限不足
    #[error("权限不足")]
    PermissionDenied,
    /// 传输层错误
    #[error("传输错误: {0}")]
    Transport(String),
    /// 下载 API 不可用（未运行在宿主环境中）
    #[error("下载 API 不可用")]
    Unavailable,
}

impl ProviderError {
    /// 是否属于"目标已不存在"类失败
    ///
    /// 这类失败对 UI 而言等价于操作成功：记录反正已经没了
    pub fn is_stale(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}
