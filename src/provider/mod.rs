//! 下载提供方适配层
//!
//! 把外部异步资源 API（查询、变更、变更事件订阅）抽象为一个
//! 可注入的 trait，核心逻辑只面向这层接口编程。
//! 测试用的确定性假实现在 `fake.rs`。

mod error;
mod types;

#[cfg(test)]
pub mod fake;

pub use error::*;
pub use types::*;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// 下载提供方接口
///
/// 所有变更调用（cancel/resume/erase 等）的语义都是"请求"：
/// 调用成功返回不代表状态已落地，真正的确认来自后续的
/// 变更事件或快照。订阅返回的事件只是刷新提示。
#[async_trait]
pub trait DownloadProvider: Send + Sync {
    /// 查询快照（全量或按条件过滤）
    async fn search(&self, query: SearchQuery) -> Result<Vec<DownloadRecord>, ProviderError>;

    /// 取消下载
    async fn cancel(&self, id: DownloadId) -> Result<(), ProviderError>;

    /// 恢复（中断重试也走这里）
    async fn resume(&self, id: DownloadId) -> Result<(), ProviderError>;

    /// 移除下载记录
    async fn erase(&self, id: DownloadId) -> Result<(), ProviderError>;

    /// 删除磁盘文件（记录仍需另行 erase）
    async fn remove_file(&self, id: DownloadId) -> Result<(), ProviderError>;

    /// 打开已下载的文件
    async fn open(&self, id: DownloadId) -> Result<(), ProviderError>;

    /// 在文件管理器中定位文件
    async fn show_in_folder(&self, id: DownloadId) -> Result<(), ProviderError>;

    /// 新建下载，返回提供方分配的记录 ID
    async fn download(&self, request: DownloadRequest) -> Result<DownloadId, ProviderError>;

    /// 订阅变更事件流
    ///
    /// 事件的粒度与时机由提供方决定，可能合并、可能乱序，
    /// 订阅方必须把它当提示而非权威状态
    fn subscribe(&self) -> mpsc::UnboundedReceiver<DownloadDelta>;
}
