//! 软删除与撤销队列
//!
//! 用户点"移除"后记录立即从所有视图里消失，但提供方侧的
//! erase 要等一个固定宽限期才真正提交；宽限期内可以撤销。
//! 每条待删除各有一个提交定时器，撤销即取消定时器。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::provider::{DownloadId, DownloadProvider, DownloadRecord, ProviderError};

/// 队列向调度器上报的事件
#[derive(Debug)]
pub enum PendingDeleteEvent {
    /// 宽限期结束，提供方 erase 已发出并成功
    Committed { id: DownloadId },
    /// 提交时提供方调用失败（条目不会复活，UI 已经翻篇）
    CommitFailed { id: DownloadId, error: ProviderError },
}

/// 待删除条目
struct PendingDelete {
    /// 移除时刻的记录快照（撤销时还给调用方）
    record: DownloadRecord,
    /// 提交定时器的取消令牌
    cancel: CancellationToken,
}

/// 软删除队列
///
/// 不变式：每个 id 至多一条待删除。对已在队列中的 id 再次
/// 请求移除是 no-op，保留原定时器。
pub struct PendingDeleteQueue {
    provider: Arc<dyn DownloadProvider>,
    commit_delay: Duration,
    pending: Arc<DashMap<DownloadId, PendingDelete>>,
    event_tx: mpsc::UnboundedSender<PendingDeleteEvent>,
    /// 整体停机令牌，drop 时级联取消所有定时器
    shutdown: CancellationToken,
}

impl PendingDeleteQueue {
    pub fn new(
        provider: Arc<dyn DownloadProvider>,
        commit_delay: Duration,
        event_tx: mpsc::UnboundedSender<PendingDeleteEvent>,
    ) -> Self {
        Self {
            provider,
            commit_delay,
            pending: Arc::new(DashMap::new()),
            event_tx,
            shutdown: CancellationToken::new(),
        }
    }

    /// 请求移除一条记录，立即生效（视图层面），延迟提交
    ///
    /// 返回 false 表示该 id 已在队列中（保留原定时器，不重置）
    pub fn request_remove(&self, record: DownloadRecord) -> bool {
        let id = record.id;
        let cancel = self.shutdown.child_token();

        match self.pending.entry(id) {
            Entry::Occupied(_) => {
                debug!("记录 {} 已在待删除队列中，忽略重复请求", id);
                return false;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PendingDelete {
                    record,
                    cancel: cancel.clone(),
                });
            }
        }

        info!("记录 {} 进入待删除队列，{:?} 后提交", id, self.commit_delay);

        let provider = self.provider.clone();
        let pending = self.pending.clone();
        let event_tx = self.event_tx.clone();
        let delay = self.commit_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    debug!("记录 {} 的提交定时器被取消", id);
                    return;
                }
            }

            // 谁先从表里取走条目谁说了算：撤销和提交不会同时生效
            if pending.remove(&id).is_none() {
                return;
            }

            match provider.erase(id).await {
                Ok(()) => {
                    info!("记录 {} 已提交删除", id);
                    let _ = event_tx.send(PendingDeleteEvent::Committed { id });
                }
                Err(error) => {
                    warn!("记录 {} 提交删除失败: {}", id, error);
                    let _ = event_tx.send(PendingDeleteEvent::CommitFailed { id, error });
                }
            }
        });

        true
    }

    /// 撤销待删除
    ///
    /// 返回移除时刻的记录快照；定时器已经触发过则返回 None
    /// （调用方给出"已经移除"的提示，而不是报错）
    pub fn undo(&self, id: DownloadId) -> Option<DownloadRecord> {
        match self.pending.remove(&id) {
            Some((_, entry)) => {
                entry.cancel.cancel();
                info!("记录 {} 的移除已撤销", id);
                Some(entry.record)
            }
            None => {
                debug!("撤销 {} 时记录已不在队列中", id);
                None
            }
        }
    }

    /// id 是否在待删除队列中
    pub fn contains(&self, id: DownloadId) -> bool {
        self.pending.contains_key(&id)
    }

    /// 当前待删除 id 集合（交给筛选管线排除）
    pub fn pending_ids(&self) -> HashSet<DownloadId> {
        self.pending.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Drop for PendingDeleteQueue {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::{test_record, FakeProvider};
    use crate::provider::DownloadState;

    const COMMIT_DELAY: Duration = Duration::from_millis(30);

    fn setup() -> (
        Arc<FakeProvider>,
        PendingDeleteQueue,
        mpsc::UnboundedReceiver<PendingDeleteEvent>,
    ) {
        let provider = Arc::new(FakeProvider::new(vec![test_record(
            1,
            DownloadState::Complete,
            "a.pdf",
        )]));
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = PendingDeleteQueue::new(provider.clone(), COMMIT_DELAY, tx);
        (provider, queue, rx)
    }

    #[tokio::test]
    async fn test_undo_before_commit_never_erases() {
        let (provider, queue, _rx) = setup();

        assert!(queue.request_remove(test_record(1, DownloadState::Complete, "a.pdf")));
        assert!(queue.contains(1));

        let restored = queue.undo(1);
        assert_eq!(restored.map(|r| r.id), Some(1));
        assert!(!queue.contains(1));

        // 等过原定提交时刻，确认 erase 从未发出
        tokio::time::sleep(COMMIT_DELAY * 3).await;
        assert!(provider.erased().is_empty());
    }

    #[tokio::test]
    async fn test_commit_erases_exactly_once_and_undo_becomes_noop() {
        let (provider, queue, mut rx) = setup();

        queue.request_remove(test_record(1, DownloadState::Complete, "a.pdf"));
        tokio::time::sleep(COMMIT_DELAY * 3).await;

        assert_eq!(provider.erased(), vec![1]);
        assert!(matches!(
            rx.try_recv(),
            Ok(PendingDeleteEvent::Committed { id: 1 })
        ));

        // 定时器已触发，撤销是 no-op
        assert!(queue.undo(1).is_none());
        tokio::time::sleep(COMMIT_DELAY * 2).await;
        assert_eq!(provider.erased(), vec![1]);
    }

    #[tokio::test]
    async fn test_duplicate_request_keeps_original_timer() {
        let (provider, queue, _rx) = setup();

        assert!(queue.request_remove(test_record(1, DownloadState::Complete, "a.pdf")));
        tokio::time::sleep(COMMIT_DELAY / 2).await;
        // 重复请求不重置定时器
        assert!(!queue.request_remove(test_record(1, DownloadState::Complete, "a.pdf")));
        assert_eq!(queue.len(), 1);

        // 原定时器照常触发
        tokio::time::sleep(COMMIT_DELAY).await;
        assert_eq!(provider.erased(), vec![1]);
    }

    #[tokio::test]
    async fn test_commit_failure_reported_without_resurrection() {
        let (provider, queue, mut rx) = setup();
        provider.set_unavailable(true);

        queue.request_remove(test_record(1, DownloadState::Complete, "a.pdf"));
        tokio::time::sleep(COMMIT_DELAY * 3).await;

        assert!(matches!(
            rx.try_recv(),
            Ok(PendingDeleteEvent::CommitFailed { id: 1, .. })
        ));
        // 条目不复活
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_pending_ids_snapshot() {
        let (_provider, queue, _rx) = setup();
        queue.request_remove(test_record(1, DownloadState::Complete, "a.pdf"));
        queue.request_remove(test_record(2, DownloadState::Complete, "b.zip"));

        let ids = queue.pending_ids();
        assert!(ids.contains(&1));
        assert!(ids.contains(&2));
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn test_drop_cancels_timers() {
        let (provider, queue, _rx) = setup();
        queue.request_remove(test_record(1, DownloadState::Complete, "a.pdf"));
        drop(queue);

        tokio::time::sleep(COMMIT_DELAY * 3).await;
        assert!(provider.erased().is_empty());
    }
}
