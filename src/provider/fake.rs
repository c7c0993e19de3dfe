//! 测试用的确定性提供方实现
//!
//! 内存中持有一组脚本化的记录，记录每次调用，支持注入
//! 失败和人为的查询延迟，用于驱动调度器的并发路径。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{
    ChangedField, DownloadDelta, DownloadId, DownloadProvider, DownloadRecord, DownloadRequest,
    DownloadState, ProviderError, SearchQuery,
};

/// 构造测试记录
pub fn test_record(id: DownloadId, state: DownloadState, filename: &str) -> DownloadRecord {
    DownloadRecord {
        id,
        state,
        bytes_received: 0,
        total_bytes: Some(1_000_000),
        filename: format!("/downloads/{}", filename),
        source_url: format!("https://files.example.com/{}", filename),
        final_url: None,
        // 开始时间按 id 倒排，保证快照顺序稳定
        start_time: Utc.timestamp_opt(1_700_000_000 - id as i64, 0).single(),
        end_time: None,
        can_resume: state == DownloadState::Interrupted,
        estimated_end_time: None,
        error: None,
    }
}

#[derive(Default)]
struct CallLog {
    erased: Vec<DownloadId>,
    cancelled: Vec<DownloadId>,
    resumed: Vec<DownloadId>,
    files_removed: Vec<DownloadId>,
    opened: Vec<DownloadId>,
    shown: Vec<DownloadId>,
    downloads: Vec<DownloadRequest>,
}

/// 确定性假提供方
pub struct FakeProvider {
    records: Mutex<Vec<DownloadRecord>>,
    calls: Mutex<CallLog>,
    search_calls: AtomicUsize,
    active_search_calls: AtomicUsize,
    search_failures: Mutex<VecDeque<ProviderError>>,
    search_delay: Mutex<Duration>,
    unavailable: AtomicBool,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<DownloadDelta>>>,
    next_download_id: AtomicUsize,
}

impl FakeProvider {
    pub fn new(records: Vec<DownloadRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            calls: Mutex::new(CallLog::default()),
            search_calls: AtomicUsize::new(0),
            active_search_calls: AtomicUsize::new(0),
            search_failures: Mutex::new(VecDeque::new()),
            search_delay: Mutex::new(Duration::ZERO),
            unavailable: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
            next_download_id: AtomicUsize::new(1000),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// 替换整个记录集（模拟提供方侧的状态变化）
    pub fn set_records(&self, records: Vec<DownloadRecord>) {
        *self.records.lock() = records;
    }

    /// 修改单条记录
    pub fn update_record(&self, id: DownloadId, f: impl FnOnce(&mut DownloadRecord)) {
        let mut records = self.records.lock();
        if let Some(r) = records.iter_mut().find(|r| r.id == id) {
            f(r);
        }
    }

    /// 向所有订阅者推送一条变更事件
    pub fn emit_change(&self, id: DownloadId) {
        let delta = DownloadDelta::new(id, vec![ChangedField::Other]);
        self.subscribers
            .lock()
            .retain(|tx| tx.send(delta.clone()).is_ok());
    }

    /// 下一次 search 返回指定错误
    pub fn fail_next_search(&self, err: ProviderError) {
        self.search_failures.lock().push_back(err);
    }

    /// 给每次 search 注入延迟（测试并发合并用）
    pub fn set_search_delay(&self, delay: Duration) {
        *self.search_delay.lock() = delay;
    }

    /// 模拟宿主环境缺失
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn search_count(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn active_search_count(&self) -> usize {
        self.active_search_calls.load(Ordering::SeqCst)
    }

    pub fn erased(&self) -> Vec<DownloadId> {
        self.calls.lock().erased.clone()
    }

    pub fn cancelled(&self) -> Vec<DownloadId> {
        self.calls.lock().cancelled.clone()
    }

    pub fn resumed(&self) -> Vec<DownloadId> {
        self.calls.lock().resumed.clone()
    }

    pub fn files_removed(&self) -> Vec<DownloadId> {
        self.calls.lock().files_removed.clone()
    }

    pub fn downloads(&self) -> Vec<DownloadRequest> {
        self.calls.lock().downloads.clone()
    }

    pub fn opened(&self) -> Vec<DownloadId> {
        self.calls.lock().opened.clone()
    }

    pub fn shown(&self) -> Vec<DownloadId> {
        self.calls.lock().shown.clone()
    }

    fn contains(&self, id: DownloadId) -> bool {
        self.records.lock().iter().any(|r| r.id == id)
    }

    fn check_available(&self) -> Result<(), ProviderError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(ProviderError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DownloadProvider for FakeProvider {
    async fn search(&self, query: SearchQuery) -> Result<Vec<DownloadRecord>, ProviderError> {
        let delay = *self.search_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if query.state == Some(DownloadState::InProgress) {
            self.active_search_calls.fetch_add(1, Ordering::SeqCst);
        }

        self.check_available()?;
        if let Some(err) = self.search_failures.lock().pop_front() {
            return Err(err);
        }

        let mut items: Vec<DownloadRecord> = self
            .records
            .lock()
            .iter()
            .filter(|r| query.state.map_or(true, |s| r.state == s))
            .cloned()
            .collect();
        if query.order_by_start_time_desc {
            items.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        }
        if let Some(limit) = query.limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn cancel(&self, id: DownloadId) -> Result<(), ProviderError> {
        self.check_available()?;
        if !self.contains(id) {
            return Err(ProviderError::NotFound(id));
        }
        self.calls.lock().cancelled.push(id);
        self.update_record(id, |r| r.state = DownloadState::Interrupted);
        Ok(())
    }

    async fn resume(&self, id: DownloadId) -> Result<(), ProviderError> {
        self.check_available()?;
        if !self.contains(id) {
            return Err(ProviderError::NotFound(id));
        }
        self.calls.lock().resumed.push(id);
        Ok(())
    }

    async fn erase(&self, id: DownloadId) -> Result<(), ProviderError> {
        self.check_available()?;
        self.calls.lock().erased.push(id);
        // erase 幂等：记录不存在时提供方同样返回成功
        self.records.lock().retain(|r| r.id != id);
        Ok(())
    }

    async fn remove_file(&self, id: DownloadId) -> Result<(), ProviderError> {
        self.check_available()?;
        if !self.contains(id) {
            return Err(ProviderError::NotFound(id));
        }
        self.calls.lock().files_removed.push(id);
        Ok(())
    }

    async fn open(&self, id: DownloadId) -> Result<(), ProviderError> {
        self.check_available()?;
        if !self.contains(id) {
            return Err(ProviderError::NotFound(id));
        }
        self.calls.lock().opened.push(id);
        Ok(())
    }

    async fn show_in_folder(&self, id: DownloadId) -> Result<(), ProviderError> {
        self.check_available()?;
        if !self.contains(id) {
            return Err(ProviderError::NotFound(id));
        }
        self.calls.lock().shown.push(id);
        Ok(())
    }

    async fn download(&self, request: DownloadRequest) -> Result<DownloadId, ProviderError> {
        self.check_available()?;
        let id = self.next_download_id.fetch_add(1, Ordering::SeqCst) as DownloadId;
        self.calls.lock().downloads.push(request.clone());
        let name = request
            .filename
            .unwrap_or_else(|| "download.bin".to_string());
        let mut record = test_record(id, DownloadState::InProgress, &name);
        record.source_url = request.url;
        self.records.lock().push(record);
        Ok(id)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<DownloadDelta> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_filters_and_orders() {
        let provider = FakeProvider::new(vec![
            test_record(1, DownloadState::Complete, "a.pdf"),
            test_record(2, DownloadState::InProgress, "b.zip"),
            test_record(3, DownloadState::InProgress, "c.iso"),
        ]);

        let all = provider.search(SearchQuery::recent(10)).await.unwrap();
        assert_eq!(all.len(), 3);
        // start_time 按 id 倒排构造，倒序后 id 小的在前
        assert_eq!(all[0].id, 1);

        let active = provider.search(SearchQuery::active()).await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|r| r.state == DownloadState::InProgress));
    }

    #[tokio::test]
    async fn test_mutations_are_recorded() {
        let provider = FakeProvider::new(vec![test_record(7, DownloadState::InProgress, "x.bin")]);

        provider.cancel(7).await.unwrap();
        provider.erase(7).await.unwrap();
        assert_eq!(provider.cancelled(), vec![7]);
        assert_eq!(provider.erased(), vec![7]);

        // 记录已被 erase，后续 cancel 报 NotFound
        assert_eq!(provider.cancel(7).await, Err(ProviderError::NotFound(7)));
        // erase 保持幂等
        assert!(provider.erase(7).await.is_ok());
    }

    #[tokio::test]
    async fn test_change_events_reach_subscribers() {
        let provider = FakeProvider::empty();
        let mut rx = provider.subscribe();
        provider.emit_change(5);
        let delta = rx.recv().await.unwrap();
        assert_eq!(delta.id, 5);
    }

    #[tokio::test]
    async fn test_injected_search_failure() {
        let provider = FakeProvider::empty();
        provider.fail_next_search(ProviderError::Transport("超时".to_string()));
        assert!(provider.search(SearchQuery::recent(10)).await.is_err());
        assert!(provider.search(SearchQuery::recent(10)).await.is_ok());
    }
}
