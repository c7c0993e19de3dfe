//! 刷新调度器
//!
//! 引擎的组装点：持有镜像数组、速度估算器、软删除队列和筛选
//! 状态，决定什么时候做全量快照、什么时候只做活跃记录的部分
//! 轮询。显式状态而不是层层嵌套的回调：
//! - 变更事件进入防抖窗口，窗口内的事件合并成一次快照请求
//! - 同一时刻至多一次全量快照在途，期间的触发登记成一次补跑
//! - 镜像里有传输中的记录时开 1 秒间隔的部分轮询，没有就停
//!
//! 单写者纪律：镜像数组和采样表只被刷新/轮询路径修改，筛选
//! 管线和视图层只读，不需要额外加锁协议。

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use parking_lot::RwLock as SyncRwLock;
use regex::Regex;
use serde::Serialize;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::MirrorError;
use crate::filter::{FileCategory, FilterPipeline, FilterState, StatusFilter};
use crate::provider::{
    DownloadId, DownloadProvider, DownloadRecord, DownloadRequest, DownloadState, ProviderError,
    SearchQuery,
};
use crate::settings::PopupSettings;
use crate::speed::SpeedEstimator;
use crate::undo::{PendingDeleteEvent, PendingDeleteQueue};
use crate::view::{build_card, build_patch, snapshot_signature, RenderPlan, ViewState};

/// 调度参数
///
/// 数值是经验值，不承载语义，可按宿主情况调整
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 变更事件防抖窗口
    pub debounce_window: Duration,
    /// 活跃记录部分轮询间隔
    pub active_poll_interval: Duration,
    /// 软删除提交宽限期
    pub undo_commit_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(500),
            active_poll_interval: Duration::from_secs(1),
            undo_commit_delay: Duration::from_secs(5),
        }
    }
}

impl SchedulerConfig {
    /// 毫秒级间隔的测试配置
    #[cfg(test)]
    pub fn fast_for_testing() -> Self {
        Self {
            debounce_window: Duration::from_millis(20),
            active_poll_interval: Duration::from_millis(25),
            undo_commit_delay: Duration::from_millis(40),
        }
    }
}

/// 提示级别
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// 一过性提示
    Info,
    /// 可重试的错误提示
    Warning,
    /// 阻断性提示（本次会话不可恢复）
    Blocking,
}

/// 用户可见提示（宿主渲染成 toast）
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UiNotice {
    pub text: String,
    pub level: NoticeLevel,
    /// 可附带的撤销入口
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undo_id: Option<DownloadId>,
}

impl UiNotice {
    fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: NoticeLevel::Info,
            undo_id: None,
        }
    }

    fn warning(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: NoticeLevel::Warning,
            undo_id: None,
        }
    }

    fn blocking(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: NoticeLevel::Blocking,
            undo_id: None,
        }
    }
}

/// 批量建下载的结果
#[derive(Debug, Default)]
pub struct BatchCreateReport {
    /// 成功创建的记录 ID
    pub created: Vec<DownloadId>,
    /// 被拒绝的条目及原因（无效链接在发起任何调用前就拒绝）
    pub rejected: Vec<(String, MirrorError)>,
}

/// 交给宿主消费的输出通道
pub struct SchedulerChannels {
    /// 渲染决定流
    pub render_rx: mpsc::UnboundedReceiver<RenderPlan>,
    /// 用户提示流
    pub notice_rx: mpsc::UnboundedReceiver<UiNotice>,
}

struct SchedulerInner {
    provider: Arc<dyn DownloadProvider>,
    config: SchedulerConfig,
    settings: PopupSettings,
    /// 镜像数组（提供方快照顺序，按开始时间倒序）
    records: RwLock<Vec<DownloadRecord>>,
    estimator: SyncMutex<SpeedEstimator>,
    pending: PendingDeleteQueue,
    pending_events: SyncMutex<Option<mpsc::UnboundedReceiver<PendingDeleteEvent>>>,
    filter: SyncRwLock<FilterState>,
    pipeline: FilterPipeline,
    view: SyncMutex<ViewState>,
    /// 全量快照是否在途
    snapshot_in_flight: AtomicBool,
    /// 在途期间收到触发时登记，完成后补跑一次
    reload_pending: AtomicBool,
    /// 活跃轮询是否在跑
    poll_running: AtomicBool,
    /// 提供方不可用（本次会话不再重试）
    provider_down: AtomicBool,
    render_tx: mpsc::UnboundedSender<RenderPlan>,
    notice_tx: mpsc::UnboundedSender<UiNotice>,
    /// 防抖触发器
    refresh_kick: Notify,
    cancel: CancellationToken,
    url_check: Regex,
}

/// 刷新调度器
///
/// 可构造、可销毁的组件实例：镜像、采样表、待删除表都是它的
/// 字段，测试里可以并存多个互不相干的实例
pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
}

impl RefreshScheduler {
    /// 创建调度器及其输出通道
    pub fn new(
        provider: Arc<dyn DownloadProvider>,
        settings: PopupSettings,
        config: SchedulerConfig,
    ) -> (Self, SchedulerChannels) {
        let (render_tx, render_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();

        let filter = FilterState {
            status: settings.default_status_filter,
            ..FilterState::default()
        };
        let pending = PendingDeleteQueue::new(provider.clone(), config.undo_commit_delay, pending_tx);

        info!(
            "创建刷新调度器: 防抖 {:?}, 轮询 {:?}, 撤销宽限 {:?}",
            config.debounce_window, config.active_poll_interval, config.undo_commit_delay
        );

        let inner = Arc::new(SchedulerInner {
            provider,
            config,
            settings,
            records: RwLock::new(Vec::new()),
            estimator: SyncMutex::new(SpeedEstimator::new()),
            pending,
            pending_events: SyncMutex::new(Some(pending_rx)),
            filter: SyncRwLock::new(filter),
            pipeline: FilterPipeline::new(),
            view: SyncMutex::new(ViewState::new()),
            snapshot_in_flight: AtomicBool::new(false),
            reload_pending: AtomicBool::new(false),
            poll_running: AtomicBool::new(false),
            provider_down: AtomicBool::new(false),
            render_tx,
            notice_tx,
            refresh_kick: Notify::new(),
            cancel: CancellationToken::new(),
            url_check: Regex::new(r"(?i)^(https?|ftp|file)://\S+$").expect("链接校验正则编译失败"),
        });

        (Self { inner }, SchedulerChannels { render_rx, notice_rx })
    }

    /// 启动后台循环并做首次全量刷新
    ///
    /// 启动三个循环：变更事件监听、防抖、软删除事件消费。
    /// 不调用 start 也可以手动驱动（`reconcile_now` 等），测试用
    pub async fn start(&self) {
        // 变更事件 → 刷新提示（事件内容不作为权威状态）
        let mut deltas = self.inner.provider.subscribe();
        {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        delta = deltas.recv() => match delta {
                            Some(delta) => {
                                debug!("收到变更事件: 记录 {}", delta.id);
                                inner.refresh_kick.notify_one();
                            }
                            None => break,
                        },
                        _ = inner.cancel.cancelled() => break,
                    }
                }
            });
        }

        // 防抖循环
        {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                inner.debounce_loop().await;
            });
        }

        // 软删除提交事件
        if let Some(mut rx) = self.inner.pending_events.lock().take() {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        event = rx.recv() => match event {
                            Some(PendingDeleteEvent::Committed { id }) => {
                                debug!("待删除 {} 已提交，安排刷新确认", id);
                                inner.refresh_kick.notify_one();
                            }
                            Some(PendingDeleteEvent::CommitFailed { id, error }) => {
                                warn!("待删除 {} 提交失败: {}", id, error);
                                inner.notify(UiNotice::warning("移除失败"));
                                inner.refresh_kick.notify_one();
                            }
                            None => break,
                        },
                        _ = inner.cancel.cancelled() => break,
                    }
                }
            });
        }

        self.inner.clone().reconcile().await;
    }

    /// 立即做一次全量刷新（合并规则照常生效）
    pub async fn reconcile_now(&self) {
        self.inner.clone().reconcile().await;
    }

    /// 请求一次防抖刷新（等价于收到一条变更事件）
    pub fn request_refresh(&self) {
        self.inner.refresh_kick.notify_one();
    }

    /// 活跃轮询是否在跑
    pub fn is_polling(&self) -> bool {
        self.inner.poll_running.load(Ordering::SeqCst)
    }

    /// 当前镜像快照（克隆）
    pub async fn records(&self) -> Vec<DownloadRecord> {
        self.inner.records.read().await.clone()
    }

    /// 当前筛选状态
    pub fn filter_state(&self) -> FilterState {
        self.inner.filter.read().clone()
    }

    /// 更新搜索词并重建可见列表
    pub async fn set_search_text(&self, text: &str) {
        self.inner.filter.write().search_text = text.trim().to_string();
        self.inner.emit_full_rebuild().await;
    }

    /// 更新状态筛选并重建可见列表
    pub async fn set_status_filter(&self, status: StatusFilter) {
        self.inner.filter.write().status = status;
        self.inner.emit_full_rebuild().await;
    }

    /// 更新类型筛选并重建可见列表
    pub async fn set_type_filter(&self, file_type: Option<FileCategory>) {
        self.inner.filter.write().file_type = file_type;
        self.inner.emit_full_rebuild().await;
    }

    /// 移除一条下载记录
    ///
    /// 设置开了撤销时走软删除：立即从视图消失，宽限期后才真正
    /// erase；否则直接 erase。目标已消失时按成功处理
    pub async fn request_remove(&self, id: DownloadId) -> Result<(), MirrorError> {
        let inner = &self.inner;

        if !inner.settings.undo_enabled {
            return match inner.provider.erase(id).await {
                Ok(()) => {
                    inner.notify(UiNotice::info("已移除下载记录"));
                    inner.refresh_kick.notify_one();
                    Ok(())
                }
                Err(e) if e.is_stale() => {
                    inner.refresh_kick.notify_one();
                    Ok(())
                }
                Err(e) => {
                    warn!("移除记录 {} 失败: {}", id, e);
                    inner.notify(UiNotice::warning("移除失败"));
                    Err(MirrorError::call_failed("erase", e))
                }
            };
        }

        let record = inner
            .records
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned();
        let record = match record {
            Some(r) => r,
            None => {
                debug!("移除 {} 时镜像中已无此记录，按成功处理", id);
                return Ok(());
            }
        };

        if inner.pending.request_remove(record) {
            inner.emit_full_rebuild().await;
            inner.notify(UiNotice {
                text: "已移除下载记录".to_string(),
                level: NoticeLevel::Info,
                undo_id: Some(id),
            });
        }
        Ok(())
    }

    /// 撤销软删除
    ///
    /// 宽限期已过时是 no-op，只给一个"已经移除"的提示
    pub async fn undo_remove(&self, id: DownloadId) {
        match self.inner.pending.undo(id) {
            Some(_) => {
                self.inner.emit_full_rebuild().await;
                self.inner.notify(UiNotice::info("已恢复下载记录"));
            }
            None => {
                self.inner.notify(UiNotice::info("记录已被移除，无法撤销"));
            }
        }
    }

    /// 取消下载
    pub async fn cancel_download(&self, id: DownloadId) -> Result<(), MirrorError> {
        let inner = &self.inner;
        inner
            .simple_mutation(
                id,
                "cancel",
                Some("已取消下载"),
                "取消失败",
                true,
                inner.provider.cancel(id),
            )
            .await
    }

    /// 重试（中断恢复与暂停恢复都走提供方的 resume）
    pub async fn retry_download(&self, id: DownloadId) -> Result<(), MirrorError> {
        let inner = &self.inner;
        inner
            .simple_mutation(
                id,
                "resume",
                Some("已尝试重试"),
                "重试失败",
                true,
                inner.provider.resume(id),
            )
            .await
    }

    /// 打开已下载的文件
    pub async fn open_file(&self, id: DownloadId) -> Result<(), MirrorError> {
        let inner = &self.inner;
        inner
            .simple_mutation(
                id,
                "open",
                None,
                "文件可能已移动或删除",
                false,
                inner.provider.open(id),
            )
            .await
    }

    /// 在文件管理器中定位文件
    pub async fn show_in_folder(&self, id: DownloadId) -> Result<(), MirrorError> {
        let inner = &self.inner;
        inner
            .simple_mutation(
                id,
                "show",
                None,
                "无法打开所在文件夹",
                false,
                inner.provider.show_in_folder(id),
            )
            .await
    }

    /// 删除磁盘文件并移除记录
    pub async fn remove_file_and_erase(&self, id: DownloadId) -> Result<(), MirrorError> {
        let inner = &self.inner;
        match inner.provider.remove_file(id).await {
            Ok(()) => {}
            Err(e) if e.is_stale() => {}
            Err(e) => {
                warn!("删除文件 {} 失败: {}", id, e);
                inner.notify(UiNotice::warning("移除失败"));
                return Err(MirrorError::call_failed("remove_file", e));
            }
        }
        // 文件已删，记录移除失败只记日志，不把用户卡在这里
        if let Err(e) = inner.provider.erase(id).await {
            warn!("删除文件后移除记录 {} 失败: {}", id, e);
        }
        inner.notify(UiNotice::info("已删除文件和记录"));
        inner.refresh_kick.notify_one();
        Ok(())
    }

    /// 新建下载（先本地校验链接，再调提供方）
    pub async fn create_download(&self, url: &str) -> Result<DownloadId, MirrorError> {
        let inner = &self.inner;
        let url = url.trim();
        if !inner.url_check.is_match(url) {
            return Err(MirrorError::InvalidUrl(url.to_string()));
        }
        match inner.provider.download(DownloadRequest::new(url)).await {
            Ok(id) => {
                info!("已创建下载: id={}, url={}", id, url);
                inner.refresh_kick.notify_one();
                Ok(id)
            }
            Err(e) => {
                warn!("创建下载失败: {}", e);
                inner.notify(UiNotice::warning("创建下载失败"));
                Err(MirrorError::call_failed("download", e))
            }
        }
    }

    /// 批量新建下载，逐条校验、逐条上报
    pub async fn create_downloads(&self, urls: &[String]) -> BatchCreateReport {
        let mut report = BatchCreateReport::default();
        for url in urls {
            match self.create_download(url).await {
                Ok(id) => report.created.push(id),
                Err(e) => {
                    if matches!(e, MirrorError::InvalidUrl(_)) {
                        self.inner
                            .notify(UiNotice::warning(format!("无效的下载链接: {}", url)));
                    }
                    report.rejected.push((url.clone(), e));
                }
            }
        }
        report
    }

    /// 按状态批量清理记录，返回清理条数
    pub async fn clear_by_state(&self, state: DownloadState) -> Result<usize, MirrorError> {
        let inner = &self.inner;
        let items = match inner.provider.search(SearchQuery::in_state(state)).await {
            Ok(items) => items,
            Err(e) => {
                warn!("批量清理查询失败: {}", e);
                inner.notify(UiNotice::warning("批量清理失败"));
                return Err(MirrorError::call_failed("search", e));
            }
        };

        let mut cleared = 0;
        let mut failed = 0;
        for item in &items {
            match inner.provider.erase(item.id).await {
                Ok(()) => cleared += 1,
                Err(e) if e.is_stale() => cleared += 1,
                Err(e) => {
                    warn!("清理记录 {} 失败: {}", item.id, e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            inner.notify(UiNotice::warning(format!("{} 条记录清理失败", failed)));
        } else {
            inner.notify(UiNotice::info(match state {
                DownloadState::Complete => "已完成记录已清理",
                DownloadState::Interrupted => "失败记录已清理",
                _ => "记录已清理",
            }));
        }
        inner.refresh_kick.notify_one();
        Ok(cleared)
    }

    /// 停机：取消所有后台循环与待提交定时器
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl SchedulerInner {
    fn notify(&self, notice: UiNotice) {
        let _ = self.notice_tx.send(notice);
    }

    fn send_render(&self, plan: RenderPlan) {
        if self.render_tx.send(plan).is_err() {
            debug!("渲染通道已关闭，丢弃渲染计划");
        }
    }

    /// 防抖循环：首个事件开窗，窗口内的后续事件重置计时，
    /// 窗口安静后才发起一次刷新
    async fn debounce_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.refresh_kick.notified() => {}
                _ = self.cancel.cancelled() => return,
            }
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.debounce_window) => break,
                    _ = self.refresh_kick.notified() => continue,
                    _ = self.cancel.cancelled() => return,
                }
            }
            self.clone().reconcile().await;
        }
    }

    /// 全量刷新一轮
    ///
    /// 不变式：同一时刻至多一次快照请求在途。抢不到在途标记就
    /// 登记 reload_pending，由持有方完成后补跑，绝不并发两次
    async fn reconcile(self: Arc<Self>) {
        if self.provider_down.load(Ordering::SeqCst) {
            return;
        }
        if self
            .snapshot_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.reload_pending.store(true, Ordering::SeqCst);
            debug!("快照请求在途，登记补跑");
            return;
        }

        loop {
            self.fetch_and_apply().await;
            if !self.reload_pending.swap(false, Ordering::SeqCst) {
                break;
            }
            debug!("在途期间收到新触发，立即补跑一次");
        }
        self.snapshot_in_flight.store(false, Ordering::SeqCst);

        self.ensure_active_polling();
    }

    async fn fetch_and_apply(&self) {
        match self
            .provider
            .search(SearchQuery::recent(self.settings.list_size))
            .await
        {
            Ok(items) => {
                let signature = snapshot_signature(&items);
                {
                    let mut records = self.records.write().await;
                    *records = items;
                }
                let changed = self.view.lock().observe(signature);
                if changed {
                    self.emit_full_rebuild().await;
                } else {
                    // 内容没变就不动已渲染的视图（镜像照常换新）
                    debug!("快照签名未变，跳过重建");
                }
                self.evict_inactive_samples().await;
            }
            Err(ProviderError::Unavailable) => {
                // 本次会话致命：提示一次，之后不再发起刷新
                if !self.provider_down.swap(true, Ordering::SeqCst) {
                    error!("下载提供方不可用");
                    self.notify(UiNotice::blocking("请在扩展环境中打开"));
                }
            }
            Err(e) => {
                // 瞬态失败：保留上一份镜像，绝不清空列表
                warn!("加载下载列表失败: {}", e);
                self.notify(UiNotice::warning("加载下载列表失败"));
            }
        }
    }

    /// 整列表重建：筛选 → 建卡片 → 推给宿主
    async fn emit_full_rebuild(&self) {
        let records = self.records.read().await;
        let filter = self.filter.read().clone();
        let pending_ids = self.pending.pending_ids();
        let visible = self.pipeline.visible(&records, &pending_ids, &filter);

        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        let mut estimator = self.estimator.lock();
        let cards = visible
            .iter()
            .map(|record| {
                let reading = record
                    .state
                    .is_active()
                    .then(|| estimator.estimate(record, now_ms));
                build_card(record, &self.pipeline, reading, &self.settings, now)
            })
            .collect();
        drop(estimator);

        let active_count = records.iter().filter(|r| r.state.is_active()).count();
        self.send_render(RenderPlan::FullRebuild { cards, active_count });
    }

    /// 采样表逐出：只保留仍在活跃集合中的样本
    async fn evict_inactive_samples(&self) {
        let active: HashSet<DownloadId> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.state.is_active())
            .map(|r| r.id)
            .collect();
        self.estimator.lock().retain_ids(&active);
    }

    async fn has_active(&self) -> bool {
        self.records
            .read()
            .await
            .iter()
            .any(|r| r.state.is_active())
    }

    /// 有活跃记录且轮询未跑时启动轮询
    ///
    /// 每次全量刷新后、每次部分轮询后都会经过这里，保证
    /// "出现活跃记录就开表、活跃记录清零就停表"
    fn ensure_active_polling(self: Arc<Self>) {
        if self
            .poll_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        tokio::spawn(async move {
            loop {
                if !self.has_active().await {
                    self.poll_running.store(false, Ordering::SeqCst);
                    return;
                }
                info!("存在活跃任务，启动部分轮询");
                self.clone().poll_loop().await;
                self.poll_running.store(false, Ordering::SeqCst);
                debug!("活跃任务清零，部分轮询停止");
                // 停表与置位之间可能刚好又冒出活跃任务，补查一次
                if !self.has_active().await {
                    return;
                }
                if self
                    .poll_running
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    return;
                }
            }
        });
    }

    /// 活跃记录的固定间隔部分轮询
    ///
    /// 只查活跃记录、只补数字字段，不经过筛选管线、不碰
    /// 无关条目；活跃集合清零即退出
    async fn poll_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.active_poll_interval) => {}
                _ = self.cancel.cancelled() => return,
            }

            match self.provider.search(SearchQuery::active()).await {
                Ok(items) if items.is_empty() => {
                    if self.has_active().await {
                        // 提供方已无活跃任务而镜像还标着活跃：状态分叉，
                        // 用一次全量刷新纠偏
                        warn!("活跃集合与镜像不一致，触发全量刷新");
                        self.clone().reconcile().await;
                    }
                    return;
                }
                Ok(items) => {
                    self.apply_active_patch(items).await;
                    if !self.has_active().await {
                        return;
                    }
                }
                Err(ProviderError::Unavailable) => return,
                Err(e) => {
                    // 单拍失败不致命，下一拍重试
                    warn!("活跃任务查询失败: {}", e);
                }
            }
        }
    }

    /// 把部分查询结果并进镜像，产出就地数字补丁
    async fn apply_active_patch(&self, items: Vec<DownloadRecord>) {
        let now_ms = Utc::now().timestamp_millis();
        let mut patches = Vec::with_capacity(items.len());
        let active_count;
        {
            let mut records = self.records.write().await;
            let mut estimator = self.estimator.lock();
            for item in &items {
                if let Some(slot) = records.iter_mut().find(|r| r.id == item.id) {
                    // 只同步进度相关的数字字段；状态变化留给全量刷新走签名
                    slot.bytes_received = item.bytes_received;
                    slot.total_bytes = item.total_bytes;
                    slot.estimated_end_time = item.estimated_end_time;
                    let reading = estimator.estimate(slot, now_ms);
                    if !self.pending.contains(slot.id) {
                        patches.push(build_patch(slot, reading, &self.settings));
                    }
                }
            }
            active_count = records.iter().filter(|r| r.state.is_active()).count();
        }

        if !patches.is_empty() {
            self.send_render(RenderPlan::PatchActive {
                patches,
                active_count,
            });
        }
    }

    /// 单次提供方变更调用的通用收尾
    ///
    /// 目标已消失（过期操作）按成功处理；其余失败记日志、
    /// 提示用户、不自动重试
    async fn simple_mutation(
        &self,
        id: DownloadId,
        op: &'static str,
        ok_text: Option<&str>,
        err_text: &str,
        refresh_after: bool,
        call: impl Future<Output = Result<(), ProviderError>>,
    ) -> Result<(), MirrorError> {
        match call.await {
            Ok(()) => {
                if let Some(text) = ok_text {
                    self.notify(UiNotice::info(text));
                }
                if refresh_after {
                    self.refresh_kick.notify_one();
                }
                Ok(())
            }
            Err(e) if e.is_stale() => {
                debug!("{} 作用于已消失的记录 {}，按成功处理", op, id);
                if refresh_after {
                    self.refresh_kick.notify_one();
                }
                Ok(())
            }
            Err(e) => {
                warn!("{} 记录 {} 失败: {}", op, id, e);
                self.notify(UiNotice::warning(err_text));
                Err(MirrorError::call_failed(op, e))
            }
        }
    }
}
