//! 视图模型与渲染决策
//!
//! 把可见记录转成宿主可直接渲染的卡片视图模型，并基于快照
//! 内容签名决定是整列表重建还是只就地补数字。签名只覆盖
//! 提供方内容；本地可见性变化（软删除、筛选）由调度器直接
//! 触发重建，不经过签名。

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::filter::{FileCategory, FilterPipeline};
use crate::provider::{DownloadId, DownloadRecord, DownloadState};
use crate::settings::PopupSettings;
use crate::speed::SpeedReading;

/// 快照内容签名
///
/// 对 (id, 状态, 暂停, 错误, 文件名) 元组序列的顺序敏感摘要，
/// 用来判断"这次快照有没有值得重建的变化"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(u64);

/// 计算快照签名
pub fn snapshot_signature(records: &[DownloadRecord]) -> Signature {
    let mut hasher = DefaultHasher::new();
    records.len().hash(&mut hasher);
    for r in records {
        r.id.hash(&mut hasher);
        r.state.hash(&mut hasher);
        (r.state == DownloadState::Paused).hash(&mut hasher);
        r.error.hash(&mut hasher);
        r.filename.hash(&mut hasher);
    }
    Signature(hasher.finish())
}

/// 卡片上可绑定的动作
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CardAction {
    Open,
    ShowInFolder,
    Retry,
    Cancel,
    Remove,
}

/// 单条下载的视图模型
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DownloadCard {
    pub id: DownloadId,
    /// 展示文件名
    pub title: String,
    /// 完整本地路径（悬停提示用）
    pub full_path: String,
    /// 来源域名
    pub domain: String,
    pub state: DownloadState,
    pub status_label: &'static str,
    pub category: FileCategory,
    pub icon_label: &'static str,
    /// 大小文案
    pub size_label: String,
    /// 时间文案
    pub time_label: String,
    /// 进度百分比（仅下载中；总大小未知时为 None）
    pub progress_percent: Option<u8>,
    /// 已下载字节明细（设置开启时）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_label: Option<String>,
    /// 中断提示
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted_hint: Option<&'static str>,
    pub actions: Vec<CardAction>,
}

/// 活跃轮询期间的就地数字补丁
///
/// 宿主按 id 找到已渲染节点，只改进度相关字段，
/// 不重建节点，避免打断无关项上的瞬态 UI 状态
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressPatch {
    pub id: DownloadId,
    pub progress_percent: Option<u8>,
    pub bytes_received: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_label: Option<String>,
}

/// 一次渲染决定
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "plan", rename_all = "snake_case")]
pub enum RenderPlan {
    /// 整列表重建
    FullRebuild {
        cards: Vec<DownloadCard>,
        /// 正在下载的记录数（镜像全量，未过筛选）
        active_count: usize,
    },
    /// 只补活跃项的数字字段
    PatchActive {
        patches: Vec<ProgressPatch>,
        active_count: usize,
    },
}

/// 渲染状态
///
/// 记住上次完整渲染对应的签名；签名未变时跳过重建，
/// 保证对同一远端状态重复刷新不会扰动已渲染的视图
#[derive(Debug, Default)]
pub struct ViewState {
    last_signature: Option<Signature>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 观察一次快照签名，返回是否需要整列表重建
    pub fn observe(&mut self, signature: Signature) -> bool {
        if self.last_signature == Some(signature) {
            return false;
        }
        self.last_signature = Some(signature);
        true
    }
}

/// 状态文案
pub fn status_label(state: DownloadState) -> &'static str {
    match state {
        DownloadState::Queued => "等待中",
        DownloadState::InProgress => "下载中",
        DownloadState::Paused => "暂停",
        DownloadState::Interrupted => "失败",
        DownloadState::Complete => "已完成",
    }
}

/// 字节数文案（0 显示为 --）
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "--".to_string();
    }
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut index = 0;
    while value >= 1024.0 && index < UNITS.len() - 1 {
        value /= 1024.0;
        index += 1;
    }
    format!("{:.1}{}", value, UNITS[index])
}

/// 速率文案
pub fn format_rate(rate_bps: f64) -> Option<String> {
    if rate_bps < 1.0 {
        return None;
    }
    Some(format!("{}/s", format_bytes(rate_bps as u64)))
}

/// 时间文案：当天显示时分，昨天显示"昨天"，更早显示月-日
pub fn format_time(time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let time = match time {
        Some(t) => t,
        None => return "--".to_string(),
    };
    if time.date_naive() == now.date_naive() {
        return time.format("%H:%M").to_string();
    }
    if (now.date_naive() - time.date_naive()).num_days() == 1 {
        return "昨天".to_string();
    }
    format!("{:02}-{:02}", time.month(), time.day())
}

/// 按记录状态决定可用动作
fn actions_for(state: DownloadState) -> Vec<CardAction> {
    let mut actions = match state {
        DownloadState::Complete => vec![CardAction::Open, CardAction::ShowInFolder],
        DownloadState::Interrupted => vec![CardAction::Retry],
        DownloadState::InProgress | DownloadState::Queued => vec![CardAction::Cancel],
        // 暂停的记录也走恢复入口
        DownloadState::Paused => vec![CardAction::Retry],
    };
    actions.push(CardAction::Remove);
    actions
}

/// 构建单条卡片
///
/// `reading` 只对下载中的记录有意义，其余状态传 None
pub fn build_card(
    record: &DownloadRecord,
    pipeline: &FilterPipeline,
    reading: Option<SpeedReading>,
    settings: &PopupSettings,
    now: DateTime<Utc>,
) -> DownloadCard {
    let title = pipeline.file_name(record);
    let category = FileCategory::detect(&title);
    let in_progress = record.state == DownloadState::InProgress;

    let (progress_percent, progress_detail, rate_label, eta_label) = if in_progress {
        let detail = settings
            .show_speed_detail
            .then(|| format!("已下载 {}", format_bytes(record.bytes_received)));
        let rate = reading.and_then(|r| format_rate(r.rate_bps));
        let eta = reading.and_then(|r| r.eta.label());
        (record.progress_percent(), detail, rate, eta)
    } else {
        (None, None, None, None)
    };

    DownloadCard {
        id: record.id,
        full_path: record.filename.clone(),
        domain: pipeline.domain(record),
        state: record.state,
        status_label: status_label(record.state),
        icon_label: category.icon_label(),
        category,
        size_label: format_bytes(record.total_bytes.unwrap_or(record.bytes_received)),
        time_label: format_time(record.end_time.or(record.start_time), now),
        progress_percent,
        progress_detail,
        rate_label,
        eta_label,
        interrupted_hint: (record.state == DownloadState::Interrupted)
            .then_some("下载中断，可尝试重试"),
        actions: actions_for(record.state),
        title,
    }
}

/// 构建单条进度补丁
pub fn build_patch(
    record: &DownloadRecord,
    reading: SpeedReading,
    settings: &PopupSettings,
) -> ProgressPatch {
    ProgressPatch {
        id: record.id,
        progress_percent: record.progress_percent(),
        bytes_received: record.bytes_received,
        progress_detail: settings
            .show_speed_detail
            .then(|| format!("已下载 {}", format_bytes(record.bytes_received))),
        rate_label: format_rate(reading.rate_bps),
        eta_label: reading.eta.label(),
    }
}
