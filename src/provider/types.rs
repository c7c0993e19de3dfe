use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 下载记录 ID
///
/// 由提供方分配，核心侧只读，绝不自行生成
pub type DownloadId = u64;

/// 下载记录状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    /// 等待中
    Queued,
    /// 下载中
    InProgress,
    /// 已暂停
    Paused,
    /// 已中断（失败）
    Interrupted,
    /// 已完成
    Complete,
}

impl DownloadState {
    /// 是否正在传输（驱动活跃轮询的唯一状态）
    pub fn is_active(&self) -> bool {
        matches!(self, DownloadState::InProgress)
    }

    /// 是否已进入终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Complete | DownloadState::Interrupted)
    }
}

/// 下载记录
///
/// 提供方拥有的可变集合中的一项，核心侧只做只读镜像。
/// 字段变化只能来自提供方的变更事件或快照，核心发起的
/// cancel/resume/erase 调用也要等提供方确认后才算生效。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadRecord {
    /// 记录 ID（不可变标识）
    pub id: DownloadId,
    /// 当前状态
    pub state: DownloadState,
    /// 已接收字节数
    pub bytes_received: u64,
    /// 总字节数（未知时为 None，而非 0）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    /// 本地文件路径（可能为空字符串）
    pub filename: String,
    /// 原始下载链接
    pub source_url: String,
    /// 重定向后的最终链接
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    /// 开始时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// 结束时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// 中断后是否可恢复
    pub can_resume: bool,
    /// 提供方预估的完成时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_end_time: Option<DateTime<Utc>>,
    /// 错误信息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadRecord {
    /// 计算进度百分比（总大小未知时为 None）
    pub fn progress_percent(&self) -> Option<u8> {
        let total = self.total_bytes?;
        if total == 0 {
            return None;
        }
        let percent = (self.bytes_received as f64 / total as f64) * 100.0;
        Some(percent.round().min(100.0) as u8)
    }

    /// 剩余字节数（总大小未知时为 None）
    pub fn remaining_bytes(&self) -> Option<u64> {
        self.total_bytes
            .map(|total| total.saturating_sub(self.bytes_received))
    }

    /// 用于搜索匹配和展示的链接（优先最终链接）
    pub fn effective_url(&self) -> &str {
        self.final_url.as_deref().unwrap_or(&self.source_url)
    }
}

/// 快照查询条件
///
/// 对应提供方 search 接口：可限定状态、按开始时间倒序、限制条数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// 只返回指定状态的记录
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<DownloadState>,
    /// 按开始时间倒序排列
    pub order_by_start_time_desc: bool,
    /// 最多返回条数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl SearchQuery {
    /// 最近记录的全量快照查询
    pub fn recent(limit: usize) -> Self {
        Self {
            state: None,
            order_by_start_time_desc: true,
            limit: Some(limit),
        }
    }

    /// 仅活跃（传输中）记录的部分查询
    pub fn active() -> Self {
        Self {
            state: Some(DownloadState::InProgress),
            order_by_start_time_desc: true,
            limit: None,
        }
    }

    /// 指定状态的全量查询（批量清理用）
    pub fn in_state(state: DownloadState) -> Self {
        Self {
            state: Some(state),
            order_by_start_time_desc: false,
            limit: None,
        }
    }
}

/// 变更事件中被修改的字段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangedField {
    State,
    Paused,
    Filename,
    Error,
    BytesReceived,
    TotalBytes,
    Exists,
    Other,
}

/// 提供方推送的部分变更事件
///
/// 粒度和时机由提供方决定，核心只把它当作"该刷新了"的提示，
/// 不把事件内容当作权威状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadDelta {
    /// 变更记录 ID
    pub id: DownloadId,
    /// 变更字段列表
    pub changed_fields: Vec<ChangedField>,
}

impl DownloadDelta {
    pub fn new(id: DownloadId, changed_fields: Vec<ChangedField>) -> Self {
        Self { id, changed_fields }
    }
}

/// 新建下载请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadRequest {
    /// 下载链接
    pub url: String,
    /// 建议保存的文件名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: None,
        }
    }
}
