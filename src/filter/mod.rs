//! 筛选与搜索管线
//!
//! 从（全量记录、待删除集合、筛选状态）到有序可见列表的纯投影。
//! 谓词按顺序短路：待删除 → 状态 → 类型 → 搜索词。
//! 顺序保持提供方快照的顺序（按开始时间倒序），管线自身从不重排。

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::provider::{DownloadId, DownloadRecord, DownloadState};

/// 状态筛选
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    All,
    /// 未完结（等待中、下载中、已暂停）
    ///
    /// 旧版本把这个值持久化成 "downloading"，按进行中解析
    #[serde(alias = "downloading")]
    InProgress,
    Complete,
    Interrupted,
}

impl StatusFilter {
    /// 记录状态是否落在该筛选内
    pub fn matches(&self, state: DownloadState) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::InProgress => matches!(
                state,
                DownloadState::Queued | DownloadState::InProgress | DownloadState::Paused
            ),
            StatusFilter::Complete => state == DownloadState::Complete,
            StatusFilter::Interrupted => state == DownloadState::Interrupted,
        }
    }
}

/// 文件类型分类
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Document,
    Spreadsheet,
    Image,
    Archive,
    Installer,
    Other,
}

/// 扩展名到分类的固定映射表
const EXTENSION_TABLE: &[(FileCategory, &[&str])] = &[
    (FileCategory::Document, &["pdf", "doc", "docx", "ppt", "pptx"]),
    (FileCategory::Spreadsheet, &["xls", "xlsx", "csv"]),
    (
        FileCategory::Image,
        &["png", "jpg", "jpeg", "webp", "gif", "svg"],
    ),
    (FileCategory::Archive, &["zip", "rar", "7z"]),
    (FileCategory::Installer, &["exe", "dmg", "pkg"]),
];

impl FileCategory {
    /// 图标缩写
    pub fn icon_label(&self) -> &'static str {
        match self {
            FileCategory::Document => "DOC",
            FileCategory::Spreadsheet => "XLS",
            FileCategory::Image => "IMG",
            FileCategory::Archive => "ZIP",
            FileCategory::Installer => "APP",
            FileCategory::Other => "FILE",
        }
    }

    /// 按文件名扩展名归类
    pub fn detect(file_name: &str) -> Self {
        let lower = file_name.to_lowercase();
        let ext = match lower.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext,
            _ => return FileCategory::Other,
        };
        EXTENSION_TABLE
            .iter()
            .find(|(_, exts)| exts.contains(&ext))
            .map(|(cat, _)| *cat)
            .unwrap_or(FileCategory::Other)
    }
}

/// 筛选状态（纯 UI 状态，不持久化）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterState {
    /// 搜索词（已去除首尾空白）
    pub search_text: String,
    /// 状态筛选
    pub status: StatusFilter,
    /// 类型筛选（None 表示全部）
    pub file_type: Option<FileCategory>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            search_text: String::new(),
            status: StatusFilter::All,
            file_type: None,
        }
    }
}

/// 筛选管线
///
/// 持有一次性编译好的 URL 解析正则；`visible` 对相同输入
/// 产出完全相同的结果
pub struct FilterPipeline {
    host_re: Regex,
}

/// 文件名兜底文案
pub const UNKNOWN_FILE: &str = "未知文件";
/// 域名兜底文案
pub const LOCAL_OR_UNKNOWN: &str = "本地/未知来源";

impl FilterPipeline {
    pub fn new() -> Self {
        Self {
            host_re: Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://(?:[^/?#@]*@)?([^/?#:]+)")
                .expect("URL 主机名正则编译失败"),
        }
    }

    /// 可见列表投影
    ///
    /// 待删除的记录无条件排除，与状态/类型/搜索筛选无关
    pub fn visible<'a>(
        &self,
        records: &'a [DownloadRecord],
        pending_deletes: &HashSet<DownloadId>,
        filter: &FilterState,
    ) -> Vec<&'a DownloadRecord> {
        let keyword = filter.search_text.to_lowercase();
        records
            .iter()
            .filter(|r| {
                if pending_deletes.contains(&r.id) {
                    return false;
                }
                if !filter.status.matches(r.state) {
                    return false;
                }
                let category = FileCategory::detect(&self.file_name(r));
                if let Some(wanted) = filter.file_type {
                    if category != wanted {
                        return false;
                    }
                }
                if keyword.is_empty() {
                    return true;
                }
                self.file_name(r).to_lowercase().contains(&keyword)
                    || self.domain(r).to_lowercase().contains(&keyword)
            })
            .collect()
    }

    /// 展示用文件名
    ///
    /// 本地路径（兼容正反斜杠）取末段；没有路径时退回链接的
    /// 最后一个路径段，再退回主机名
    pub fn file_name(&self, record: &DownloadRecord) -> String {
        if !record.filename.is_empty() {
            if let Some(name) = record
                .filename
                .rsplit(['/', '\\'])
                .find(|part| !part.is_empty())
            {
                return name.to_string();
            }
            return UNKNOWN_FILE.to_string();
        }

        let url = record.effective_url();
        if let Some(segment) = self.last_path_segment(url) {
            return segment;
        }
        match self.host(url) {
            Some(host) => host,
            None => UNKNOWN_FILE.to_string(),
        }
    }

    /// 展示用来源域名
    pub fn domain(&self, record: &DownloadRecord) -> String {
        let url = record.effective_url();
        if url.is_empty() || url.starts_with("file:") || url.starts_with("blob:") {
            return LOCAL_OR_UNKNOWN.to_string();
        }
        self.host(url).unwrap_or_else(|| LOCAL_OR_UNKNOWN.to_string())
    }

    fn host(&self, url: &str) -> Option<String> {
        self.host_re
            .captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn last_path_segment(&self, url: &str) -> Option<String> {
        let mat = self.host_re.find(url)?;
        let rest = &url[mat.end()..];
        // 端口占位（host_re 不吞端口）
        let rest = rest.trim_start_matches(|c: char| c == ':' || c.is_ascii_digit());
        let path = rest.split(['?', '#']).next().unwrap_or("");
        path.rsplit('/')
            .find(|seg| !seg.is_empty())
            .map(|seg| seg.to_string())
    }
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new()
    }
}
