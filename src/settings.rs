//! 设置快照
//!
//! 设置的持久化与编辑属于外部协作方（选项页），核心只在
//! 初始化和更新时同步拿到一份只读快照，从不回写。

use serde::{Deserialize, Serialize};

use crate::filter::StatusFilter;

/// 列表长度默认值
pub const DEFAULT_LIST_SIZE: usize = 50;

/// 弹窗设置快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PopupSettings {
    /// 快照查询的最大条数
    pub list_size: usize,
    /// 初始状态筛选
    pub default_status_filter: StatusFilter,
    /// 进度行是否附带已下载字节明细
    pub show_speed_detail: bool,
    /// 移除是否走软删除（可撤销）
    pub undo_enabled: bool,
}

impl Default for PopupSettings {
    fn default() -> Self {
        Self {
            list_size: DEFAULT_LIST_SIZE,
            default_status_filter: StatusFilter::All,
            show_speed_detail: false,
            undo_enabled: true,
        }
    }
}
