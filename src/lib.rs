// Download Mirror Rust Library
// 下载列表镜像引擎核心库
//
// 弹窗列表的同步引擎：对外部提供方拥有的下载集合做只读镜像，
// 在部分变更事件 + 轮询的混合通知下保持同步，并在其上叠加
// 筛选/搜索视图、可撤销的软删除和逐条的速度估算。
// 实际的 DOM/UI 构建是宿主侧的薄适配层，这里只产出视图模型。

// 提供方适配层
pub mod provider;

// 设置快照
pub mod settings;

// 错误分类
pub mod error;

// 速度估算
pub mod speed;

// 筛选与搜索管线
pub mod filter;

// 视图模型与渲染决策
pub mod view;

// 软删除与撤销队列
pub mod undo;

// 刷新调度器
pub mod scheduler;

// 导出常用类型
pub use error::MirrorError;
pub use filter::{FileCategory, FilterPipeline, FilterState, StatusFilter};
pub use provider::{
    ChangedField, DownloadDelta, DownloadId, DownloadProvider, DownloadRecord, DownloadRequest,
    DownloadState, ProviderError, SearchQuery,
};
pub use scheduler::{
    BatchCreateReport, NoticeLevel, RefreshScheduler, SchedulerChannels, SchedulerConfig, UiNotice,
};
pub use settings::PopupSettings;
pub use speed::{Eta, SpeedEstimator, SpeedReading};
pub use undo::{PendingDeleteEvent, PendingDeleteQueue};
pub use view::{
    snapshot_signature, CardAction, DownloadCard, ProgressPatch, RenderPlan, Signature, ViewState,
};
