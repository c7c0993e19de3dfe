//! 传输速度估算
//!
//! 根据相邻两次字节数采样为每条活跃记录维护一个平滑速率，
//! 再由速率推出剩余时间。平滑用指数加权移动平均而不是瞬时
//! 导数，抑制提供方上报抖动。
//!
//! 采样表按记录 ID 存放，记录离开活跃集合时逐出对应样本，
//! 表的大小由逐出控制，不设容量上限。

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::provider::{DownloadId, DownloadRecord};

/// 最小采样间隔（毫秒），间隔不足时沿用上次平滑值，避免近零除法
pub const MIN_SAMPLE_INTERVAL_MS: i64 = 500;

/// 平滑系数：旧值权重 0.3、新值权重 0.7，偏向快速响应
pub const SMOOTHING_PRIOR_WEIGHT: f64 = 0.3;

/// 全程平均兜底所需的最短运行时间（毫秒）
const LIFETIME_FLOOR_MS: i64 = 1_000;

/// 单条记录的速度采样
#[derive(Debug, Clone, Copy)]
struct SpeedSample {
    /// 上次采样时的已接收字节数
    previous_bytes: u64,
    /// 上次采样时间（Unix 毫秒）
    timestamp_ms: i64,
    /// 平滑后的速率（字节/秒，恒 >= 0）
    smoothed_rate: f64,
}

/// 剩余时间，粗粒度分桶
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eta {
    /// 总大小未知，无法估算
    Unknown,
    Seconds(u64),
    Minutes(u64),
    AboutHours(u64),
}

impl Eta {
    /// 按剩余秒数分桶
    pub fn from_secs(secs: u64) -> Self {
        if secs < 60 {
            Eta::Seconds(secs)
        } else if secs < 3600 {
            Eta::Minutes((secs + 30) / 60)
        } else {
            Eta::AboutHours((secs + 1800) / 3600)
        }
    }

    /// 展示文案（未知时为 None）
    pub fn label(&self) -> Option<String> {
        match self {
            Eta::Unknown => None,
            Eta::Seconds(s) => Some(format!("{} 秒", s)),
            Eta::Minutes(m) => Some(format!("{} 分钟", m)),
            Eta::AboutHours(h) => Some(format!("约 {} 小时", h)),
        }
    }
}

/// 一次估算的输出
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedReading {
    /// 速率（字节/秒）
    pub rate_bps: f64,
    /// 剩余时间
    pub eta: Eta,
}

impl SpeedReading {
    fn unknown() -> Self {
        Self {
            rate_bps: 0.0,
            eta: Eta::Unknown,
        }
    }
}

/// 速度估算器
///
/// 单写者：只被调度器的刷新/轮询回调调用（见并发模型），
/// 因此内部不加锁
#[derive(Debug, Default)]
pub struct SpeedEstimator {
    samples: HashMap<DownloadId, SpeedSample>,
}

impl SpeedEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 估算一条记录的当前速率与剩余时间
    ///
    /// 优先级：提供方预估完成时间 > 采样平滑速率 > 全程平均 > 未知。
    /// `now_ms` 由调用方传入（Unix 毫秒），保证测试可重放。
    pub fn estimate(&mut self, record: &DownloadRecord, now_ms: i64) -> SpeedReading {
        // 1. 提供方给出了预估完成时间且剩余字节已知：直接反推速率
        if let (Some(remaining), Some(est)) = (record.remaining_bytes(), record.estimated_end_time)
        {
            let left_ms = est.timestamp_millis() - now_ms;
            if remaining > 0 && left_ms > 0 {
                let rate = remaining as f64 / (left_ms as f64 / 1000.0);
                return SpeedReading {
                    rate_bps: rate,
                    eta: Eta::from_secs((left_ms / 1000).max(1) as u64),
                };
            }
        }

        // 2. 采样平滑
        let smoothed = self.update_sample(record, now_ms);
        let rate = if smoothed > 0.0 {
            smoothed
        } else if let Some(avg) = Self::lifetime_average(record, now_ms) {
            // 3. 样本还没建立起来，用全程平均兜底
            avg
        } else {
            // 4. 无从估算
            return SpeedReading::unknown();
        };

        let eta = match record.remaining_bytes() {
            Some(remaining) if rate > 0.0 => {
                Eta::from_secs((remaining as f64 / rate).round() as u64)
            }
            _ => Eta::Unknown,
        };
        SpeedReading { rate_bps: rate, eta }
    }

    /// 更新采样并返回当前平滑速率
    fn update_sample(&mut self, record: &DownloadRecord, now_ms: i64) -> f64 {
        match self.samples.get_mut(&record.id) {
            None => {
                self.samples.insert(
                    record.id,
                    SpeedSample {
                        previous_bytes: record.bytes_received,
                        timestamp_ms: now_ms,
                        smoothed_rate: 0.0,
                    },
                );
                0.0
            }
            Some(sample) => {
                let elapsed_ms = now_ms - sample.timestamp_ms;
                if elapsed_ms < MIN_SAMPLE_INTERVAL_MS {
                    // 间隔太短，不更新，沿用上次的平滑值
                    return sample.smoothed_rate;
                }
                let delta = record.bytes_received.saturating_sub(sample.previous_bytes);
                let instant = delta as f64 / (elapsed_ms as f64 / 1000.0);
                sample.smoothed_rate = if sample.smoothed_rate == 0.0 {
                    instant
                } else {
                    sample.smoothed_rate * SMOOTHING_PRIOR_WEIGHT
                        + instant * (1.0 - SMOOTHING_PRIOR_WEIGHT)
                };
                sample.previous_bytes = record.bytes_received;
                sample.timestamp_ms = now_ms;
                sample.smoothed_rate
            }
        }
    }

    /// 全程平均速率（开始时间缺失或运行过短时为 None）
    fn lifetime_average(record: &DownloadRecord, now_ms: i64) -> Option<f64> {
        let start = record.start_time?;
        let elapsed_ms = now_ms - start.timestamp_millis();
        if elapsed_ms < LIFETIME_FLOOR_MS || record.bytes_received == 0 {
            return None;
        }
        Some(record.bytes_received as f64 / (elapsed_ms as f64 / 1000.0))
    }

    /// 逐出单条样本
    pub fn evict(&mut self, id: DownloadId) {
        self.samples.remove(&id);
    }

    /// 只保留仍在活跃集合中的样本
    pub fn retain_ids(&mut self, keep: &HashSet<DownloadId>) {
        let before = self.samples.len();
        self.samples.retain(|id, _| keep.contains(id));
        if self.samples.len() != before {
            debug!("速度样本逐出: {} -> {}", before, self.samples.len());
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}
