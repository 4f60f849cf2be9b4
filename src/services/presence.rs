//! 设备在场追踪
//!
//! 记录每个设备从何时起被连续检测到。设备在一次扫描中缺席即被移除，
//! 重新出现时从出现时刻重新计时。

use chrono::{Duration, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};

/// 设备名 → 连续可见起始时间
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    seen_since: BTreeMap<String, NaiveDateTime>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用最新一次扫描结果对账
    ///
    /// 新设备以 `now` 开始计时；缺席的设备被移除；持续在场的设备保留原时间。
    pub fn update(&mut self, detected: &BTreeSet<String>, now: NaiveDateTime) {
        self.seen_since.retain(|device, _| detected.contains(device));
        for device in detected {
            self.seen_since.entry(device.clone()).or_insert(now);
        }
    }

    /// 在标记到场后重新计时
    pub fn reset(&mut self, device: &str, now: NaiveDateTime) {
        self.restore(device, now);
    }

    /// 写入失败后恢复判定前的起始时间，下一轮重新判定
    ///
    /// 设备已不在追踪中时不做任何事。
    pub fn restore(&mut self, device: &str, since: NaiveDateTime) {
        if let Some(current) = self.seen_since.get_mut(device) {
            *current = since;
        }
    }

    /// 连续可见起始时间
    pub fn seen_since(&self, device: &str) -> Option<NaiveDateTime> {
        self.seen_since.get(device).copied()
    }

    /// 已累计的连续在场时长
    pub fn tracked_for(&self, device: &str, now: NaiveDateTime) -> Option<Duration> {
        self.seen_since(device).map(|since| now - since)
    }

    /// 当前追踪的全部设备
    pub fn iter(&self) -> impl Iterator<Item = (&str, NaiveDateTime)> {
        self.seen_since.iter().map(|(d, since)| (d.as_str(), *since))
    }

    pub fn len(&self) -> usize {
        self.seen_since.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen_since.is_empty()
    }
}
