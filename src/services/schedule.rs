//! 课表解析
//!
//! 根据年级和当前时刻查找正在进行的课程。

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};

use crate::clock::weekday_name;
use crate::models::Module;

/// 正在进行的课程
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    /// 课程模块 ID
    pub module_id: String,
    /// 最短连续在场时长
    pub min_presence: Duration,
    /// 当天结束时间
    pub ends_at: NaiveTime,
}

/// 课表解析器
///
/// 持有一次轮询中读取的课程快照，按模块 ID 顺序匹配。
#[derive(Debug, Clone, Default)]
pub struct ScheduleResolver {
    modules: Vec<Module>,
}

impl ScheduleResolver {
    pub fn new(modules: Vec<Module>) -> Self {
        Self { modules }
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// 查找年级 `cohort` 在 `now` 时刻正在进行的课程
    ///
    /// 时间窗两端均包含在内。同一年级的课表若有重叠，返回第一个匹配项。
    /// 当天缺失或格式错误的时间窗视为无课。
    pub fn resolve(&self, cohort: &str, now: NaiveDateTime) -> Option<ActiveSession> {
        let day_name = weekday_name(now.weekday());
        let time = now.time();

        self.modules
            .iter()
            .filter(|module| module.year.as_deref() == Some(cohort))
            .find_map(|module| {
                let day = module.day(day_name)?;
                let (start, end) = day.window()?;
                (start <= time && time <= end).then(|| ActiveSession {
                    module_id: module.id.clone(),
                    min_presence: day.min_presence(),
                    ends_at: end,
                })
            })
    }
}
