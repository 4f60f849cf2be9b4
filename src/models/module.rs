use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnError, DisplayFromStr, PickFirst, serde_as};
use std::collections::BTreeMap;

use super::lenient_string;

/// 课表时间格式
const TIME_FORMAT: &str = "%H:%M";

/// 某一天的上课时间窗
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DaySchedule {
    /// 开始时间 `HH:MM`
    pub start_time: Option<String>,
    /// 结束时间 `HH:MM`
    pub end_time: Option<String>,
    /// 最短连续在场分钟数（可能以整数、小数或字符串存储，无法解析时视为未配置）
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub attendance_time: Option<f64>,
}

impl DaySchedule {
    /// 解析时间窗，任一端缺失或格式错误时返回 `None`
    pub fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
        let start = NaiveTime::parse_from_str(self.start_time.as_deref()?.trim(), TIME_FORMAT).ok()?;
        let end = NaiveTime::parse_from_str(self.end_time.as_deref()?.trim(), TIME_FORMAT).ok()?;
        Some((start, end))
    }

    /// 最短连续在场时长
    ///
    /// 小数分钟向零截断，未配置或为负数时为 0。
    pub fn min_presence(&self) -> Duration {
        let minutes = self
            .attendance_time
            .filter(|m| m.is_finite())
            .unwrap_or(0.0)
            .trunc()
            .max(0.0);
        Duration::minutes(minutes as i64)
    }
}

/// 课程模块
///
/// 存储于 `/modules/{id}`，同一节点下还挂着按日期的汇总数据，
/// 解析时忽略这些额外字段。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Module {
    /// 模块 ID（存储键，不在文档内）
    #[serde(skip)]
    pub id: String,
    /// 模块名称
    pub name: Option<String>,
    /// 所属年级
    #[serde(deserialize_with = "lenient_string")]
    pub year: Option<String>,
    /// 星期全称 → 原始时间窗，按天惰性解析
    pub schedule: BTreeMap<String, serde_json::Value>,
}

impl Module {
    /// 获取某天的时间窗，格式错误视为当天无课
    pub fn day(&self, day_name: &str) -> Option<DaySchedule> {
        self.schedule
            .get(day_name)
            .and_then(|raw| serde_json::from_value(raw.clone()).ok())
    }

    /// 模块名称，缺省为 "Unknown Module"
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Module")
    }
}
