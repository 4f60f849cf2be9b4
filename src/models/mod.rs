//! 数据模型模块
//!
//! 远程存储中学生、课程模块与出勤记录的数据结构。

pub mod attendance;
pub mod module;
pub mod student;
pub mod totals;

pub use attendance::{AttendanceRecord, LEGACY_KEY, MarkingEvent, PRESENT_STATUS};
pub use module::{DaySchedule, Module};
pub use student::{Roster, RosterEntry, Student};
pub use totals::ModuleDayTotals;

use serde::{Deserialize, Deserializer};

/// 接受字符串或数字的可选字段（年级等字段在不同客户端写入时类型不一）
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
