use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// 出勤状态字符串中的"到场"
pub const PRESENT_STATUS: &str = "present";

/// 状态字符串中课程名与状态之间的分隔符
const STATUS_SEPARATOR: &str = ": ";

/// 某学生某一天的出勤记录
///
/// 历史数据存在两种编码：早期写入整条字符串 `"<课程名>: present"`，
/// 当前版本按课程 ID 写入映射。读取时两种都接受，写入只使用 `Keyed`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttendanceRecord {
    /// 旧格式：单条字符串
    Legacy(String),
    /// 当前格式：课程 ID → 状态字符串
    Keyed(BTreeMap<String, String>),
}

impl AttendanceRecord {
    /// 从存储中的原始值解析
    ///
    /// 映射中非字符串的值被忽略；无法识别的值返回 `None`。
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Legacy(s.clone())),
            Value::Object(map) => Some(Self::Keyed(
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect(),
            )),
            _ => None,
        }
    }

    /// 记录中的全部状态字符串
    pub fn statuses(&self) -> Vec<&str> {
        match self {
            Self::Legacy(s) => vec![s.as_str()],
            Self::Keyed(map) => map.values().map(String::as_str).collect(),
        }
    }

    /// 记录中标记为到场的课程名
    ///
    /// 缺少分隔符的状态字符串被静默跳过。
    pub fn present_module_names(&self) -> Vec<&str> {
        self.statuses()
            .into_iter()
            .filter_map(parse_status)
            .filter(|(_, status)| status.trim() == PRESENT_STATUS)
            .map(|(name, _)| name)
            .collect()
    }
}

/// 在第一个 `": "` 处拆分状态字符串为 (课程名, 状态)
pub fn parse_status(raw: &str) -> Option<(&str, &str)> {
    raw.split_once(STATUS_SEPARATOR)
}

/// 旧格式记录无法对应到课程时使用的键
pub const LEGACY_KEY: &str = "legacy";

/// 生成到场状态字符串
pub fn present_status(module_name: &str) -> String {
    format!("{module_name}{STATUS_SEPARATOR}{PRESENT_STATUS}")
}

/// 出勤判定输出：某学生应在某日被记为某课程到场
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkingEvent {
    /// 触发判定的设备名
    pub device_name: String,
    /// 学生 ID
    pub student_id: String,
    /// 课程模块 ID
    pub module_id: String,
    /// 出勤日期
    pub date: NaiveDate,
    /// 判定前设备的连续可见起始时间，写入失败时据此恢复计时
    pub seen_since: NaiveDateTime,
}
