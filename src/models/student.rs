use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use super::attendance::AttendanceRecord;
use super::lenient_string;
use crate::clock::date_key;

/// 学生
///
/// 存储于 `/students/{id}`，由移动端应用注册并维护。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Student {
    /// 学生 ID（存储键，不在文档内）
    #[serde(skip)]
    pub id: String,
    /// 注册的蓝牙设备名
    pub device_name: Option<String>,
    /// 所属年级
    #[serde(deserialize_with = "lenient_string")]
    pub course_year: Option<String>,
    /// 日期 → 原始出勤记录
    pub attendance: BTreeMap<String, serde_json::Value>,
}

impl Student {
    /// 某日的出勤记录
    pub fn attendance_on(&self, date: NaiveDate) -> Option<AttendanceRecord> {
        self.attendance
            .get(&date_key(date))
            .and_then(AttendanceRecord::from_value)
    }
}

/// 花名册条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub student_id: String,
    pub cohort: Option<String>,
}

/// 设备名 → 学生的查找表
#[derive(Debug, Clone, Default)]
pub struct Roster {
    by_device: HashMap<String, RosterEntry>,
}

impl Roster {
    /// 从学生列表构建
    ///
    /// 多名学生登记同一设备名时保留第一个（按学生 ID 排序），其余记录告警。
    pub fn from_students(students: &[Student]) -> Self {
        let mut by_device: HashMap<String, RosterEntry> = HashMap::new();
        for student in students {
            let Some(device) = student.device_name.as_deref().filter(|d| !d.is_empty()) else {
                continue;
            };
            if let Some(existing) = by_device.get(device) {
                warn!(
                    device = %device,
                    kept = %existing.student_id,
                    ignored = %student.id,
                    "Device name registered by more than one student"
                );
                continue;
            }
            by_device.insert(
                device.to_string(),
                RosterEntry {
                    student_id: student.id.clone(),
                    cohort: student.course_year.clone(),
                },
            );
        }
        Self { by_device }
    }

    pub fn lookup(&self, device_name: &str) -> Option<&RosterEntry> {
        self.by_device.get(device_name)
    }

    pub fn len(&self) -> usize {
        self.by_device.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_device.is_empty()
    }
}
