use serde::{Deserialize, Serialize};

/// 课程模块某日的汇总数据，存储于 `/modules/{id}/{date}`
///
/// 两个计数由不同的汇总器各自写入，`None` 字段不会被序列化，
/// 因此可直接作为合并更新的局部文档。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDayTotals {
    /// 到场人数
    #[serde(rename = "totalStudentsPresent", skip_serializing_if = "Option::is_none")]
    pub total_present: Option<u64>,
    /// 应到人数（同年级注册人数）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_students: Option<u64>,
}

impl ModuleDayTotals {
    pub fn present(count: u64) -> Self {
        Self {
            total_present: Some(count),
            total_students: None,
        }
    }

    pub fn enrolled(count: u64) -> Self {
        Self {
            total_present: None,
            total_students: Some(count),
        }
    }
}
