use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

use crate::error::{AppError, Result};
use crate::models::attendance::present_status;
use crate::models::{AttendanceRecord, Module, ModuleDayTotals, Student};
use crate::storage::store::{DocumentStore, StorePath};

/// 将 `{id: document}` 形式的集合解析为实体列表（按 ID 排序）
///
/// 单个条目格式错误时记录告警并跳过，不影响其余条目。
fn decode_collection<T, F>(collection: &str, value: Option<Value>, mut assign_id: F) -> Vec<T>
where
    T: DeserializeOwned,
    F: FnMut(&mut T, String),
{
    let Some(Value::Object(entries)) = value else {
        return Vec::new();
    };

    let mut entries: Vec<(String, Value)> = entries.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    entries
        .into_iter()
        .filter(|(_, raw)| !raw.is_null())
        .filter_map(|(id, raw)| match serde_json::from_value::<T>(raw) {
            Ok(mut entity) => {
                assign_id(&mut entity, id);
                Some(entity)
            }
            Err(e) => {
                warn!(collection, id = %id, error = %e, "Skipping malformed entry");
                None
            }
        })
        .collect()
}

fn to_partial<T: serde::Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(AppError::Serialization(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// 学生仓储
#[derive(Clone)]
pub struct StudentRepository {
    store: Arc<dyn DocumentStore>,
}

impl StudentRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// 列出所有学生
    pub async fn list(&self) -> Result<Vec<Student>> {
        let value = self.store.read(&StorePath::students()).await?;
        Ok(decode_collection("students", value, |s: &mut Student, id| {
            s.id = id
        }))
    }

    /// 读取学生某日的出勤记录
    pub async fn attendance_on(
        &self,
        student_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        let value = self
            .store
            .read(&StorePath::attendance(student_id, date))
            .await?;
        Ok(value.as_ref().and_then(AttendanceRecord::from_value))
    }

    /// 用按课程 ID 的映射整体替换某日出勤记录
    pub async fn replace_attendance(
        &self,
        student_id: &str,
        date: NaiveDate,
        entries: Map<String, Value>,
    ) -> Result<()> {
        self.store
            .write(&StorePath::attendance(student_id, date), &Value::Object(entries))
            .await
    }

    /// 在某日出勤记录中写入一门课程的到场状态
    ///
    /// 只合并 `module_id` 这一个键，同日其他课程的记录保持不变。
    pub async fn mark_present(
        &self,
        student_id: &str,
        date: NaiveDate,
        module_id: &str,
        module_name: &str,
    ) -> Result<()> {
        let path = StorePath::attendance(student_id, date);
        let mut partial = Map::new();
        partial.insert(
            module_id.to_string(),
            Value::String(present_status(module_name)),
        );
        self.store.update(&path, &partial).await
    }
}

/// 课程模块仓储
#[derive(Clone)]
pub struct ModuleRepository {
    store: Arc<dyn DocumentStore>,
}

impl ModuleRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// 列出所有课程模块（按 ID 排序）
    pub async fn list(&self) -> Result<Vec<Module>> {
        let value = self.store.read(&StorePath::modules()).await?;
        Ok(decode_collection("modules", value, |m: &mut Module, id| {
            m.id = id
        }))
    }

    /// 根据 ID 获取课程模块
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Module>> {
        let Some(value) = self.store.read(&StorePath::module(id)).await? else {
            return Ok(None);
        };
        let mut module: Module = serde_json::from_value(value)?;
        module.id = id.to_string();
        Ok(Some(module))
    }

    /// 合并写入某日汇总数据
    pub async fn update_day_totals(
        &self,
        module_id: &str,
        date: NaiveDate,
        totals: &ModuleDayTotals,
    ) -> Result<()> {
        let partial = to_partial(totals)?;
        if partial.is_empty() {
            return Ok(());
        }
        self.store
            .update(&StorePath::module_day(module_id, date), &partial)
            .await
    }
}
