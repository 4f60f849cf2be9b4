use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::fmt;

use crate::clock::date_key;
use crate::error::Result;

/// 层级文档存储中的路径
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// 根节点
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// 追加一个子节点
    pub fn child(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// `/students`
    pub fn students() -> Self {
        Self::root().child("students")
    }

    /// `/students/{id}`
    pub fn student(id: &str) -> Self {
        Self::students().child(id)
    }

    /// `/students/{id}/attendance/{date}`
    pub fn attendance(student_id: &str, date: NaiveDate) -> Self {
        Self::student(student_id)
            .child("attendance")
            .child(date_key(date))
    }

    /// `/modules`
    pub fn modules() -> Self {
        Self::root().child("modules")
    }

    /// `/modules/{id}`
    pub fn module(id: &str) -> Self {
        Self::modules().child(id)
    }

    /// `/modules/{id}/{date}`
    pub fn module_day(module_id: &str, date: NaiveDate) -> Self {
        Self::module(module_id).child(date_key(date))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// 远程层级键值文档存储
///
/// - `read` 读取节点，不存在时返回 `None`
/// - `write` 整体替换节点（写入 `null` 删除节点）
/// - `update` 按键合并：只替换 `partial` 中出现的子键，其余子键保持不变
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, path: &StorePath) -> Result<Option<Value>>;

    async fn write(&self, path: &StorePath, document: &Value) -> Result<()>;

    async fn update(&self, path: &StorePath, partial: &Map<String, Value>) -> Result<()>;
}
