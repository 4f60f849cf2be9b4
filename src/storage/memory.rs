//! 进程内文档存储
//!
//! 与 REST 后端具有相同的读/替换/合并语义，用于离线演练和测试。

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::storage::store::{DocumentStore, StorePath};

/// 内存文档树
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    root: Arc<RwLock<Value>>,
}

impl MemoryStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self {
            root: Arc::new(RwLock::new(Value::Object(Map::new()))),
        }
    }

    /// 以给定文档作为根节点创建存储
    pub fn with_document(document: Value) -> Self {
        Self {
            root: Arc::new(RwLock::new(document)),
        }
    }

    /// 从 JSON 文件加载初始数据
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Io(format!("{}: {e}", path.display())))?;
        let document: Value = serde_json::from_str(&raw)?;
        Ok(Self::with_document(document))
    }

    /// 整棵树的快照
    pub fn snapshot(&self) -> Value {
        self.root.read().clone()
    }
}

fn lookup<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| node.get(segment.as_str()))
}

/// 沿路径获取节点，缺失或非对象的中间节点替换为空对象
fn node_mut<'a>(root: &'a mut Value, path: &StorePath) -> &'a mut Value {
    path.segments().iter().fold(root, |node, segment| {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        match node {
            Value::Object(map) => map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => unreachable!("node was just replaced with an object"),
        }
    })
}

fn remove(root: &mut Value, path: &StorePath) {
    let Some((last, parents)) = path.segments().split_last() else {
        *root = Value::Object(Map::new());
        return;
    };
    let parent = parents
        .iter()
        .try_fold(root, |node, segment| node.get_mut(segment.as_str()));
    if let Some(Value::Object(map)) = parent {
        map.remove(last);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self, path: &StorePath) -> Result<Option<Value>> {
        let root = self.root.read();
        Ok(lookup(&root, path).filter(|v| !v.is_null()).cloned())
    }

    async fn write(&self, path: &StorePath, document: &Value) -> Result<()> {
        let mut root = self.root.write();
        if document.is_null() {
            remove(&mut root, path);
        } else {
            *node_mut(&mut root, path) = document.clone();
        }
        Ok(())
    }

    async fn update(&self, path: &StorePath, partial: &Map<String, Value>) -> Result<()> {
        let mut root = self.root.write();
        let node = node_mut(&mut root, path);
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        if let Value::Object(map) = node {
            for (key, value) in partial {
                if value.is_null() {
                    map.remove(key);
                } else {
                    map.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn partial(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let store = MemoryStore::new();
        assert!(store.read(&StorePath::students()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_replaces_node() {
        let store = MemoryStore::new();
        let path = StorePath::module("m1");
        store.write(&path, &json!({ "name": "Algebra", "year": "Year2" })).await.unwrap();
        store.write(&path, &json!({ "name": "Physics" })).await.unwrap();
        assert_eq!(
            store.read(&path).await.unwrap(),
            Some(json!({ "name": "Physics" }))
        );
    }

    #[tokio::test]
    async fn test_update_merges_keys() {
        let store = MemoryStore::new();
        let path = StorePath::module("m1");
        store.write(&path, &json!({ "name": "Algebra", "year": "Year2" })).await.unwrap();
        store.update(&path, &partial(json!({ "year": "Year3", "room": "B12" }))).await.unwrap();
        assert_eq!(
            store.read(&path).await.unwrap(),
            Some(json!({ "name": "Algebra", "year": "Year3", "room": "B12" }))
        );
    }

    #[tokio::test]
    async fn test_update_creates_intermediate_nodes() {
        let store = MemoryStore::new();
        let path = StorePath::root().child("students").child("s1").child("attendance");
        store.update(&path, &partial(json!({ "2024-03-04": "Algebra: present" }))).await.unwrap();
        assert_eq!(
            store.snapshot(),
            json!({ "students": { "s1": { "attendance": { "2024-03-04": "Algebra: present" } } } })
        );
    }

    #[tokio::test]
    async fn test_update_replaces_legacy_string_node() {
        let store = MemoryStore::with_document(json!({
            "students": { "s1": { "attendance": { "2024-03-04": "Algebra: present" } } }
        }));
        let path = StorePath::root()
            .child("students")
            .child("s1")
            .child("attendance")
            .child("2024-03-04");
        store.update(&path, &partial(json!({ "m2": "Physics: present" }))).await.unwrap();
        assert_eq!(
            store.read(&path).await.unwrap(),
            Some(json!({ "m2": "Physics: present" }))
        );
    }

    #[tokio::test]
    async fn test_null_deletes() {
        let store = MemoryStore::with_document(json!({ "modules": { "m1": { "name": "A", "year": "Y" } } }));
        store.update(&StorePath::module("m1"), &partial(json!({ "year": null }))).await.unwrap();
        assert_eq!(
            store.read(&StorePath::module("m1")).await.unwrap(),
            Some(json!({ "name": "A" }))
        );
        store.write(&StorePath::module("m1"), &Value::Null).await.unwrap();
        assert!(store.read(&StorePath::module("m1")).await.unwrap().is_none());
    }

    #[test]
    fn test_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{ "modules": { "m1": { "name": "Algebra" } } }"#).unwrap();
        let store = MemoryStore::from_file(file.path()).unwrap();
        assert_eq!(store.snapshot()["modules"]["m1"]["name"], "Algebra");
    }
}
