//! 存储工厂模块
//!
//! 根据配置创建相应的文档存储实例。

use std::sync::Arc;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;
use crate::storage::memory::MemoryStore;
use crate::storage::rest::RestStore;
use crate::storage::store::{DocumentStore, StorePath};

/// 存储工厂
pub struct StorageFactory;

impl StorageFactory {
    /// 根据配置创建存储实例
    pub fn create(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
        match config.backend {
            StoreBackend::Rest => {
                info!(base_url = %config.base_url, "Using REST document store");
                Ok(Arc::new(RestStore::new(config)?))
            }
            StoreBackend::Memory => {
                let store = match &config.seed_file {
                    Some(path) => {
                        info!(seed = %path.display(), "Using in-memory store with seed data");
                        MemoryStore::from_file(path)?
                    }
                    None => {
                        info!("Using empty in-memory store");
                        MemoryStore::new()
                    }
                };
                Ok(Arc::new(store))
            }
        }
    }

    /// 检查存储是否可用
    pub async fn health_check(store: &dyn DocumentStore) -> Result<bool> {
        store.read(&StorePath::modules()).await.map(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_is_healthy() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        let store = StorageFactory::create(&config).unwrap();
        assert!(StorageFactory::health_check(store.as_ref()).await.unwrap());
    }

    #[test]
    fn test_rest_backend_requires_url() {
        assert!(StorageFactory::create(&StoreConfig::default()).is_err());
    }
}
