//! 存储层模块
//!
//! 提供远程文档存储访问，支持 Firebase 风格的 REST 后端和进程内存储。

pub mod factory;
pub mod memory;
pub mod repository;
pub mod rest;
pub mod store;

pub use factory::StorageFactory;
pub use memory::MemoryStore;
pub use repository::{ModuleRepository, StudentRepository};
pub use rest::RestStore;
pub use store::{DocumentStore, StorePath};
