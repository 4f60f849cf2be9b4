//! 设备扫描模块
//!
//! 枚举主机蓝牙栈中已配对的设备名。扫描失败不向上传播，
//! 而是记录日志并返回空集合。

pub mod bluetoothctl;
pub mod list;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::{ScannerBackend, ScannerConfig};

pub use bluetoothctl::BluetoothctlScanner;
pub use list::ListScanner;

/// 已配对设备枚举
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceScanner: Send + Sync {
    /// 当前可见的已配对设备名；失败时为空集合
    async fn list_paired_device_names(&self) -> BTreeSet<String>;
}

/// 根据配置创建扫描器
pub fn create_scanner(config: &ScannerConfig) -> Arc<dyn DeviceScanner> {
    match config.backend {
        ScannerBackend::Bluetoothctl => Arc::new(BluetoothctlScanner::new(config)),
        ScannerBackend::Static => Arc::new(ListScanner::new(config.static_devices.clone())),
    }
}
