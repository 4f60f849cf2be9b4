use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;

use crate::scanner::DeviceScanner;

/// 返回给定设备列表的扫描器
///
/// 用于没有蓝牙硬件的演练环境；列表可在运行中替换。
#[derive(Debug, Default)]
pub struct ListScanner {
    devices: Mutex<BTreeSet<String>>,
}

impl ListScanner {
    pub fn new<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            devices: Mutex::new(devices.into_iter().map(Into::into).collect()),
        }
    }

    /// 替换当前可见的设备
    pub fn replace<I, S>(&self, devices: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.devices.lock() = devices.into_iter().map(Into::into).collect();
    }
}

#[async_trait]
impl DeviceScanner for ListScanner {
    async fn list_paired_device_names(&self) -> BTreeSet<String> {
        self.devices.lock().clone()
    }
}
