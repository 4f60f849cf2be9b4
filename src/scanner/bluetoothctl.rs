//! 通过 `bluetoothctl` 列出已配对设备
//!
//! 输出中每个设备一行：
//! ```text
//! Device AA:BB:CC:DD:EE:FF Pixel 7
//! ```
//! 设备名可以包含空格，取 MAC 地址之后的全部内容。

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ScannerConfig;
use crate::error::{AppError, Result};
use crate::scanner::DeviceScanner;

static DEVICE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Device\s+(?:[0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}\s+(.+?)\s*$")
        .expect("device line pattern is valid")
});

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("ansi pattern is valid"));

/// 解析 `bluetoothctl paired-devices` 的输出
pub fn parse_paired_devices(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .map(|line| ANSI_ESCAPE.replace_all(line, ""))
        .filter_map(|line| {
            DEVICE_LINE
                .captures(&line)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// 调用外部 `bluetoothctl` 的扫描器
#[derive(Debug, Clone)]
pub struct BluetoothctlScanner {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl BluetoothctlScanner {
    pub fn new(config: &ScannerConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    /// 运行命令并解析输出
    pub async fn try_scan(&self) -> Result<BTreeSet<String>> {
        let child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "`{} {}` did not finish within {:?}",
                    self.command,
                    self.args.join(" "),
                    self.timeout
                ))
            })?
            .map_err(|e| {
                AppError::Scanner(format!("failed to run `{}`: {e}", self.command))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Scanner(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        Ok(parse_paired_devices(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[async_trait]
impl DeviceScanner for BluetoothctlScanner {
    async fn list_paired_device_names(&self) -> BTreeSet<String> {
        match self.try_scan().await {
            Ok(devices) => {
                debug!(count = devices.len(), ?devices, "Paired devices listed");
                devices
            }
            Err(e) => {
                warn!(error = %e, "Device scan failed, treating as no devices");
                BTreeSet::new()
            }
        }
    }
}
