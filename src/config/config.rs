use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 远程存储后端类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Firebase 风格的 REST 文档存储
    #[default]
    Rest,
    /// 进程内存储（演练/测试）
    Memory,
}

/// 远程存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 后端类型
    pub backend: StoreBackend,
    /// 数据库根地址，例如 https://example-default-rtdb.firebaseio.com
    pub base_url: String,
    /// 访问令牌（作为 `auth` 查询参数附加）
    pub auth_token: Option<String>,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    /// 瞬时错误最大重试次数
    pub max_retries: u32,
    /// 首次重试退避（毫秒），之后按 2 倍增长
    pub retry_backoff_ms: u64,
    /// 内存后端的初始数据（JSON 文件）
    pub seed_file: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Rest,
            base_url: String::new(),
            auth_token: None,
            request_timeout_secs: 10,
            max_retries: 3,
            retry_backoff_ms: 500,
            seed_file: None,
        }
    }
}

/// 设备扫描后端类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScannerBackend {
    /// 调用 `bluetoothctl` 列出已配对设备
    #[default]
    Bluetoothctl,
    /// 固定设备列表
    Static,
}

/// 设备扫描配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// 后端类型
    pub backend: ScannerBackend,
    /// 扫描命令
    pub command: String,
    /// 命令参数
    pub args: Vec<String>,
    /// 命令超时（秒）
    pub timeout_secs: u64,
    /// static 后端返回的设备名
    pub static_devices: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            backend: ScannerBackend::Bluetoothctl,
            command: "bluetoothctl".into(),
            args: vec!["paired-devices".into()],
            timeout_secs: 15,
            static_devices: Vec::new(),
        }
    }
}

/// 轮询配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// 两次轮询开始之间的间隔（秒）
    pub interval_secs: u64,
    /// 单个步骤（扫描、读取、写入）的整体超时（秒）
    pub step_timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            step_timeout_secs: 45,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录
    pub log_dir: Option<PathBuf>,
    /// 日志文件名前缀
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            structured: false,
            log_dir: None,
            file_prefix: "rollcall.log".into(),
        }
    }
}

/// 指标配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MetricsConfig {
    /// 是否启用指标
    pub enabled: bool,
    /// node_exporter textfile 输出路径
    pub textfile_path: Option<PathBuf>,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 远程存储配置
    pub store: StoreConfig,
    /// 设备扫描配置
    pub scanner: ScannerConfig,
    /// 轮询配置
    pub poll: PollConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 指标配置
    pub metrics: MetricsConfig,
    /// 应用名称
    pub app_name: String,
    /// 环境
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            scanner: ScannerConfig::default(),
            poll: PollConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            app_name: "rollcall".into(),
            environment: "production".into(),
        }
    }
}

impl AppConfig {
    /// 创建开发环境配置
    ///
    /// 使用内存存储和固定设备列表，不依赖蓝牙硬件。
    pub fn development() -> Self {
        Self {
            store: StoreConfig {
                backend: StoreBackend::Memory,
                ..StoreConfig::default()
            },
            scanner: ScannerConfig {
                backend: ScannerBackend::Static,
                ..ScannerConfig::default()
            },
            poll: PollConfig {
                interval_secs: 10,
                step_timeout_secs: 5,
            },
            logging: LoggingConfig {
                level: "debug".into(),
                ..LoggingConfig::default()
            },
            metrics: MetricsConfig::default(),
            app_name: "rollcall".into(),
            environment: "development".into(),
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.structured = true;
        config.logging.log_dir = Some(PathBuf::from("/var/log/rollcall"));
        config.metrics.enabled = true;
        config
    }

    /// 按环境名选择预设，未知环境使用默认值
    pub fn for_environment(environment: &str) -> Self {
        match environment.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Self::development(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        }
    }
}
