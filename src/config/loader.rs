use crate::config::config::{AppConfig, ScannerBackend, StoreBackend};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use std::path::{Path, PathBuf};

/// 环境变量前缀
const ENV_PREFIX: &str = "ROLLCALL_";

/// 选择预设的环境变量
const ENVIRONMENT_VAR: &str = "ROLLCALL_ENVIRONMENT";

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 合并顺序（后者覆盖前者）：
    /// 1. `ROLLCALL_ENVIRONMENT` 选择的预设（development / production / 默认）
    /// 2. ./rollcall.yaml
    /// 3. 环境变量 `ROLLCALL_*`，嵌套字段使用 `__` 分隔
    pub fn load() -> Result<AppConfig, figment::Error> {
        Self::figment(&default_config_path()).extract()
    }

    /// 从指定路径加载配置
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    fn figment(path: &Path) -> Figment {
        let environment = std::env::var(ENVIRONMENT_VAR).unwrap_or_default();
        Self::figment_with(path, AppConfig::for_environment(&environment))
    }

    fn figment_with(path: &Path, preset: AppConfig) -> Figment {
        Figment::from(Serialized::defaults(preset))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.poll.interval_secs == 0 {
            return Err(ConfigValidationError::InvalidInterval);
        }

        if config.poll.step_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidStepTimeout);
        }

        if config.store.backend == StoreBackend::Rest && config.store.base_url.trim().is_empty() {
            return Err(ConfigValidationError::MissingStoreUrl);
        }

        if config.scanner.backend == ScannerBackend::Bluetoothctl
            && config.scanner.command.trim().is_empty()
        {
            return Err(ConfigValidationError::MissingScannerCommand);
        }

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("轮询间隔无效，必须大于 0")]
    InvalidInterval,

    #[error("步骤超时无效，必须大于 0")]
    InvalidStepTimeout,

    #[error("REST 存储地址 base_url 未配置")]
    MissingStoreUrl,

    #[error("扫描命令未配置")]
    MissingScannerCommand,
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("rollcall.yaml")
}
