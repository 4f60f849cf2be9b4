//! 错误处理模块
//!
//! 定义应用程序的错误类型和错误处理逻辑。

use thiserror::Error;

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 远程存储错误
    #[error("存储错误: {0}")]
    Store(String),

    /// 连接错误
    #[error("连接错误: {0}")]
    Connection(String),

    /// 远程存储返回的非成功状态
    #[error("存储返回状态 {status}: {message}")]
    Status { status: u16, message: String },

    /// 超时错误
    #[error("操作超时: {0}")]
    Timeout(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// 设备扫描错误
    #[error("设备扫描失败: {0}")]
    Scanner(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(String),
}

impl AppError {
    /// 是否为可重试的瞬时错误
    ///
    /// 连接失败、超时、限流 (429) 与服务端 5xx 视为瞬时错误。
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Connection(_) | AppError::Timeout(_) => true,
            AppError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            AppError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            AppError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            AppError::Serialization(e.to_string())
        } else {
            AppError::Store(e.to_string())
        }
    }
}

impl From<prometheus::Error> for AppError {
    fn from(e: prometheus::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AppError::Connection("refused".into()), true)]
    #[case(AppError::Timeout("10s".into()), true)]
    #[case(AppError::Status { status: 503, message: "unavailable".into() }, true)]
    #[case(AppError::Status { status: 429, message: "slow down".into() }, true)]
    #[case(AppError::Status { status: 401, message: "denied".into() }, false)]
    #[case(AppError::Serialization("bad json".into()), false)]
    #[case(AppError::Scanner("bluetoothctl missing".into()), false)]
    fn test_transient_classification(#[case] error: AppError, #[case] expected: bool) {
        assert_eq!(error.is_transient(), expected);
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AppError = io.into();
        assert!(matches!(err, AppError::Io(_)));
        assert!(err.to_string().contains("missing"));
    }
}
