//! 可观测性模块
//!
//! 提供结构化日志初始化和轮询循环的 Prometheus 指标。

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry as TracingRegistry, fmt, prelude::*};

use crate::config::LoggingConfig;
use crate::error::{AppError, Result};

// ===== Structured Logging =====

/// 初始化结构化日志
///
/// `RUST_LOG` 优先于配置中的日志级别。配置了 `log_dir` 时额外按天滚动写入文件，
/// 返回的 guard 需在进程退出前保持存活以刷新缓冲。
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| AppError::Config(format!("invalid log level '{}': {e}", config.level)))?;

    let mut layers: Vec<Box<dyn Layer<TracingRegistry> + Send + Sync>> = Vec::new();

    if config.structured {
        layers.push(fmt::layer().json().with_current_span(true).boxed());
    } else {
        layers.push(fmt::layer().with_target(true).with_line_number(true).boxed());
    }

    let guard = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| AppError::Internal(format!("failed to set tracing subscriber: {e}")))?;

    Ok(guard)
}

// ===== Poll Metrics =====

/// 轮询循环指标
#[derive(Clone)]
pub struct PollMetrics {
    registry: Registry,
    pub cycles_total: IntCounter,
    pub step_failures_total: IntCounterVec,
    pub marks_total: IntCounter,
    pub store_errors_total: IntCounter,
    pub tracked_devices: IntGauge,
    pub recognised_devices: IntGauge,
    pub last_cycle_timestamp_seconds: IntGauge,
    pub cycle_duration_seconds: Histogram,
}

impl PollMetrics {
    /// 创建并注册全部指标
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("rollcall".into()), None)?;

        let cycles_total = IntCounter::new("poll_cycles_total", "Completed poll cycles")?;
        let step_failures_total = IntCounterVec::new(
            Opts::new("poll_step_failures_total", "Failed poll cycle steps"),
            &["step"],
        )?;
        let marks_total = IntCounter::new("attendance_marks_total", "Students marked present")?;
        let store_errors_total =
            IntCounter::new("store_errors_total", "Failed remote store operations")?;
        let tracked_devices = IntGauge::new("tracked_devices", "Devices currently tracked")?;
        let recognised_devices = IntGauge::new(
            "recognised_devices",
            "Tracked devices registered to a student",
        )?;
        let last_cycle_timestamp_seconds = IntGauge::new(
            "last_cycle_timestamp_seconds",
            "Unix time of the last completed poll cycle",
        )?;
        let cycle_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "poll_cycle_duration_seconds",
            "Wall time spent in one poll cycle",
        ))?;

        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(step_failures_total.clone()))?;
        registry.register(Box::new(marks_total.clone()))?;
        registry.register(Box::new(store_errors_total.clone()))?;
        registry.register(Box::new(tracked_devices.clone()))?;
        registry.register(Box::new(recognised_devices.clone()))?;
        registry.register(Box::new(last_cycle_timestamp_seconds.clone()))?;
        registry.register(Box::new(cycle_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            cycles_total,
            step_failures_total,
            marks_total,
            store_errors_total,
            tracked_devices,
            recognised_devices,
            last_cycle_timestamp_seconds,
            cycle_duration_seconds,
        })
    }

    /// 记录步骤失败
    pub fn record_step_failure(&self, step: &str) {
        self.step_failures_total.with_label_values(&[step]).inc();
    }

    /// 生成 Prometheus 文本格式指标
    pub fn gather(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| AppError::Internal(e.to_string()))
    }

    /// 写入 node_exporter textfile collector 文件
    ///
    /// 先写临时文件再重命名，避免采集端读到半个文件。
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let output = self.gather()?;
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, output)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
