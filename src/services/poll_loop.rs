//! 轮询循环
//!
//! 每个周期依次执行：扫描 → 在场追踪 → 读取学生与课程 → 判定 → 写入标记 →
//! 汇总到场人数 → 汇总应到人数。单个步骤失败只记录日志和指标，
//! 与之无关的后续步骤照常执行。日期每个周期从时钟重新读取。

use chrono::{NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::PollConfig;
use crate::error::{AppError, Result};
use crate::models::{MarkingEvent, Roster};
use crate::observability::PollMetrics;
use crate::scanner::DeviceScanner;
use crate::services::aggregation::{AggregationService, create_aggregation_service};
use crate::services::decision::{AttendanceRecorder, RecordOutcome, evaluate};
use crate::services::presence::PresenceTracker;
use crate::services::schedule::ScheduleResolver;
use crate::storage::{DocumentStore, ModuleRepository, StudentRepository};

/// 周期内的步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    Scan,
    LoadRoster,
    LoadModules,
    Record,
    AggregatePresent,
    AggregateEnrolled,
}

impl CycleStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStep::Scan => "scan",
            CycleStep::LoadRoster => "load_roster",
            CycleStep::LoadModules => "load_modules",
            CycleStep::Record => "record",
            CycleStep::AggregatePresent => "aggregate_present",
            CycleStep::AggregateEnrolled => "aggregate_enrolled",
        }
    }

    /// 是否为远程存储操作
    fn touches_store(&self) -> bool {
        !matches!(self, CycleStep::Scan)
    }
}

/// 单个周期的执行结果
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: NaiveDateTime,
    /// 本周期扫描到的设备数
    pub detected: usize,
    /// 追踪中的设备数
    pub tracked: usize,
    /// 追踪中且已登记到学生的设备数
    pub recognised: usize,
    /// 本周期产生的到场标记
    pub marks: Vec<MarkingEvent>,
    pub recorded: RecordOutcome,
    /// 课程 ID → 到场人数；步骤失败时为 None
    pub present: Option<BTreeMap<String, u64>>,
    /// 课程 ID → 应到人数；步骤失败时为 None
    pub enrolled: Option<BTreeMap<String, u64>>,
    pub failed_steps: Vec<CycleStep>,
}

impl CycleReport {
    fn new(started_at: NaiveDateTime) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at,
            detected: 0,
            tracked: 0,
            recognised: 0,
            marks: Vec::new(),
            recorded: RecordOutcome::default(),
            present: None,
            enrolled: None,
            failed_steps: Vec::new(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.started_at.date()
    }

    /// 所有步骤均成功
    pub fn is_clean(&self) -> bool {
        self.failed_steps.is_empty()
    }
}

/// 考勤轮询循环
pub struct PollLoop {
    scanner: Arc<dyn DeviceScanner>,
    clock: Arc<dyn Clock>,
    students: StudentRepository,
    modules: ModuleRepository,
    recorder: AttendanceRecorder,
    aggregation: Box<dyn AggregationService>,
    tracker: PresenceTracker,
    config: PollConfig,
    metrics: Option<PollMetrics>,
    textfile_path: Option<PathBuf>,
}

impl PollLoop {
    pub fn new(
        scanner: Arc<dyn DeviceScanner>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn DocumentStore>,
        config: PollConfig,
    ) -> Self {
        let students = StudentRepository::new(store.clone());
        let modules = ModuleRepository::new(store);
        Self {
            scanner,
            clock,
            recorder: AttendanceRecorder::new(students.clone(), modules.clone()),
            aggregation: create_aggregation_service(students.clone(), modules.clone()),
            students,
            modules,
            tracker: PresenceTracker::new(),
            config,
            metrics: None,
            textfile_path: None,
        }
    }

    /// 启用指标，`textfile_path` 存在时每个周期结束后写出指标文件
    pub fn with_metrics(mut self, metrics: PollMetrics, textfile_path: Option<PathBuf>) -> Self {
        self.metrics = Some(metrics);
        self.textfile_path = textfile_path;
        self
    }

    pub fn tracker(&self) -> &PresenceTracker {
        &self.tracker
    }

    fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.config.step_timeout_secs)
    }

    /// 按间隔执行周期，直到 `cancel` 被触发
    ///
    /// 取消时正在执行的周期被放弃，已写入的数据保持原样。
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.config.interval_secs, "Poll loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel.cancelled() => break,
            }

            tokio::select! {
                report = self.run_cycle() => {
                    if !report.is_clean() {
                        warn!(
                            cycle = %report.cycle_id,
                            failed = ?report.failed_steps.iter().map(CycleStep::as_str).collect::<Vec<_>>(),
                            "Poll cycle finished with failures"
                        );
                    }
                }
                _ = cancel.cancelled() => {
                    warn!("Poll cycle interrupted by shutdown");
                    break;
                }
            }
        }

        info!("Poll loop stopped");
    }

    /// 执行一个完整周期
    pub async fn run_cycle(&mut self) -> CycleReport {
        let report = CycleReport::new(self.clock.now());
        let span = info_span!("poll_cycle", cycle = %report.cycle_id, date = %report.date());
        self.cycle(report).instrument(span).await
    }

    async fn cycle(&mut self, mut report: CycleReport) -> CycleReport {
        let timer = Instant::now();
        let now = report.started_at;

        // 扫描失败时视为无设备在场
        let scanner = self.scanner.clone();
        let detected = self
            .bounded(&mut report, CycleStep::Scan, async move {
                Ok::<_, AppError>(scanner.list_paired_device_names().await)
            })
            .await
            .unwrap_or_default();
        report.detected = detected.len();

        self.tracker.update(&detected, now);
        report.tracked = self.tracker.len();

        let students = self.students.clone();
        let roster = self
            .bounded(&mut report, CycleStep::LoadRoster, async move {
                students.list().await.map(|s| Roster::from_students(&s))
            })
            .await;

        let modules = self.modules.clone();
        let schedule = self
            .bounded(&mut report, CycleStep::LoadModules, async move {
                modules.list().await.map(ScheduleResolver::new)
            })
            .await;

        if let Some(roster) = &roster {
            report.recognised = self
                .tracker
                .iter()
                .filter(|(device, _)| roster.lookup(device).is_some())
                .count();
        }

        if let (Some(roster), Some(schedule)) = (&roster, &schedule) {
            report.marks = evaluate(&mut self.tracker, roster, schedule, now);
        }

        if !report.marks.is_empty() {
            let recorder = self.recorder.clone();
            let marks = report.marks.clone();
            let outcome = self
                .bounded(&mut report, CycleStep::Record, async move {
                    Ok::<_, AppError>(recorder.record(&marks).await)
                })
                .await;
            // 未写入的标记恢复计时，下一轮重新判定；重复写入是幂等的
            let unwritten = match outcome {
                Some(outcome) => {
                    let failed = outcome.failed.clone();
                    report.recorded = outcome;
                    if !failed.is_empty() {
                        self.fail(&mut report, CycleStep::Record);
                    }
                    failed
                }
                None => report.marks.clone(),
            };
            for event in &unwritten {
                self.tracker.restore(&event.device_name, event.seen_since);
            }
        }

        let date = report.date();
        report.present = self
            .bounded(
                &mut report,
                CycleStep::AggregatePresent,
                self.aggregation.recompute_present(date),
            )
            .await;
        report.enrolled = self
            .bounded(
                &mut report,
                CycleStep::AggregateEnrolled,
                self.aggregation.recompute_enrolled(date),
            )
            .await;

        self.publish(&report, timer.elapsed().as_secs_f64());

        debug!(
            detected = report.detected,
            tracked = report.tracked,
            recognised = report.recognised,
            marks = report.marks.len(),
            recorded = report.recorded.recorded,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "Poll cycle complete"
        );

        report
    }

    /// 在步骤超时内执行 `fut`，失败或超时时记入报告并返回 None
    async fn bounded<T, F>(&self, report: &mut CycleReport, step: CycleStep, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.step_timeout(), fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                error!(step = step.as_str(), error = %e, "Poll step failed");
                self.fail(report, step);
                None
            }
            Err(_) => {
                error!(
                    step = step.as_str(),
                    timeout_secs = self.config.step_timeout_secs,
                    "Poll step timed out"
                );
                self.fail(report, step);
                None
            }
        }
    }

    fn fail(&self, report: &mut CycleReport, step: CycleStep) {
        report.failed_steps.push(step);
        if let Some(metrics) = &self.metrics {
            metrics.record_step_failure(step.as_str());
            if step.touches_store() {
                metrics.store_errors_total.inc();
            }
        }
    }

    fn publish(&self, report: &CycleReport, elapsed_secs: f64) {
        let Some(metrics) = &self.metrics else {
            return;
        };

        metrics.cycles_total.inc();
        metrics.marks_total.inc_by(report.recorded.recorded as u64);
        metrics.tracked_devices.set(report.tracked as i64);
        metrics.recognised_devices.set(report.recognised as i64);
        metrics.last_cycle_timestamp_seconds.set(Utc::now().timestamp());
        metrics.cycle_duration_seconds.observe(elapsed_secs);

        if let Some(path) = &self.textfile_path {
            if let Err(e) = metrics.write_textfile(path) {
                warn!(path = %path.display(), error = %e, "Failed to write metrics textfile");
            }
        }
    }
}
