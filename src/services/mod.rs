//! 服务模块
//!
//! 在场追踪、课表解析、出勤判定、每日汇总以及驱动它们的轮询循环。

pub mod aggregation;
pub mod decision;
pub mod poll_loop;
pub mod presence;
pub mod schedule;

pub use aggregation::{
    AggregationService, AggregationServiceImpl, count_enrolled, count_present,
    create_aggregation_service,
};
pub use decision::{AttendanceRecorder, RecordOutcome, evaluate};
pub use poll_loop::{CycleReport, CycleStep, PollLoop};
pub use presence::PresenceTracker;
pub use schedule::{ActiveSession, ScheduleResolver};
