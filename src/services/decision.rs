//! 出勤判定
//!
//! 对每个被追踪且已登记的设备，查找其年级当前的课程；
//! 连续在场时长达到课程要求时产生一次到场标记，并重新计时。

use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::models::attendance::{parse_status, present_status};
use crate::models::{AttendanceRecord, LEGACY_KEY, MarkingEvent, Module, Roster};
use crate::services::presence::PresenceTracker;
use crate::services::schedule::ScheduleResolver;
use crate::storage::{ModuleRepository, StudentRepository};

/// 判定一轮轮询中应标记到场的学生
///
/// 未登记的设备、没有年级的学生、当前无课的设备都被跳过。
/// 每产生一个标记，对应设备的计时从 `now` 重新开始，
/// 同一次连续连接需再满一个阈值周期才会再次标记。
pub fn evaluate(
    tracker: &mut PresenceTracker,
    roster: &Roster,
    schedule: &ScheduleResolver,
    now: NaiveDateTime,
) -> Vec<MarkingEvent> {
    let tracked: Vec<(String, NaiveDateTime)> = tracker
        .iter()
        .map(|(device, since)| (device.to_string(), since))
        .collect();

    let mut events = Vec::new();
    for (device, since) in tracked {
        let Some(entry) = roster.lookup(&device) else {
            continue;
        };
        let Some(cohort) = entry.cohort.as_deref() else {
            debug!(device = %device, student = %entry.student_id, "Student has no course year");
            continue;
        };
        let Some(session) = schedule.resolve(cohort, now) else {
            continue;
        };

        let elapsed = now - since;
        if elapsed >= session.min_presence {
            events.push(MarkingEvent {
                device_name: device.clone(),
                student_id: entry.student_id.clone(),
                module_id: session.module_id,
                date: now.date(),
                seen_since: since,
            });
            tracker.reset(&device, now);
        } else {
            debug!(
                device = %device,
                module = %session.module_id,
                elapsed_secs = elapsed.num_seconds(),
                required_secs = session.min_presence.num_seconds(),
                session_ends = %session.ends_at,
                "Presence below threshold"
            );
        }
    }
    events
}

/// 标记写入结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    /// 成功写入
    pub recorded: usize,
    /// 课程已不存在而跳过
    pub skipped: usize,
    /// 写入失败的标记，调用方据此恢复计时
    pub failed: Vec<MarkingEvent>,
}

/// 将到场标记写入远程存储
#[derive(Clone)]
pub struct AttendanceRecorder {
    students: StudentRepository,
    modules: ModuleRepository,
}

impl AttendanceRecorder {
    pub fn new(students: StudentRepository, modules: ModuleRepository) -> Self {
        Self { students, modules }
    }

    /// 逐条写入标记，单条失败不影响其余标记
    pub async fn record(&self, events: &[MarkingEvent]) -> RecordOutcome {
        let mut outcome = RecordOutcome::default();
        // 旧格式记录转换时才需要全部课程，按需加载一次
        let mut catalogue: Option<Vec<Module>> = None;

        for event in events {
            let module = match self.modules.get_by_id(&event.module_id).await {
                Ok(Some(module)) => module,
                Ok(None) => {
                    warn!(module = %event.module_id, student = %event.student_id, "Module not found, skipping mark");
                    outcome.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(module = %event.module_id, error = %e, "Failed to load module");
                    outcome.failed.push(event.clone());
                    continue;
                }
            };

            match self.mark(event, &module, &mut catalogue).await {
                Ok(()) => {
                    info!(
                        student = %event.student_id,
                        device = %event.device_name,
                        module = %module.id,
                        name = %module.display_name(),
                        date = %event.date,
                        "Marked student present"
                    );
                    outcome.recorded += 1;
                }
                Err(e) => {
                    error!(student = %event.student_id, module = %module.id, error = %e, "Failed to mark student present");
                    outcome.failed.push(event.clone());
                }
            }
        }
        outcome
    }

    /// 写入单条标记
    ///
    /// 当天记录为旧格式字符串时先转换为按课程 ID 的映射，保留原有条目。
    async fn mark(
        &self,
        event: &MarkingEvent,
        module: &Module,
        catalogue: &mut Option<Vec<Module>>,
    ) -> Result<()> {
        let existing = self
            .students
            .attendance_on(&event.student_id, event.date)
            .await?;
        let Some(AttendanceRecord::Legacy(legacy)) = existing else {
            return self
                .students
                .mark_present(&event.student_id, event.date, &module.id, module.display_name())
                .await;
        };

        if catalogue.is_none() {
            *catalogue = Some(self.modules.list().await?);
        }
        let modules = catalogue.as_deref().unwrap_or_default();
        let owner = legacy_owner(&legacy, modules);

        let mut entries = Map::new();
        entries.insert(owner.clone(), Value::String(legacy));
        entries.insert(
            module.id.clone(),
            Value::String(present_status(module.display_name())),
        );
        debug!(student = %event.student_id, date = %event.date, legacy_module = %owner, "Converting legacy attendance record");

        self.students
            .replace_attendance(&event.student_id, event.date, entries)
            .await
    }
}

/// 旧格式记录所属课程的 ID
///
/// 按记录中的课程名查找，找不到时使用 [`LEGACY_KEY`]。
fn legacy_owner(legacy: &str, modules: &[Module]) -> String {
    parse_status(legacy)
        .and_then(|(name, _)| modules.iter().find(|m| m.name.as_deref() == Some(name)))
        .map(|m| m.id.clone())
        .unwrap_or_else(|| LEGACY_KEY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::Student;
    use crate::storage::{DocumentStore, MemoryStore, StorePath};
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate};
    use serde_json::json;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn monday(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn schedule() -> ScheduleResolver {
        let mut module: Module = serde_json::from_value(json!({
            "name": "Algebra",
            "year": "Year2",
            "schedule": { "Monday": { "startTime": "09:00", "endTime": "10:00", "attendanceTime": 5 } }
        }))
        .unwrap();
        module.id = "m1".into();
        ScheduleResolver::new(vec![module])
    }

    fn roster() -> Roster {
        Roster::from_students(&[
            Student {
                id: "s1".into(),
                device_name: Some("Pixel 7".into()),
                course_year: Some("Year2".into()),
                attendance: BTreeMap::new(),
            },
            Student {
                id: "s2".into(),
                device_name: Some("iPhone".into()),
                course_year: None,
                attendance: BTreeMap::new(),
            },
        ])
    }

    fn marking(student: &str, module: &str) -> MarkingEvent {
        MarkingEvent {
            device_name: "Pixel 7".into(),
            student_id: student.into(),
            module_id: module.into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            seen_since: monday(9, 0, 0),
        }
    }

    /// 前若干次出勤写入失败的存储
    struct FlakyStore {
        inner: MemoryStore,
        attendance_failures: AtomicUsize,
    }

    impl FlakyStore {
        fn is_attendance(path: &StorePath) -> bool {
            path.segments().get(2).map(String::as_str) == Some("attendance")
        }

        fn fail_attendance(&self, path: &StorePath) -> crate::error::Result<()> {
            if Self::is_attendance(path)
                && self
                    .attendance_failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(AppError::Status {
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn read(&self, path: &StorePath) -> crate::error::Result<Option<Value>> {
            self.inner.read(path).await
        }

        async fn write(&self, path: &StorePath, value: &Value) -> crate::error::Result<()> {
            self.fail_attendance(path)?;
            self.inner.write(path, value).await
        }

        async fn update(
            &self,
            path: &StorePath,
            partial: &Map<String, Value>,
        ) -> crate::error::Result<()> {
            self.fail_attendance(path)?;
            self.inner.update(path, partial).await
        }
    }

    fn tracked(devices: &[&str], since: NaiveDateTime) -> PresenceTracker {
        let mut tracker = PresenceTracker::new();
        let set: BTreeSet<String> = devices.iter().map(|d| d.to_string()).collect();
        tracker.update(&set, since);
        tracker
    }

    #[test]
    fn test_exactly_at_threshold_marks_once() {
        let mut tracker = tracked(&["Pixel 7"], monday(9, 10, 0));
        let now = monday(9, 15, 0);

        let events = evaluate(&mut tracker, &roster(), &schedule(), now);
        assert_eq!(
            events,
            vec![MarkingEvent {
                device_name: "Pixel 7".into(),
                student_id: "s1".into(),
                module_id: "m1".into(),
                date: now.date(),
                seen_since: monday(9, 10, 0),
            }]
        );
        assert_eq!(tracker.seen_since("Pixel 7"), Some(now));

        // 同一时刻再次判定不会重复标记
        assert!(evaluate(&mut tracker, &roster(), &schedule(), now).is_empty());
    }

    #[test]
    fn test_just_below_threshold_does_not_mark() {
        let mut tracker = tracked(&["Pixel 7"], monday(9, 10, 0));
        let events = evaluate(&mut tracker, &roster(), &schedule(), monday(9, 14, 59));
        assert!(events.is_empty());
        assert_eq!(tracker.seen_since("Pixel 7"), Some(monday(9, 10, 0)));
    }

    #[test]
    fn test_reaffirms_after_another_full_period() {
        let mut tracker = tracked(&["Pixel 7"], monday(9, 0, 0));
        assert_eq!(evaluate(&mut tracker, &roster(), &schedule(), monday(9, 5, 0)).len(), 1);
        assert!(evaluate(&mut tracker, &roster(), &schedule(), monday(9, 9, 0)).is_empty());
        assert_eq!(evaluate(&mut tracker, &roster(), &schedule(), monday(9, 10, 0)).len(), 1);
    }

    #[test]
    fn test_unknown_devices_and_missing_cohort_are_ignored() {
        let mut tracker = tracked(&["Galaxy", "iPhone"], monday(9, 0, 0));
        let events = evaluate(&mut tracker, &roster(), &schedule(), monday(9, 30, 0));
        assert!(events.is_empty());
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_outside_session_window_does_not_mark() {
        let mut tracker = tracked(&["Pixel 7"], monday(8, 0, 0));
        let events = evaluate(&mut tracker, &roster(), &schedule(), monday(8, 59, 0));
        assert!(events.is_empty());

        let events = evaluate(&mut tracker, &roster(), &schedule(), monday(9, 0, 0));
        assert_eq!(events.len(), 1);
        assert_eq!(
            tracker.tracked_for("Pixel 7", monday(9, 0, 0)),
            Some(Duration::zero())
        );
    }

    #[tokio::test]
    async fn test_record_merges_and_skips_missing_modules() {
        let store = Arc::new(MemoryStore::with_document(json!({
            "modules": {
                "m1": { "name": "Algebra", "year": "Year2" },
                "m2": { "name": "Physics", "year": "Year2" }
            }
        })));
        let recorder = AttendanceRecorder::new(
            StudentRepository::new(store.clone()),
            ModuleRepository::new(store.clone()),
        );
        let event = |module: &str| marking("s1", module);

        let outcome = recorder
            .record(&[event("m1"), event("m2"), event("deleted")])
            .await;
        assert_eq!(
            outcome,
            RecordOutcome {
                recorded: 2,
                skipped: 1,
                failed: Vec::new(),
            }
        );
        assert_eq!(
            store.snapshot()["students"]["s1"]["attendance"]["2024-03-04"],
            json!({ "m1": "Algebra: present", "m2": "Physics: present" })
        );
    }

    #[tokio::test]
    async fn test_failed_write_is_returned_for_retry() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::with_document(json!({
                "modules": { "m1": { "name": "Algebra", "year": "Year2" } }
            })),
            attendance_failures: AtomicUsize::new(1),
        });
        let recorder = AttendanceRecorder::new(
            StudentRepository::new(store.clone()),
            ModuleRepository::new(store.clone()),
        );

        let first = recorder.record(&[marking("s1", "m1")]).await;
        assert_eq!(first.recorded, 0);
        assert_eq!(first.failed, vec![marking("s1", "m1")]);

        let second = recorder.record(&first.failed).await;
        assert_eq!(second.recorded, 1);
        assert!(second.failed.is_empty());
        assert_eq!(
            store.inner.snapshot()["students"]["s1"]["attendance"]["2024-03-04"],
            json!({ "m1": "Algebra: present" })
        );
    }

    #[tokio::test]
    async fn test_legacy_record_is_converted_not_overwritten() {
        let store = Arc::new(MemoryStore::with_document(json!({
            "modules": {
                "m1": { "name": "Algebra", "year": "Year2" },
                "m2": { "name": "Physics", "year": "Year2" }
            },
            "students": {
                "s1": { "attendance": { "2024-03-04": "Algebra: present" } },
                "s2": { "attendance": { "2024-03-04": "Latin: present" } }
            }
        })));
        let recorder = AttendanceRecorder::new(
            StudentRepository::new(store.clone()),
            ModuleRepository::new(store.clone()),
        );

        let outcome = recorder
            .record(&[marking("s1", "m2"), marking("s2", "m2")])
            .await;
        assert_eq!(outcome.recorded, 2);

        let snapshot = store.snapshot();
        assert_eq!(
            snapshot["students"]["s1"]["attendance"]["2024-03-04"],
            json!({ "m1": "Algebra: present", "m2": "Physics: present" })
        );
        assert_eq!(
            snapshot["students"]["s2"]["attendance"]["2024-03-04"],
            json!({ "legacy": "Latin: present", "m2": "Physics: present" })
        );
    }
}
