//! 每日汇总
//!
//! 每轮轮询全量重算各课程当天的到场人数与应到人数，并按键合并写回。
//! 重算不依赖上一轮结果，因此对同一份数据重复执行得到相同输出。

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::models::{Module, ModuleDayTotals, Student};
use crate::storage::{ModuleRepository, StudentRepository};

/// 统计某日各课程的到场人数（课程 ID → 人数）
///
/// 旧格式记录只带课程名，因此先按课程名计数，再映射回每个同名课程的 ID。
/// 没有名称的课程计数为 0。
pub fn count_present(
    modules: &[Module],
    students: &[Student],
    date: NaiveDate,
) -> BTreeMap<String, u64> {
    let mut by_name: HashMap<&str, u64> = modules
        .iter()
        .filter_map(|m| m.name.as_deref())
        .map(|name| (name, 0))
        .collect();

    for student in students {
        let Some(record) = student.attendance_on(date) else {
            continue;
        };
        for name in record.present_module_names() {
            if let Some(count) = by_name.get_mut(name) {
                *count += 1;
            }
        }
    }

    modules
        .iter()
        .map(|m| {
            let count = m
                .name
                .as_deref()
                .and_then(|name| by_name.get(name).copied())
                .unwrap_or(0);
            (m.id.clone(), count)
        })
        .collect()
}

/// 统计各课程所属年级的注册人数（课程 ID → 人数）
///
/// 没有年级的学生不计入；没有年级的课程不出现在结果中。
pub fn count_enrolled(modules: &[Module], students: &[Student]) -> BTreeMap<String, u64> {
    let mut by_cohort: HashMap<&str, u64> = HashMap::new();
    for cohort in students.iter().filter_map(|s| s.course_year.as_deref()) {
        *by_cohort.entry(cohort).or_insert(0) += 1;
    }

    modules
        .iter()
        .filter_map(|m| {
            let cohort = m.year.as_deref()?;
            Some((m.id.clone(), by_cohort.get(cohort).copied().unwrap_or(0)))
        })
        .collect()
}

/// 汇总服务 trait
#[async_trait]
pub trait AggregationService: Send + Sync {
    /// 重算并写回某日各课程到场人数
    async fn recompute_present(&self, date: NaiveDate) -> Result<BTreeMap<String, u64>>;

    /// 重算并写回某日各课程应到人数
    async fn recompute_enrolled(&self, date: NaiveDate) -> Result<BTreeMap<String, u64>>;
}

/// 汇总服务实现
pub struct AggregationServiceImpl {
    students: StudentRepository,
    modules: ModuleRepository,
}

impl AggregationServiceImpl {
    pub fn new(students: StudentRepository, modules: ModuleRepository) -> Self {
        Self { students, modules }
    }

    /// 写回各课程汇总，单个课程写入失败只记录日志
    ///
    /// 返回失败的课程数。
    async fn write_totals<F>(
        &self,
        date: NaiveDate,
        counts: &BTreeMap<String, u64>,
        totals: F,
    ) -> usize
    where
        F: Fn(u64) -> ModuleDayTotals + Send + Sync,
    {
        let mut failed = 0;
        for (module_id, count) in counts {
            match self
                .modules
                .update_day_totals(module_id, date, &totals(*count))
                .await
            {
                Ok(()) => debug!(module = %module_id, count, date = %date, "Updated module totals"),
                Err(e) => {
                    error!(module = %module_id, date = %date, error = %e, "Failed to update module totals");
                    failed += 1;
                }
            }
        }
        failed
    }
}

#[async_trait]
impl AggregationService for AggregationServiceImpl {
    async fn recompute_present(&self, date: NaiveDate) -> Result<BTreeMap<String, u64>> {
        let modules = self.modules.list().await?;
        let students = self.students.list().await?;

        let counts = count_present(&modules, &students, date);
        let failed = self.write_totals(date, &counts, ModuleDayTotals::present).await;
        if failed > 0 {
            warn!(failed, total = counts.len(), date = %date, "Some present totals were not written");
        }
        Ok(counts)
    }

    async fn recompute_enrolled(&self, date: NaiveDate) -> Result<BTreeMap<String, u64>> {
        let modules = self.modules.list().await?;
        let students = self.students.list().await?;

        let counts = count_enrolled(&modules, &students);
        let failed = self.write_totals(date, &counts, ModuleDayTotals::enrolled).await;
        if failed > 0 {
            warn!(failed, total = counts.len(), date = %date, "Some enrolled totals were not written");
        }
        Ok(counts)
    }
}

/// 创建汇总服务
pub fn create_aggregation_service(
    students: StudentRepository,
    modules: ModuleRepository,
) -> Box<dyn AggregationService> {
    Box::new(AggregationServiceImpl::new(students, modules))
}
