//! 时钟抽象
//!
//! 课表按本地墙钟时间编写，因此所有判定都使用 `NaiveDateTime`。

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, Weekday};
use parking_lot::Mutex;

/// 墙钟时间来源
pub trait Clock: Send + Sync {
    /// 当前本地时间
    fn now(&self) -> NaiveDateTime;
}

/// 系统本地时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// 手动推进的时钟，用于测试和离线演练
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// 前进指定时长
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}

/// 英文星期全称，与课表中的键一致（"Monday" ... "Sunday"）
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// 存储路径使用的日期键
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
