//! Rollcall - 蓝牙近场课堂考勤
//!
//! 周期性枚举主机上已配对的蓝牙设备，将设备名映射到学生，
//! 在课表时间窗内连续在场达到要求时长后写入到场记录，
//! 并重算各课程每日的到场人数和应到人数。

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod scanner;
pub mod services;
pub mod storage;
