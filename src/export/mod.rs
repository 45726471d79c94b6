//! # 导出模块
//!
//! 性质记录（EDN / JSON）、E-V 曲线 CSV 和曲线图。
//!
//! ## 依赖关系
//! - 被 `driver/scan.rs`, `commands/scan.rs` 使用
//! - 使用 `models/` 数据模型
//! - 子模块: records, curve, plot

pub mod curve;
pub mod plot;
pub mod records;

pub use records::{FileSink, MemorySink, PropertySink, RecordFormat, DEFAULT_OUTPUT};
