//! # 数据模型模块
//!
//! 定义晶体结构、扫描样本和性质记录数据模型。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `calculator/`, `driver/`, `export/` 使用
//! - 子模块: structure, sample, property, elements

pub mod elements;
pub mod property;
pub mod sample;
pub mod structure;

pub use property::{PropertyRecord, PropertyValue, SourceValue};
pub use sample::{EnergyVolumeCurve, PointOutcome, Sample};
pub use structure::{Atom, Crystal, Lattice, Prism};
