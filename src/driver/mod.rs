//! # 体积扫描驱动模块
//!
//! 各向同性 E-V 扫描的核心：扫描参数、名义结构和扫描驱动。
//!
//! ## 依赖关系
//! - 被 `commands/scan.rs` 使用
//! - 使用 `calculator/`, `symmetry.rs`, `models/`, `export/`
//! - 子模块: config, nominal, scan

pub mod config;
pub mod nominal;
pub mod scan;

pub use config::ScanConfig;
pub use nominal::NominalStructure;
pub use scan::{volume_grid, VolumeScanDriver, PARTIAL_FAILURE_DISCLAIMER};
