//! # evcurve - 晶体能量-体积曲线工具
//!
//! 对晶体结构做各向同性膨胀和压缩，在每个体积上计算势能，
//! 得到结合能随体积变化的曲线，并以 KIM 性质记录的形式输出。
//!
//! ## 依赖关系
//! ```text
//! lib.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── driver/     (体积扫描驱动)
//!   │     │     ├── calculator/ (能量计算: LJ, LAMMPS)
//!   │     │     └── symmetry.rs (空间群和 Wyckoff 检查)
//!   │     ├── batch/      (批量并行处理)
//!   │     ├── parsers/    (POSCAR, 原型标签)
//!   │     ├── export/     (性质记录, CSV, 曲线图)
//!   │     └── models/     (数据模型)
//!   ├── utils/      (终端输出和进度条)
//!   └── error.rs    (错误处理)
//! ```

pub mod batch;
pub mod calculator;
pub mod cli;
pub mod commands;
pub mod driver;
pub mod error;
pub mod export;
pub mod models;
pub mod parsers;
pub mod symmetry;
pub mod utils;
