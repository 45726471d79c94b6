//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `scan`: 各向同性 E-V 扫描（单文件或批量目录）
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: scan

pub mod scan;

use clap::{Parser, Subcommand};

/// evcurve - 晶体能量-体积曲线工具
#[derive(Parser)]
#[command(name = "evcurve")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "Isotropic energy-vs-volume scans of crystal structures", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Scan energy vs volume under isotropic expansion and compression
    Scan(scan::ScanArgs),
}
