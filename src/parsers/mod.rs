//! # 解析器模块
//!
//! 结构文件读取与原型标签解码。
//!
//! ## 依赖关系
//! - 被 `commands/` 模块使用
//! - 使用 `models/` 数据模型
//! - 子模块: poscar, prototype

pub mod poscar;
pub mod prototype;

use crate::error::{EvError, Result};
use crate::models::Crystal;
use std::path::Path;

/// 从文件路径推断格式并解析
pub fn parse_structure_file(path: &Path) -> Result<Crystal> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if ext == "vasp" || name.starts_with("POSCAR") || name.starts_with("CONTCAR") {
        return poscar::parse_poscar_file(path);
    }

    Err(EvError::UnsupportedFormat(format!(
        "Cannot determine format for: {}",
        path.display()
    )))
}
