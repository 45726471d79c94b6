//! # E-V 曲线导出
//!
//! 每个成功网格点一行的 CSV。
//!
//! ## 依赖关系
//! - 被 `commands/scan.rs` 调用
//! - 使用 `models/sample.rs` 的 EnergyVolumeCurve
//! - 使用 `csv` 库写入 CSV 文件

use crate::error::{EvError, Result};
use crate::models::EnergyVolumeCurve;

use std::path::Path;

const HEADER: [&str; 7] = [
    "volume_scale",
    "volume",
    "volume_per_atom",
    "volume_per_formula",
    "potential_energy",
    "binding_energy_per_atom",
    "binding_energy_per_formula",
];

/// 导出曲线为 CSV
pub fn to_csv(curve: &EnergyVolumeCurve, output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;
    wtr.write_record(HEADER)?;

    for s in &curve.samples {
        wtr.write_record(&[
            format!("{:.6}", s.volume_scale),
            format!("{:.8}", s.volume),
            format!("{:.8}", s.volume_per_atom),
            format!("{:.8}", s.volume_per_formula),
            format!("{:.10}", s.potential_energy),
            format!("{:.10}", s.binding_energy_per_atom),
            format!("{:.10}", s.binding_energy_per_formula),
        ])?;
    }

    wtr.flush().map_err(|e| EvError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })?;

    Ok(())
}
