//! # 扫描参数
//!
//! 显式的扫描配置，可从 JSON 文件加载。未知键会被拒绝，缺失键取默认值。
//!
//! ## 依赖关系
//! - 被 `driver/scan.rs`, `commands/scan.rs` 使用
//! - 使用 `serde` / `serde_json`

use crate::calculator::RelaxSettings;
use crate::error::{EvError, Result};
use crate::models::Crystal;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 每个方向允许的最大步数
pub const MAX_NUM_STEPS: u32 = 100_000;

/// 体积扫描参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScanConfig {
    /// 最大体积相对变化
    pub max_volume_scale: f64,

    /// 每个方向的步数
    pub num_steps: u32,

    /// 每个网格点检查空间群和 Wyckoff 占据是否不变
    pub verify_symmetry: bool,

    /// 计算能量前在固定晶胞下弛豫原子位置
    pub relax_positions: bool,

    /// 弛豫收敛判据：最大原子受力 (eV/Å)
    pub force_tolerance: f64,

    /// 弛豫最大迭代步数
    pub max_relax_steps: u32,

    /// 为每个成功网格点额外写一条 crystal-structure-npt 记录
    pub record_structure_per_point: bool,

    /// 孤立原子能量 (eV)；为空时结合能即原始势能
    pub reference_energies: BTreeMap<String, f64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            max_volume_scale: 1e-2,
            num_steps: 10,
            verify_symmetry: true,
            relax_positions: true,
            force_tolerance: 1e-4,
            max_relax_steps: 1000,
            record_structure_per_point: false,
            reference_energies: BTreeMap::new(),
        }
    }
}

impl ScanConfig {
    /// 从 JSON 文件加载
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| EvError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json_str(&content).map_err(|e| match e {
            EvError::JsonError(err) => EvError::InvalidConfig {
                path: path.display().to_string(),
                reason: err.to_string(),
            },
            other => other,
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// 检查前置条件
    pub fn validate(&self) -> Result<()> {
        if self.num_steps < 1 {
            return Err(EvError::InvalidArgument(
                "num_steps must be at least 1".to_string(),
            ));
        }
        if self.num_steps > MAX_NUM_STEPS {
            return Err(EvError::InvalidArgument(format!(
                "num_steps must be at most {}, got {}",
                MAX_NUM_STEPS, self.num_steps
            )));
        }
        if !self.max_volume_scale.is_finite() {
            return Err(EvError::InvalidArgument(format!(
                "max_volume_scale must be finite, got {}",
                self.max_volume_scale
            )));
        }
        if self.relax_positions {
            if !(self.force_tolerance > 0.0 && self.force_tolerance.is_finite()) {
                return Err(EvError::InvalidArgument(format!(
                    "force_tolerance must be positive, got {}",
                    self.force_tolerance
                )));
            }
            if self.max_relax_steps < 1 {
                return Err(EvError::InvalidArgument(
                    "max_relax_steps must be at least 1".to_string(),
                ));
            }
        }
        if let Some((el, e)) = self.reference_energies.iter().find(|(_, e)| !e.is_finite()) {
            return Err(EvError::InvalidArgument(format!(
                "reference energy for {} is not finite ({})",
                el, e
            )));
        }
        Ok(())
    }

    /// 网格点总数 `2 * num_steps + 1`
    pub fn num_points(&self) -> u64 {
        2 * u64::from(self.num_steps) + 1
    }

    /// 弛豫参数；关闭弛豫时为 None
    pub fn relax_settings(&self) -> Option<RelaxSettings> {
        self.relax_positions.then(|| RelaxSettings {
            force_tolerance: self.force_tolerance,
            max_steps: self.max_relax_steps,
        })
    }

    /// 结构中全部原子的参考能量之和
    pub fn reference_energy(&self, crystal: &Crystal) -> Result<f64> {
        if self.reference_energies.is_empty() {
            return Ok(0.0);
        }

        let mut total = 0.0;
        for (element, count) in crystal.species_counts() {
            let e = self.reference_energies.get(&element).ok_or_else(|| {
                EvError::InvalidArgument(format!("no reference energy for species {}", element))
            })?;
            total += e * count as f64;
        }
        Ok(total)
    }
}
