//! # 计算器模块
//!
//! 给定晶体结构，计算势能（以及可选的应力和原子受力），并在固定晶胞下
//! 弛豫内坐标。扫描驱动只依赖 `Calculator` trait；单点失败用
//! `EvaluationError` 表示。
//!
//! ## 依赖关系
//! - 被 `driver/scan.rs`, `commands/scan.rs` 使用
//! - 使用 `models/structure.rs`
//! - 子模块: lennard_jones, lammps, relax

pub mod lammps;
pub mod lennard_jones;
pub mod relax;

pub use lammps::{AtomStyle, ExternalLammps, LammpsCalculator, SimulatorBackend};
pub use lennard_jones::LennardJones;
pub use relax::RelaxSettings;

use crate::error::EvaluationError;
use crate::models::Crystal;

/// 能量/应力计算器
pub trait Calculator {
    /// 用于日志和输出的名称
    fn name(&self) -> String;

    /// 势能 (eV)
    fn potential_energy(&mut self, crystal: &Crystal) -> Result<f64, EvaluationError>;

    /// 应力 (eV/Å³, Voigt: xx yy zz yz xz xy)；不支持时返回 `Ok(None)`
    fn stress(&mut self, _crystal: &Crystal) -> Result<Option<[f64; 6]>, EvaluationError> {
        Ok(None)
    }

    /// 原子受力 (eV/Å，笛卡尔坐标)；不支持时返回 `Ok(None)`
    fn forces(&mut self, _crystal: &Crystal) -> Result<Option<Vec<[f64; 3]>>, EvaluationError> {
        Ok(None)
    }

    /// 固定晶胞弛豫原子位置
    ///
    /// 默认用 `forces` 做 FIRE；不提供受力的计算器保持结构不变。
    fn relax_positions(
        &mut self,
        crystal: &mut Crystal,
        settings: &RelaxSettings,
    ) -> Result<(), EvaluationError> {
        relax::fire(self, crystal, settings)
    }
}

impl<C: Calculator + ?Sized> Calculator for Box<C> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn potential_energy(&mut self, crystal: &Crystal) -> Result<f64, EvaluationError> {
        (**self).potential_energy(crystal)
    }

    fn stress(&mut self, crystal: &Crystal) -> Result<Option<[f64; 6]>, EvaluationError> {
        (**self).stress(crystal)
    }

    fn forces(&mut self, crystal: &Crystal) -> Result<Option<Vec<[f64; 3]>>, EvaluationError> {
        (**self).forces(crystal)
    }

    fn relax_positions(
        &mut self,
        crystal: &mut Crystal,
        settings: &RelaxSettings,
    ) -> Result<(), EvaluationError> {
        (**self).relax_positions(crystal, settings)
    }
}

/// 检查计算结果为有限值
pub(crate) fn ensure_finite(value: f64, quantity: &str) -> Result<f64, EvaluationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvaluationError::NonFinite {
            quantity: quantity.to_string(),
        })
    }
}
