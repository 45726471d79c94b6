//! # 固定晶胞内坐标弛豫
//!
//! 晶胞不动，只按原子受力移动原子位置，直到最大受力低于阈值。
//! 使用 FIRE 算法（Bitzek et al., PRL 97, 170201），所有原子质量取 1，
//! 单步位移上限 `MAX_STEP`。
//!
//! ## 依赖关系
//! - 被 `calculator/mod.rs` 的 `Calculator::relax_positions` 默认实现调用
//! - 使用 `models/structure.rs`

use super::Calculator;
use crate::error::EvaluationError;
use crate::models::Crystal;

use serde::{Deserialize, Serialize};

const DT_START: f64 = 0.1;
const DT_MAX: f64 = 1.0;
const N_MIN: usize = 5;
const F_INC: f64 = 1.1;
const F_DEC: f64 = 0.5;
const ALPHA_START: f64 = 0.1;
const F_ALPHA: f64 = 0.99;
/// 单步总位移上限 (Å)
const MAX_STEP: f64 = 0.2;

/// 弛豫参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelaxSettings {
    /// 收敛判据：最大原子受力 (eV/Å)
    pub force_tolerance: f64,
    /// 最大迭代步数
    pub max_steps: u32,
}

impl Default for RelaxSettings {
    fn default() -> Self {
        RelaxSettings {
            force_tolerance: 1e-4,
            max_steps: 1000,
        }
    }
}

fn norm(v: &[f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// 最大原子受力 (eV/Å)
pub fn max_force(forces: &[[f64; 3]]) -> f64 {
    forces.iter().map(norm).fold(0.0, f64::max)
}

/// 用 FIRE 弛豫原子位置
///
/// 计算器不提供受力时结构保持不变。达到 `max_steps` 仍未收敛返回
/// `EvaluationError::NotConverged`。
pub fn fire<C: Calculator + ?Sized>(
    calculator: &mut C,
    crystal: &mut Crystal,
    settings: &RelaxSettings,
) -> Result<(), EvaluationError> {
    let mut positions = crystal.cartesian_positions();
    let mut velocities = vec![[0.0; 3]; positions.len()];
    let mut dt = DT_START;
    let mut alpha = ALPHA_START;
    let mut n_positive = 0;
    let mut fmax = 0.0;

    for _ in 0..settings.max_steps {
        let forces = match calculator.forces(crystal)? {
            Some(f) => f,
            None => return Ok(()),
        };
        fmax = max_force(&forces);
        if !fmax.is_finite() {
            return Err(EvaluationError::NonFinite {
                quantity: "forces".to_string(),
            });
        }
        if fmax < settings.force_tolerance {
            return Ok(());
        }

        let power: f64 = velocities
            .iter()
            .zip(&forces)
            .map(|(v, f)| v[0] * f[0] + v[1] * f[1] + v[2] * f[2])
            .sum();

        if power > 0.0 {
            let v_norm = velocities.iter().map(|v| norm(v).powi(2)).sum::<f64>().sqrt();
            let f_norm = forces.iter().map(|f| norm(f).powi(2)).sum::<f64>().sqrt();
            for (v, f) in velocities.iter_mut().zip(&forces) {
                for k in 0..3 {
                    v[k] = (1.0 - alpha) * v[k] + alpha * f[k] / f_norm * v_norm;
                }
            }
            if n_positive > N_MIN {
                dt = (dt * F_INC).min(DT_MAX);
                alpha *= F_ALPHA;
            }
            n_positive += 1;
        } else {
            velocities.iter_mut().for_each(|v| *v = [0.0; 3]);
            dt *= F_DEC;
            alpha = ALPHA_START;
            n_positive = 0;
        }

        let mut steps: Vec<[f64; 3]> = velocities
            .iter_mut()
            .zip(&forces)
            .map(|(v, f)| {
                for k in 0..3 {
                    v[k] += dt * f[k];
                }
                [dt * v[0], dt * v[1], dt * v[2]]
            })
            .collect();

        let step_norm = steps.iter().map(|d| norm(d).powi(2)).sum::<f64>().sqrt();
        if step_norm > MAX_STEP {
            let s = MAX_STEP / step_norm;
            steps.iter_mut().for_each(|d| d.iter_mut().for_each(|x| *x *= s));
        }

        for (atom, (r, d)) in crystal
            .atoms
            .iter_mut()
            .zip(positions.iter_mut().zip(&steps))
        {
            for k in 0..3 {
                r[k] += d[k];
            }
            atom.position = crystal.lattice.cart_to_frac(*r).ok_or_else(|| {
                EvaluationError::Unphysical("cell is singular".to_string())
            })?;
        }
    }

    Err(EvaluationError::NotConverged {
        steps: settings.max_steps,
        max_force: fmax,
    })
}
