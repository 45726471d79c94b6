//! # Lennard-Jones 对势计算器
//!
//! 进程内 12-6 LJ 势，所有元素使用同一组参数，能量在截断处平移到零。
//! 对截断半径内的全部周期像求和。提供解析的应力和原子受力。
//!
//! ## 依赖关系
//! - 被 `calculator/mod.rs` 导出
//! - 使用 `models/structure.rs`

use super::{ensure_finite, Calculator};
use crate::error::EvaluationError;
use crate::models::Crystal;

/// 两原子距离低于此值视为重叠 (Å)
const OVERLAP_DISTANCE: f64 = 1e-8;

/// 12-6 Lennard-Jones 势
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LennardJones {
    /// 势阱深度 (eV)
    pub epsilon: f64,
    /// 零势能距离 (Å)
    pub sigma: f64,
    /// 截断半径 (Å)
    pub cutoff: f64,
}

impl Default for LennardJones {
    fn default() -> Self {
        LennardJones {
            epsilon: 1.0,
            sigma: 1.0,
            cutoff: 2.5,
        }
    }
}

impl LennardJones {
    pub fn new(epsilon: f64, sigma: f64, cutoff: f64) -> Self {
        LennardJones {
            epsilon,
            sigma,
            cutoff,
        }
    }

    fn pair_energy(&self, r: f64) -> f64 {
        let sr6 = (self.sigma / r).powi(6);
        4.0 * self.epsilon * (sr6 * sr6 - sr6)
    }

    /// du/dr
    fn pair_derivative(&self, r: f64) -> f64 {
        let sr6 = (self.sigma / r).powi(6);
        24.0 * self.epsilon / r * (sr6 - 2.0 * sr6 * sr6)
    }

    /// 对每个 (i, j, 周期像) 近邻对调用 `f(i, j, r, r_j - r_i)`，每对会被访问两次
    fn for_each_pair<F>(&self, crystal: &Crystal, mut f: F) -> Result<(), EvaluationError>
    where
        F: FnMut(usize, usize, f64, [f64; 3]),
    {
        let m = crystal.lattice.matrix;
        let volume = crystal.volume();
        if !(volume > 0.0) {
            return Err(EvaluationError::Unphysical(format!(
                "cell volume {} is not positive",
                volume
            )));
        }

        // 每个方向需要的周期像数：截断半径 / 晶面间距
        let cross = |u: [f64; 3], v: [f64; 3]| {
            [
                u[1] * v[2] - u[2] * v[1],
                u[2] * v[0] - u[0] * v[2],
                u[0] * v[1] - u[1] * v[0],
            ]
        };
        let norm = |u: [f64; 3]| (u[0] * u[0] + u[1] * u[1] + u[2] * u[2]).sqrt();
        let spacing = [
            volume / norm(cross(m[1], m[2])),
            volume / norm(cross(m[2], m[0])),
            volume / norm(cross(m[0], m[1])),
        ];
        let reach: Vec<i64> = spacing
            .iter()
            .map(|d| (self.cutoff / d).ceil() as i64 + 1)
            .collect();

        let positions = crystal.cartesian_positions();
        for (i, ri) in positions.iter().enumerate() {
            for (j, rj) in positions.iter().enumerate() {
                for n0 in -reach[0]..=reach[0] {
                    for n1 in -reach[1]..=reach[1] {
                        for n2 in -reach[2]..=reach[2] {
                            if i == j && n0 == 0 && n1 == 0 && n2 == 0 {
                                continue;
                            }
                            let shift = crystal
                                .lattice
                                .frac_to_cart([n0 as f64, n1 as f64, n2 as f64]);
                            let d = [
                                rj[0] + shift[0] - ri[0],
                                rj[1] + shift[1] - ri[1],
                                rj[2] + shift[2] - ri[2],
                            ];
                            let r = norm(d);
                            if r < OVERLAP_DISTANCE {
                                return Err(EvaluationError::Unphysical(format!(
                                    "atoms {} and {} overlap",
                                    i, j
                                )));
                            }
                            if r < self.cutoff {
                                f(i, j, r, d);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Calculator for LennardJones {
    fn name(&self) -> String {
        format!(
            "LJ(epsilon={}, sigma={}, cutoff={})",
            self.epsilon, self.sigma, self.cutoff
        )
    }

    fn potential_energy(&mut self, crystal: &Crystal) -> Result<f64, EvaluationError> {
        let shift = self.pair_energy(self.cutoff);
        let mut energy = 0.0;
        self.for_each_pair(crystal, |_, _, r, _| {
            energy += 0.5 * (self.pair_energy(r) - shift);
        })?;
        ensure_finite(energy, "energy")
    }

    fn stress(&mut self, crystal: &Crystal) -> Result<Option<[f64; 6]>, EvaluationError> {
        let mut virial = [[0.0; 3]; 3];
        self.for_each_pair(crystal, |_, _, r, d| {
            let w = 0.5 * self.pair_derivative(r) / r;
            for a in 0..3 {
                for b in 0..3 {
                    virial[a][b] += w * d[a] * d[b];
                }
            }
        })?;

        let v = crystal.volume();
        let stress = [
            virial[0][0] / v,
            virial[1][1] / v,
            virial[2][2] / v,
            virial[1][2] / v,
            virial[0][2] / v,
            virial[0][1] / v,
        ];
        for s in &stress {
            ensure_finite(*s, "stress")?;
        }
        Ok(Some(stress))
    }

    fn forces(&mut self, crystal: &Crystal) -> Result<Option<Vec<[f64; 3]>>, EvaluationError> {
        let mut forces = vec![[0.0; 3]; crystal.num_atoms()];
        self.for_each_pair(crystal, |i, j, r, d| {
            // 自身的周期像与 r_i 无关
            if i == j {
                return;
            }
            let w = self.pair_derivative(r) / r;
            for k in 0..3 {
                forces[i][k] += w * d[k];
            }
        })?;

        for f in forces.iter().flatten() {
            ensure_finite(*f, "forces")?;
        }
        Ok(Some(forces))
    }
}
