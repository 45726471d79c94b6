//! # 晶体结构数据模型
//!
//! 扫描使用的晶体结构表示：晶格 + 分数坐标原子。
//! 改变晶格时分数坐标保持不变，原子随晶胞一起缩放。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `calculator/`, `symmetry.rs`, `driver/` 使用
//! - 无外部模块依赖

use serde::{Deserialize, Serialize};

/// 晶格参数表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c
    /// [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]]
    pub matrix: [[f64; 3]; 3],
}

/// LAMMPS restricted triclinic 盒子参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prism {
    pub lx: f64,
    pub ly: f64,
    pub lz: f64,
    pub xy: f64,
    pub xz: f64,
    pub yz: f64,
}

impl Lattice {
    /// 从晶格参数 (a, b, c, alpha, beta, gamma) 创建晶格
    /// 角度单位：度。a 沿 x 轴，b 在 xy 平面内
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let (sin_gamma, cos_gamma) = gamma.to_radians().sin_cos();

        let c1 = c * cos_beta;
        let c2 = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c3 = (c * c - c1 * c1 - c2 * c2).sqrt();

        Lattice {
            matrix: [
                [a, 0.0, 0.0],
                [b * cos_gamma, b * sin_gamma, 0.0],
                [c1, c2, c3],
            ],
        }
    }

    /// 从晶格向量矩阵创建
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Lattice { matrix }
    }

    /// 立方晶格
    pub fn cubic(a: f64) -> Self {
        Lattice::from_vectors([[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]])
    }

    /// 获取晶格参数 (a, b, c, alpha, beta, gamma)
    pub fn parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let [a_vec, b_vec, c_vec] = self.matrix;

        let a = norm(a_vec);
        let b = norm(b_vec);
        let c = norm(c_vec);

        let alpha = (dot(b_vec, c_vec) / (b * c)).acos().to_degrees();
        let beta = (dot(a_vec, c_vec) / (a * c)).acos().to_degrees();
        let gamma = (dot(a_vec, b_vec) / (a * b)).acos().to_degrees();

        (a, b, c, alpha, beta, gamma)
    }

    /// 有符号体积（行列式）
    pub fn volume(&self) -> f64 {
        let [a, b, c] = self.matrix;
        a[0] * (b[1] * c[2] - b[2] * c[1]) - a[1] * (b[0] * c[2] - b[2] * c[0])
            + a[2] * (b[0] * c[1] - b[1] * c[0])
    }

    /// 所有晶格向量乘以同一个线性因子
    pub fn scaled(&self, factor: f64) -> Lattice {
        let mut matrix = self.matrix;
        for row in matrix.iter_mut() {
            for x in row.iter_mut() {
                *x *= factor;
            }
        }
        Lattice { matrix }
    }

    /// 分数坐标转笛卡尔坐标
    pub fn frac_to_cart(&self, frac: [f64; 3]) -> [f64; 3] {
        let m = self.matrix;
        [
            frac[0] * m[0][0] + frac[1] * m[1][0] + frac[2] * m[2][0],
            frac[0] * m[0][1] + frac[1] * m[1][1] + frac[2] * m[2][1],
            frac[0] * m[0][2] + frac[1] * m[1][2] + frac[2] * m[2][2],
        ]
    }

    /// 笛卡尔坐标转分数坐标，晶格退化时返回 None
    pub fn cart_to_frac(&self, cart: [f64; 3]) -> Option<[f64; 3]> {
        let m = self.matrix;
        let det = self.volume();
        if det.abs() < 1e-10 {
            return None;
        }

        // (M^T)^-1 · cart，M 的行是晶格向量
        let inv = [
            [
                (m[1][1] * m[2][2] - m[1][2] * m[2][1]) / det,
                (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det,
                (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det,
            ],
            [
                (m[1][2] * m[2][0] - m[1][0] * m[2][2]) / det,
                (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det,
                (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det,
            ],
            [
                (m[1][0] * m[2][1] - m[1][1] * m[2][0]) / det,
                (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det,
                (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det,
            ],
        ];

        Some([
            inv[0][0] * cart[0] + inv[1][0] * cart[1] + inv[2][0] * cart[2],
            inv[0][1] * cart[0] + inv[1][1] * cart[1] + inv[2][1] * cart[2],
            inv[0][2] * cart[0] + inv[1][2] * cart[1] + inv[2][2] * cart[2],
        ])
    }

    /// 转换为 LAMMPS 要求的上三角形式（a 沿 x，b 在 xy 平面）
    pub fn lammps_prism(&self) -> Prism {
        let (a, b, c, alpha, beta, gamma) = self.parameters();
        let m = Lattice::from_parameters(a, b, c, alpha, beta, gamma).matrix;
        Prism {
            lx: m[0][0],
            ly: m[1][1],
            lz: m[2][2],
            xy: m[1][0],
            xz: m[2][0],
            yz: m[2][1],
        }
    }
}

fn dot(u: [f64; 3], v: [f64; 3]) -> f64 {
    u[0] * v[0] + u[1] * v[1] + u[2] * v[2]
}

fn norm(u: [f64; 3]) -> f64 {
    dot(u, u).sqrt()
}

/// 原子信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// 元素符号
    pub element: String,

    /// 分数坐标 [x, y, z]
    pub position: [f64; 3],
}

impl Atom {
    pub fn new(element: impl Into<String>, position: [f64; 3]) -> Self {
        Atom {
            element: element.into(),
            position,
        }
    }
}

/// 晶体结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crystal {
    /// 结构名称
    pub name: String,

    /// 晶格
    pub lattice: Lattice,

    /// 原子列表
    pub atoms: Vec<Atom>,
}

impl Crystal {
    pub fn new(name: impl Into<String>, lattice: Lattice, atoms: Vec<Atom>) -> Self {
        Crystal {
            name: name.into(),
            lattice,
            atoms,
        }
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    /// 晶胞体积 (Å³)
    pub fn volume(&self) -> f64 {
        self.lattice.volume().abs()
    }

    /// 元素种类，按首次出现的顺序
    pub fn species(&self) -> Vec<String> {
        let mut species: Vec<String> = Vec::new();
        for atom in &self.atoms {
            if !species.contains(&atom.element) {
                species.push(atom.element.clone());
            }
        }
        species
    }

    /// 每种元素的原子数，与 `species()` 顺序一致
    pub fn species_counts(&self) -> Vec<(String, usize)> {
        self.species()
            .into_iter()
            .map(|el| {
                let n = self.atoms.iter().filter(|a| a.element == el).count();
                (el, n)
            })
            .collect()
    }

    /// 笛卡尔坐标 (Å)
    pub fn cartesian_positions(&self) -> Vec<[f64; 3]> {
        self.atoms
            .iter()
            .map(|a| self.lattice.frac_to_cart(a.position))
            .collect()
    }

    /// 替换晶格；分数坐标不变，原子随晶胞缩放
    pub fn set_lattice(&mut self, lattice: Lattice) {
        self.lattice = lattice;
    }

    /// 各向同性缩放：体积乘以 `volume_scale`，形状不变
    pub fn scale_isotropic(&mut self, volume_scale: f64) {
        let linear_scale = volume_scale.cbrt();
        self.lattice = self.lattice.scaled(linear_scale);
    }

    /// 计算化学式
    pub fn formula(&self) -> String {
        use std::collections::BTreeMap;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();

        for atom in &self.atoms {
            *counts.entry(atom.element.as_str()).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .map(|(el, count)| {
                if count == 1 {
                    el.to_string()
                } else {
                    format!("{}{}", el, count)
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// 每原子体积
    pub fn volume_per_atom(&self) -> f64 {
        self.volume() / self.atoms.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zincblende() -> Crystal {
        // 原胞：fcc 晶格向量，a = 5.4093
        let a = 5.4093;
        let lattice = Lattice::from_vectors([
            [0.0, a / 2.0, a / 2.0],
            [a / 2.0, 0.0, a / 2.0],
            [a / 2.0, a / 2.0, 0.0],
        ]);
        Crystal::new(
            "ZnS",
            lattice,
            vec![
                Atom::new("Zn", [0.0, 0.0, 0.0]),
                Atom::new("S", [0.25, 0.25, 0.25]),
            ],
        )
    }

    #[test]
    fn test_lattice_from_parameters_cubic() {
        let lattice = Lattice::from_parameters(5.0, 5.0, 5.0, 90.0, 90.0, 90.0);
        let (a, b, c, alpha, beta, gamma) = lattice.parameters();

        assert!((a - 5.0).abs() < 1e-6);
        assert!((b - 5.0).abs() < 1e-6);
        assert!((c - 5.0).abs() < 1e-6);
        assert!((alpha - 90.0).abs() < 1e-6);
        assert!((beta - 90.0).abs() < 1e-6);
        assert!((gamma - 90.0).abs() < 1e-6);
        assert!((lattice.volume() - 125.0).abs() < 1e-6);
    }

    #[test]
    fn test_lattice_hexagonal() {
        let lattice = Lattice::from_parameters(3.0, 3.0, 5.0, 90.0, 90.0, 120.0);
        let (a, _, c, _, _, gamma) = lattice.parameters();

        assert!((a - 3.0).abs() < 0.01);
        assert!((c - 5.0).abs() < 0.01);
        assert!((gamma - 120.0).abs() < 0.01);
    }

    #[test]
    fn test_frac_cart_round_trip() {
        let crystal = zincblende();
        let frac = [0.1, 0.2, 0.7];
        let cart = crystal.lattice.frac_to_cart(frac);
        let back = crystal.lattice.cart_to_frac(cart).unwrap();
        for k in 0..3 {
            assert!((back[k] - frac[k]).abs() < 1e-10);
        }
    }

    #[test]
    fn test_scale_isotropic_scales_volume_and_keeps_fractional() {
        let mut crystal = zincblende();
        let v0 = crystal.volume();
        let params0 = crystal.lattice.parameters();

        crystal.scale_isotropic(1.1);

        assert!((crystal.volume() - 1.1 * v0).abs() < 1e-9);
        assert_eq!(crystal.atoms[1].position, [0.25, 0.25, 0.25]);

        // 角度不变
        let params = crystal.lattice.parameters();
        assert!((params.3 - params0.3).abs() < 1e-9);
        assert!((params.5 - params0.5).abs() < 1e-9);

        // 笛卡尔坐标随晶胞缩放
        let cart = crystal.cartesian_positions();
        let expected = 0.25 * 5.4093 * 1.1f64.cbrt();
        assert!((cart[1][0] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_lammps_prism_preserves_volume() {
        let crystal = zincblende();
        let p = crystal.lattice.lammps_prism();
        assert!((p.lx * p.ly * p.lz - crystal.volume()).abs() < 1e-8);
        assert!(p.lx > 0.0 && p.ly > 0.0 && p.lz > 0.0);
    }

    #[test]
    fn test_species_in_first_appearance_order() {
        let crystal = zincblende();
        assert_eq!(crystal.species(), vec!["Zn".to_string(), "S".to_string()]);
        assert_eq!(
            crystal.species_counts(),
            vec![("Zn".to_string(), 1), ("S".to_string(), 1)]
        );
        assert_eq!(crystal.formula(), "SZn");
    }
}
