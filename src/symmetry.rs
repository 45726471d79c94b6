//! # 对称性分析
//!
//! 用空间群编号和 (元素, Wyckoff 字母) 多重集描述晶体对称性。
//! 体积扫描中若描述符与名义结构不同，视为发生了相变。
//!
//! ## 依赖关系
//! - 被 `driver/nominal.rs`, `commands/scan.rs` 使用
//! - 使用 `models/structure.rs`
//! - 使用 `moyo` 进行空间群搜索, `nalgebra` 构造输入

use crate::error::SymmetryError;
use crate::models::Crystal;

use moyo::base::{AngleTolerance, Cell, Lattice};
use moyo::data::Setting;
use moyo::MoyoDataset;
use nalgebra::{Matrix3, Vector3};

use std::fmt;

/// 晶体对称性描述符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymmetryDescriptor {
    /// 空间群编号 (1-230)
    pub space_group: i32,
    /// 排序后的 (元素, Wyckoff 字母)
    pub sites: Vec<(String, char)>,
}

impl SymmetryDescriptor {
    pub fn new(space_group: i32, mut sites: Vec<(String, char)>) -> Self {
        sites.sort();
        SymmetryDescriptor { space_group, sites }
    }
}

impl fmt::Display for SymmetryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sites: Vec<String> = self
            .sites
            .iter()
            .map(|(el, w)| format!("{}:{}", el, w))
            .collect();
        write!(f, "SG {} [{}]", self.space_group, sites.join(" "))
    }
}

/// 对称性分析器
pub trait SymmetryAnalyzer {
    fn describe(&self, crystal: &Crystal) -> Result<SymmetryDescriptor, SymmetryError>;
}

/// 基于 moyo 的分析器
#[derive(Debug, Clone, Copy)]
pub struct MoyoAnalyzer {
    /// 距离容差 (Å)
    pub symprec: f64,
}

impl Default for MoyoAnalyzer {
    fn default() -> Self {
        MoyoAnalyzer { symprec: 1e-4 }
    }
}

impl MoyoAnalyzer {
    pub fn new(symprec: f64) -> Self {
        MoyoAnalyzer { symprec }
    }
}

impl SymmetryAnalyzer for MoyoAnalyzer {
    fn describe(&self, crystal: &Crystal) -> Result<SymmetryDescriptor, SymmetryError> {
        if crystal.atoms.is_empty() {
            return Err(SymmetryError::Analysis("structure has no atoms".to_string()));
        }

        let m = crystal.lattice.matrix;
        let lattice = Lattice::new(Matrix3::new(
            m[0][0], m[0][1], m[0][2],
            m[1][0], m[1][1], m[1][2],
            m[2][0], m[2][1], m[2][2],
        ));

        // 元素按首次出现编号，从 1 开始
        let species = crystal.species();
        let mut positions = Vec::with_capacity(crystal.num_atoms());
        let mut numbers = Vec::with_capacity(crystal.num_atoms());
        for atom in &crystal.atoms {
            let p = atom.position;
            positions.push(Vector3::new(p[0], p[1], p[2]));
            let id = species
                .iter()
                .position(|s| *s == atom.element)
                .unwrap_or(0);
            numbers.push(id as i32 + 1);
        }

        let cell = Cell::new(lattice, positions, numbers);
        let dataset = MoyoDataset::new(
            &cell,
            self.symprec,
            AngleTolerance::Default,
            Setting::Spglib,
            true,
        )
        .map_err(|e| SymmetryError::Analysis(format!("{:?}", e)))?;

        let sites = crystal
            .atoms
            .iter()
            .zip(dataset.wyckoffs.iter())
            .map(|(atom, &w)| (atom.element.clone(), w))
            .collect();

        Ok(SymmetryDescriptor::new(dataset.number, sites))
    }
}
