//! # 扫描样本数据模型
//!
//! 单个体积网格点的计算结果，以及一次扫描得到的 E-V 曲线。
//!
//! ## 依赖关系
//! - 被 `driver/scan.rs` 生成
//! - 被 `export/`, `commands/scan.rs` 使用

use serde::{Deserialize, Serialize};

/// 一个成功网格点的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// 体积缩放因子 V/V0
    pub volume_scale: f64,

    /// 晶胞体积 (Å³)
    pub volume: f64,

    /// 每原子体积 (Å³)
    pub volume_per_atom: f64,

    /// 每化学式体积 (Å³)
    pub volume_per_formula: f64,

    /// 势能 (eV)
    pub potential_energy: f64,

    /// 每原子结合能 (eV)
    pub binding_energy_per_atom: f64,

    /// 每化学式结合能 (eV)
    pub binding_energy_per_formula: f64,

    /// 应力 (eV/Å³, Voigt: xx yy zz yz xz xy)，计算器不支持时为 None
    pub stress: Option<[f64; 6]>,

    /// 内坐标弛豫后的分数坐标；未弛豫时为空
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relaxed_positions: Vec<[f64; 3]>,
}

/// 网格点的结果：成功或失败
#[derive(Debug, Clone, PartialEq)]
pub enum PointOutcome {
    Accepted(Sample),
    Failed {
        volume_scale: f64,
        volume: f64,
        reason: String,
    },
}

/// 一次扫描得到的 E-V 曲线
#[derive(Debug, Clone, Default)]
pub struct EnergyVolumeCurve {
    /// 成功的样本，按体积缩放因子升序
    pub samples: Vec<Sample>,

    /// 失败的网格点 (体积缩放因子, 原因)
    pub failures: Vec<(f64, String)>,

    /// 至少一个网格点失败时设置
    pub disclaimer: Option<String>,

    /// 每化学式原子数
    pub atoms_per_formula: u32,
}

impl EnergyVolumeCurve {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn volume_per_atom(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.volume_per_atom).collect()
    }

    pub fn volume_per_formula(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.volume_per_formula).collect()
    }

    pub fn binding_energy_per_atom(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.binding_energy_per_atom).collect()
    }

    pub fn binding_energy_per_formula(&self) -> Vec<f64> {
        self.samples
            .iter()
            .map(|s| s.binding_energy_per_formula)
            .collect()
    }

    /// 能量最低的样本
    pub fn minimum(&self) -> Option<&Sample> {
        self.samples.iter().min_by(|a, b| {
            a.binding_energy_per_atom
                .partial_cmp(&b.binding_energy_per_atom)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}
