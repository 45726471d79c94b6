//! # scan 子命令 CLI 定义
//!
//! 对单个结构文件或目录中的全部结构做各向同性 E-V 扫描。
//! 扫描参数可来自 `--config` 指定的 JSON 文件，命令行显式给出的值优先。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/scan.rs`

use crate::calculator::AtomStyle;
use crate::export::DEFAULT_OUTPUT;

use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// 计算器类型
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum CalculatorKind {
    /// In-process Lennard-Jones pair potential
    Lj,
    /// External LAMMPS process driving a KIM model
    Lammps,
}

impl std::fmt::Display for CalculatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalculatorKind::Lj => write!(f, "lj"),
            CalculatorKind::Lammps => write!(f, "lammps"),
        }
    }
}

/// scan 子命令参数
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Input: structure file (POSCAR/CONTCAR/*.vasp) or directory of structure files
    pub input: PathBuf,

    /// JSON file with scan parameters (flags below override its values)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum fractional change in volume
    #[arg(long, allow_hyphen_values = true)]
    pub max_volume_scale: Option<f64>,

    /// Number of steps on each side of the nominal volume
    #[arg(short = 'n', long)]
    pub num_steps: Option<u32>,

    /// Do not check that space group and Wyckoff occupation stay unchanged
    #[arg(long, default_value_t = false)]
    pub no_symmetry: bool,

    /// Do not relax atomic positions at fixed cell before each energy evaluation
    #[arg(long, default_value_t = false)]
    pub no_relax: bool,

    /// Relaxation convergence threshold on the largest atomic force in eV/Å
    #[arg(long)]
    pub force_tolerance: Option<f64>,

    /// Maximum number of relaxation iterations per grid point
    #[arg(long)]
    pub max_relax_steps: Option<u32>,

    /// Symmetry tolerance in Å
    #[arg(long, default_value_t = 1e-4)]
    pub symprec: f64,

    /// Also write a crystal-structure-npt record for every successful point
    #[arg(long, default_value_t = false)]
    pub record_structures: bool,

    /// Isolated-atom energy used for binding energies, e.g. "Ar=-0.05" (repeatable)
    #[arg(long = "reference-energy", value_name = "SPECIES=EV", allow_hyphen_values = true)]
    pub reference_energies: Vec<String>,

    /// AFLOW prototype label of the structure (e.g. "AB_cF8_216_a_c")
    #[arg(long)]
    pub prototype: Option<String>,

    /// Nominal temperature in K written to structure records
    #[arg(long, default_value_t = 0.0)]
    pub temperature: f64,

    // ─────────────────────────────────────────────────────────────
    // 计算器参数
    // ─────────────────────────────────────────────────────────────
    /// Energy calculator
    #[arg(long, value_enum, default_value = "lj")]
    pub calculator: CalculatorKind,

    /// Lennard-Jones well depth in eV
    #[arg(long, default_value_t = 1.0)]
    pub epsilon: f64,

    /// Lennard-Jones zero-crossing distance in Å
    #[arg(long, default_value_t = 1.0)]
    pub sigma: f64,

    /// Lennard-Jones cutoff in Å
    #[arg(long, default_value_t = 2.5)]
    pub cutoff: f64,

    /// LAMMPS executable
    #[arg(long, default_value = "lmp", env = "EVCURVE_LAMMPS")]
    pub lammps_exec: String,

    /// Extra argument passed to LAMMPS before "-in" (repeatable)
    #[arg(long = "lammps-arg", allow_hyphen_values = true)]
    pub lammps_args: Vec<String>,

    /// KIM model name used by LAMMPS
    #[arg(short, long)]
    pub model: Option<String>,

    /// Atom styles to try in order (default: atomic,charge)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub atom_styles: Vec<AtomStyle>,

    /// Keep LAMMPS input and output files under DIR/<structure> instead of a temporary directory
    #[arg(long, value_name = "DIR")]
    pub keep_lammps_files: Option<PathBuf>,

    // ─────────────────────────────────────────────────────────────
    // 输出参数
    // ─────────────────────────────────────────────────────────────
    /// Property records output (.edn or .json)
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Write the curve as CSV: file (single mode) or directory (batch mode)
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Plot energy vs volume (PNG/SVG): file (single mode) or directory (batch mode)
    #[arg(long)]
    pub plot: Option<PathBuf>,

    // ─────────────────────────────────────────────────────────────
    // 批量处理参数
    // ─────────────────────────────────────────────────────────────
    /// Glob pattern for input files (batch mode)
    #[arg(long, default_value = "*.vasp,POSCAR*,CONTCAR*")]
    pub pattern: String,

    /// Number of parallel jobs (0 = auto, batch mode only)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Recurse into subdirectories (batch mode)
    #[arg(long, default_value_t = false)]
    pub recursive: bool,
}

/// 解析 "SPECIES=EV" 形式的参考能量
pub fn parse_reference_energy(input: &str) -> Result<(String, f64), String> {
    let (species, value) = input
        .split_once('=')
        .ok_or_else(|| format!("Invalid reference energy '{}', expected SPECIES=EV", input))?;
    let species = species.trim();
    if species.is_empty() {
        return Err(format!("Missing species in reference energy '{}'", input));
    }
    let energy = value
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid energy value in '{}'", input))?;
    Ok((species.to_string(), energy))
}
