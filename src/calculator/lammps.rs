//! # LAMMPS 计算器
//!
//! 通过外部 LAMMPS 进程和 KIM 模型计算势能。
//!
//! ## 流程
//! 1. 在临时目录写入 `structure.data`（含 `Masses`）和 `in.lammps`
//! 2. 运行 `<lmp> -in in.lammps`，等待进程结束（无超时）
//! 3. 读取 `pe.out` 中的势能；弛豫时另有最大受力和 `relaxed.dump` 中的位置
//!
//! 模型需要的 atom_style 无法预先知道，因此依次尝试配置的各个样式
//! （默认 `atomic`，然后 `charge`），全部失败才算该点失败。
//!
//! ## 依赖关系
//! - 被 `calculator/mod.rs` 导出
//! - 使用 `models/structure.rs`
//! - 使用 `tempfile` 管理临时目录

use super::{ensure_finite, Calculator, RelaxSettings};
use crate::error::EvaluationError;
use crate::models::elements::atomic_mass;
use crate::models::{Crystal, Lattice};

use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

const DATA_FILE: &str = "structure.data";
const INPUT_FILE: &str = "in.lammps";
const ENERGY_FILE: &str = "pe.out";
const DUMP_FILE: &str = "relaxed.dump";

/// LAMMPS atom_style
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AtomStyle {
    /// id type x y z
    Atomic,
    /// id type q x y z
    Charge,
}

impl std::fmt::Display for AtomStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AtomStyle::Atomic => write!(f, "atomic"),
            AtomStyle::Charge => write!(f, "charge"),
        }
    }
}

/// 运行外部模拟的后端
pub trait SimulatorBackend {
    /// 单点势能 (eV)
    fn run_energy(
        &mut self,
        crystal: &Crystal,
        model: &str,
        style: AtomStyle,
    ) -> Result<f64, EvaluationError>;

    /// 固定晶胞最小化，返回弛豫后的分数坐标（与输入同一晶格基）
    fn run_relax(
        &mut self,
        crystal: &Crystal,
        model: &str,
        style: AtomStyle,
        settings: &RelaxSettings,
    ) -> Result<Vec<[f64; 3]>, EvaluationError>;
}

/// 带 atom_style 回退的 LAMMPS 计算器
pub struct LammpsCalculator<B> {
    backend: B,
    model: String,
    styles: Vec<AtomStyle>,
}

impl<B: SimulatorBackend> LammpsCalculator<B> {
    pub fn new(backend: B, model: impl Into<String>) -> Self {
        LammpsCalculator {
            backend,
            model: model.into(),
            styles: vec![AtomStyle::Atomic, AtomStyle::Charge],
        }
    }

    /// 设置尝试顺序；空列表保留默认顺序
    pub fn with_styles(mut self, styles: Vec<AtomStyle>) -> Self {
        if !styles.is_empty() {
            self.styles = styles;
        }
        self
    }

    pub fn styles(&self) -> &[AtomStyle] {
        &self.styles
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// 依次尝试各样式，返回第一个成功的结果
    fn with_fallback<T, F>(&mut self, mut run: F) -> Result<T, EvaluationError>
    where
        F: FnMut(&mut B, &str, AtomStyle) -> Result<T, EvaluationError>,
    {
        let mut attempts = Vec::new();

        for idx in 0..self.styles.len() {
            let style = self.styles[idx];
            match run(&mut self.backend, &self.model, style) {
                Ok(value) => {
                    // 成功的样式放到最前，后续网格点不再重复失败的尝试
                    if idx > 0 {
                        self.styles[..=idx].rotate_right(1);
                    }
                    return Ok(value);
                }
                Err(err @ EvaluationError::CommandNotFound { .. })
                | Err(err @ EvaluationError::NotConverged { .. }) => return Err(err),
                Err(err) => attempts.push((style.to_string(), err.to_string())),
            }
        }

        Err(EvaluationError::StylesExhausted { attempts })
    }
}

impl<B: SimulatorBackend> Calculator for LammpsCalculator<B> {
    fn name(&self) -> String {
        format!("LAMMPS/{}", self.model)
    }

    fn potential_energy(&mut self, crystal: &Crystal) -> Result<f64, EvaluationError> {
        let energy = self.with_fallback(|backend, model, style| {
            backend.run_energy(crystal, model, style)
        })?;
        ensure_finite(energy, "energy")
    }

    /// 由 LAMMPS 的 `minimize` 完成，不经过 `forces`
    fn relax_positions(
        &mut self,
        crystal: &mut Crystal,
        settings: &RelaxSettings,
    ) -> Result<(), EvaluationError> {
        let positions = {
            let current: &Crystal = crystal;
            self.with_fallback(|backend, model, style| {
                backend.run_relax(current, model, style, settings)
            })?
        };
        if positions.len() != crystal.num_atoms() {
            return Err(EvaluationError::Unphysical(format!(
                "relaxation returned {} positions for {} atoms",
                positions.len(),
                crystal.num_atoms()
            )));
        }
        for (atom, p) in crystal.atoms.iter_mut().zip(positions) {
            atom.position = p;
        }
        Ok(())
    }
}

/// 外部 LAMMPS 进程
#[derive(Debug, Clone)]
pub struct ExternalLammps {
    executable: String,
    args: Vec<String>,
    keep_dir: Option<PathBuf>,
}

impl ExternalLammps {
    pub fn new(executable: impl Into<String>) -> Self {
        ExternalLammps {
            executable: executable.into(),
            args: Vec::new(),
            keep_dir: None,
        }
    }

    /// 放在 `-in` 之前的额外参数（如 `-k on`，或包装脚本路径）
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// 在指定目录运行并保留输入输出文件，便于调试
    pub fn keep_files_in(mut self, dir: impl Into<PathBuf>) -> Self {
        self.keep_dir = Some(dir.into());
        self
    }

    /// 在工作目录中运行 `job`：保留目录或新建的临时目录
    fn in_workdir<T, F>(&self, style: AtomStyle, job: F) -> Result<T, EvaluationError>
    where
        F: FnOnce(&Path) -> Result<T, EvaluationError>,
    {
        if let Some(ref dir) = self.keep_dir {
            fs::create_dir_all(dir).map_err(|e| EvaluationError::Simulator {
                style: style.to_string(),
                reason: format!("creating {}: {}", dir.display(), e),
            })?;
            return job(dir);
        }

        let tmp = tempfile::Builder::new()
            .prefix("evcurve-lammps")
            .tempdir()
            .map_err(|e| EvaluationError::Simulator {
                style: style.to_string(),
                reason: format!("creating temporary directory: {}", e),
            })?;
        job(tmp.path())
    }

    /// 写输入、运行 LAMMPS，返回 `pe.out` 中的数值
    fn execute(
        &self,
        dir: &Path,
        crystal: &Crystal,
        model: &str,
        style: AtomStyle,
        relax: Option<&RelaxSettings>,
    ) -> Result<Vec<f64>, EvaluationError> {
        let io_failure = |what: &str, e: std::io::Error| EvaluationError::Simulator {
            style: style.to_string(),
            reason: format!("{}: {}", what, e),
        };

        fs::write(dir.join(DATA_FILE), write_data_file(crystal, style))
            .map_err(|e| io_failure("writing data file", e))?;
        fs::write(
            dir.join(INPUT_FILE),
            write_input_script(model, style, &crystal.species(), relax),
        )
        .map_err(|e| io_failure("writing input script", e))?;

        let output = Command::new(&self.executable)
            .args(&self.args)
            .args(["-in", INPUT_FILE, "-log", "none", "-screen", "none"])
            .current_dir(dir)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => EvaluationError::CommandNotFound {
                    command: self.executable.clone(),
                },
                _ => io_failure("spawning process", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = last_lines(if stderr.trim().is_empty() { &stdout } else { &stderr }, 5);
            return Err(EvaluationError::Simulator {
                style: style.to_string(),
                reason: format!("{} ({})", output.status, detail),
            });
        }

        let text = fs::read_to_string(dir.join(ENERGY_FILE))
            .map_err(|e| io_failure("reading energy output", e))?;
        let values: Option<Vec<f64>> = text
            .split_whitespace()
            .map(|s| s.parse::<f64>().ok())
            .collect();
        match values {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(EvaluationError::Simulator {
                style: style.to_string(),
                reason: format!("cannot parse energy from '{}'", text.trim()),
            }),
        }
    }
}

impl SimulatorBackend for ExternalLammps {
    fn run_energy(
        &mut self,
        crystal: &Crystal,
        model: &str,
        style: AtomStyle,
    ) -> Result<f64, EvaluationError> {
        self.in_workdir(style, |dir| {
            let values = self.execute(dir, crystal, model, style, None)?;
            Ok(values[0])
        })
    }

    fn run_relax(
        &mut self,
        crystal: &Crystal,
        model: &str,
        style: AtomStyle,
        settings: &RelaxSettings,
    ) -> Result<Vec<[f64; 3]>, EvaluationError> {
        self.in_workdir(style, |dir| {
            let values = self.execute(dir, crystal, model, style, Some(settings))?;
            let max_force = values.get(1).copied().ok_or_else(|| EvaluationError::Simulator {
                style: style.to_string(),
                reason: "minimizer did not report the residual force".to_string(),
            })?;
            if !(max_force < settings.force_tolerance) {
                return Err(EvaluationError::NotConverged {
                    steps: settings.max_steps,
                    max_force,
                });
            }

            let dump = fs::read_to_string(dir.join(DUMP_FILE)).map_err(|e| {
                EvaluationError::Simulator {
                    style: style.to_string(),
                    reason: format!("reading relaxed positions: {}", e),
                }
            })?;
            read_relaxed_positions(&dump, crystal).map_err(|reason| EvaluationError::Simulator {
                style: style.to_string(),
                reason,
            })
        })
    }
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join(" | ")
}

/// 把倾斜因子约化到 LAMMPS 允许的范围 |xy| <= lx/2 等
fn reduced_prism_lattice(lattice: &Lattice) -> Lattice {
    let p = lattice.lammps_prism();
    let (mut xy, mut xz, mut yz) = (p.xy, p.xz, p.yz);

    // c -> c - k b
    let k = (yz / p.ly).round();
    yz -= k * p.ly;
    xz -= k * xy;
    // c -> c - m a
    xz -= (xz / p.lx).round() * p.lx;
    // b -> b - n a
    xy -= (xy / p.lx).round() * p.lx;

    Lattice::from_vectors([[p.lx, 0.0, 0.0], [xy, p.ly, 0.0], [xz, yz, p.lz]])
}

/// 旋转到 LAMMPS 坐标系的原晶格（a 沿 x，b 在 xy 平面），分数坐标不变
fn aligned_lattice(lattice: &Lattice) -> Lattice {
    let p = lattice.lammps_prism();
    Lattice::from_vectors([[p.lx, 0.0, 0.0], [p.xy, p.ly, 0.0], [p.xz, p.yz, p.lz]])
}

/// 生成 read_data 结构文件
pub fn write_data_file(crystal: &Crystal, style: AtomStyle) -> String {
    // 在约化后的盒子中重新取分数坐标并回卷到 [0, 1)
    let aligned = aligned_lattice(&crystal.lattice);
    let boxed = reduced_prism_lattice(&crystal.lattice);
    let species = crystal.species();
    let m = boxed.matrix;

    let mut out = String::new();
    let _ = writeln!(out, "{} (written by evcurve)\n", crystal.name);
    let _ = writeln!(out, "{} atoms", crystal.num_atoms());
    let _ = writeln!(out, "{} atom types\n", species.len());
    let _ = writeln!(out, "0.0 {:.12} xlo xhi", m[0][0]);
    let _ = writeln!(out, "0.0 {:.12} ylo yhi", m[1][1]);
    let _ = writeln!(out, "0.0 {:.12} zlo zhi", m[2][2]);
    let _ = writeln!(out, "{:.12} {:.12} {:.12} xy xz yz\n", m[1][0], m[2][0], m[2][1]);

    // 未知元素的质量取 1；固定晶胞的能量和最小化结果与质量无关
    let _ = writeln!(out, "Masses\n");
    for (t, element) in species.iter().enumerate() {
        let _ = writeln!(out, "{} {} # {}", t + 1, atomic_mass(element).unwrap_or(1.0), element);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Atoms # {}\n", style);

    for (i, atom) in crystal.atoms.iter().enumerate() {
        let cart = aligned.frac_to_cart(atom.position);
        let frac = boxed
            .cart_to_frac(cart)
            .unwrap_or(atom.position)
            .map(|f| f - f.floor());
        let pos = boxed.frac_to_cart(frac);
        let type_id = species
            .iter()
            .position(|s| *s == atom.element)
            .map(|t| t + 1)
            .unwrap_or(1);

        match style {
            AtomStyle::Atomic => {
                let _ = writeln!(
                    out,
                    "{} {} {:.12} {:.12} {:.12}",
                    i + 1,
                    type_id,
                    pos[0],
                    pos[1],
                    pos[2]
                );
            }
            AtomStyle::Charge => {
                let _ = writeln!(
                    out,
                    "{} {} 0.0 {:.12} {:.12} {:.12}",
                    i + 1,
                    type_id,
                    pos[0],
                    pos[1],
                    pos[2]
                );
            }
        }
    }

    out
}

/// 生成 LAMMPS 输入脚本
///
/// `relax` 给定时先在固定盒子下最小化，`pe.out` 额外写出残余最大受力，
/// 弛豫后的位置写入 `relaxed.dump`。
pub fn write_input_script(
    model: &str,
    style: AtomStyle,
    species: &[String],
    relax: Option<&RelaxSettings>,
) -> String {
    let mut script = format!(
        r#"kim init {model} metal unit_conversion_mode
boundary p p p
atom_style {style}
read_data {data}
kim interactions {species}
"#,
        model = model,
        style = style,
        data = DATA_FILE,
        species = species.join(" "),
    );

    match relax {
        Some(settings) => {
            let _ = write!(
                script,
                r#"thermo_style custom step pe fmax
min_style cg
minimize 0.0 {ftol:e} {steps} {evals}
variable pe equal pe
variable fmax equal fmax
print "${{pe}} ${{fmax}}" file {energy}
write_dump all custom {dump} id x y z modify sort id format float %.15g
"#,
                ftol = settings.force_tolerance,
                steps = settings.max_steps,
                evals = settings.max_steps.saturating_mul(10),
                energy = ENERGY_FILE,
                dump = DUMP_FILE,
            );
        }
        None => {
            let _ = write!(
                script,
                r#"run 0
variable pe equal pe
print "${{pe}}" file {energy}
"#,
                energy = ENERGY_FILE,
            );
        }
    }

    script
}

/// 解析 `write_dump ... id x y z` 的输出，转换为原晶格基下的分数坐标
///
/// 周期平移按最接近输入位置的像选取。
pub fn read_relaxed_positions(dump: &str, crystal: &Crystal) -> Result<Vec<[f64; 3]>, String> {
    let aligned = aligned_lattice(&crystal.lattice);
    let n = crystal.num_atoms();
    let mut positions: Vec<Option<[f64; 3]>> = vec![None; n];

    let body = dump
        .lines()
        .skip_while(|l| !l.starts_with("ITEM: ATOMS"))
        .skip(1)
        .take_while(|l| !l.starts_with("ITEM:"));

    for line in body.filter(|l| !l.trim().is_empty()) {
        let fields: Vec<f64> = line
            .split_whitespace()
            .map(|t| t.parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| format!("malformed dump line '{}'", line.trim()))?;
        if fields.len() != 4 {
            return Err(format!("malformed dump line '{}'", line.trim()));
        }

        let id = fields[0] as usize;
        if id < 1 || id > n {
            return Err(format!("atom id {} out of range", id));
        }
        let frac = aligned
            .cart_to_frac([fields[1], fields[2], fields[3]])
            .ok_or_else(|| "cell is singular".to_string())?;
        let orig = crystal.atoms[id - 1].position;
        positions[id - 1] = Some([0, 1, 2].map(|k| frac[k] + (orig[k] - frac[k]).round()));
    }

    positions
        .into_iter()
        .enumerate()
        .map(|(i, p)| p.ok_or_else(|| format!("no relaxed position for atom {}", i + 1)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Atom;

    fn zincblende() -> Crystal {
        let a = 5.4093;
        Crystal::new(
            "ZnS",
            Lattice::from_vectors([
                [0.0, a / 2.0, a / 2.0],
                [a / 2.0, 0.0, a / 2.0],
                [a / 2.0, a / 2.0, 0.0],
            ]),
            vec![
                Atom::new("Zn", [0.0, 0.0, 0.0]),
                Atom::new("S", [0.25, 0.25, 0.25]),
            ],
        )
    }

    /// 只接受 charge 样式的模型
    struct ChargeOnlyModel {
        calls: Vec<AtomStyle>,
    }

    impl SimulatorBackend for ChargeOnlyModel {
        fn run_energy(
            &mut self,
            _crystal: &Crystal,
            _model: &str,
            style: AtomStyle,
        ) -> Result<f64, EvaluationError> {
            self.calls.push(style);
            match style {
                AtomStyle::Charge => Ok(-7.5),
                AtomStyle::Atomic => Err(EvaluationError::Simulator {
                    style: style.to_string(),
                    reason: "model requires charges".to_string(),
                }),
            }
        }

        fn run_relax(
            &mut self,
            crystal: &Crystal,
            model: &str,
            style: AtomStyle,
            _settings: &RelaxSettings,
        ) -> Result<Vec<[f64; 3]>, EvaluationError> {
            self.run_energy(crystal, model, style)?;
            Ok(crystal.atoms.iter().map(|a| a.position.map(|x| x + 0.01)).collect())
        }
    }

    struct BrokenModel;

    impl SimulatorBackend for BrokenModel {
        fn run_energy(
            &mut self,
            _crystal: &Crystal,
            _model: &str,
            style: AtomStyle,
        ) -> Result<f64, EvaluationError> {
            Err(EvaluationError::Simulator {
                style: style.to_string(),
                reason: "exit status 1".to_string(),
            })
        }

        fn run_relax(
            &mut self,
            _crystal: &Crystal,
            _model: &str,
            _style: AtomStyle,
            settings: &RelaxSettings,
        ) -> Result<Vec<[f64; 3]>, EvaluationError> {
            Err(EvaluationError::NotConverged {
                steps: settings.max_steps,
                max_force: 0.5,
            })
        }
    }

    #[test]
    fn test_falls_back_to_charge_style() {
        let backend = ChargeOnlyModel { calls: Vec::new() };
        let mut calc = LammpsCalculator::new(backend, "SW_Test__MO_000000000000_000");

        let e = calc.potential_energy(&zincblende()).unwrap();
        assert_eq!(e, -7.5);
        assert_eq!(calc.backend().calls, vec![AtomStyle::Atomic, AtomStyle::Charge]);
    }

    #[test]
    fn test_successful_style_is_tried_first_afterwards() {
        let backend = ChargeOnlyModel { calls: Vec::new() };
        let mut calc = LammpsCalculator::new(backend, "model");

        calc.potential_energy(&zincblende()).unwrap();
        calc.potential_energy(&zincblende()).unwrap();

        assert_eq!(calc.styles()[0], AtomStyle::Charge);
        assert_eq!(calc.backend().calls.len(), 3);
    }

    #[test]
    fn test_all_styles_failing_is_exhausted() {
        let mut calc = LammpsCalculator::new(BrokenModel, "model");
        match calc.potential_energy(&zincblende()) {
            Err(EvaluationError::StylesExhausted { attempts }) => {
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[0].0, "atomic");
                assert_eq!(attempts[1].0, "charge");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_data_file_layout() {
        let crystal = zincblende();
        let atomic = write_data_file(&crystal, AtomStyle::Atomic);
        assert!(atomic.contains("2 atoms"));
        assert!(atomic.contains("2 atom types"));
        assert!(atomic.contains("Atoms # atomic"));
        assert!(atomic.contains("xy xz yz"));

        let charge = write_data_file(&crystal, AtomStyle::Charge);
        let first_atom = charge
            .lines()
            .skip_while(|l| !l.starts_with("Atoms"))
            .nth(2)
            .unwrap();
        let fields: Vec<&str> = first_atom.split_whitespace().collect();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[2], "0.0");
    }

    #[test]
    fn test_data_file_lists_masses_in_type_order() {
        let data = write_data_file(&zincblende(), AtomStyle::Atomic);
        let masses: Vec<&str> = data
            .lines()
            .skip_while(|l| *l != "Masses")
            .skip(2)
            .take(2)
            .collect();
        assert_eq!(masses, vec!["1 65.38 # Zn", "2 32.06 # S"]);

        // Masses 段在 Atoms 之前
        assert!(data.find("Masses").unwrap() < data.find("Atoms").unwrap());
    }

    #[test]
    fn test_unknown_element_gets_unit_mass() {
        let crystal = Crystal::new(
            "X",
            Lattice::cubic(3.0),
            vec![Atom::new("Xx", [0.0, 0.0, 0.0])],
        );
        let data = write_data_file(&crystal, AtomStyle::Atomic);
        assert!(data.contains("1 1 # Xx"));
    }

    #[test]
    fn test_reduced_box_keeps_volume_and_limits_tilt() {
        let crystal = zincblende();
        let boxed = reduced_prism_lattice(&crystal.lattice);
        let m = boxed.matrix;
        assert!((boxed.volume() - crystal.volume()).abs() < 1e-8);
        assert!(m[1][0].abs() <= 0.5 * m[0][0] + 1e-9);
        assert!(m[2][0].abs() <= 0.5 * m[0][0] + 1e-9);
        assert!(m[2][1].abs() <= 0.5 * m[1][1] + 1e-9);
    }

    #[test]
    fn test_input_script_names_species_in_type_order() {
        let script = write_input_script(
            "SW_ZhouWardMartin_2013_CdTeZnSeHgS__MO_503261197030_003",
            AtomStyle::Charge,
            &["Zn".to_string(), "S".to_string()],
            None,
        );
        assert!(script.contains("atom_style charge"));
        assert!(script.contains("kim interactions Zn S"));
        assert!(script.contains("run 0"));
        assert!(script.contains("print \"${pe}\" file pe.out"));
        assert!(!script.contains("minimize"));
    }

    #[test]
    fn test_relax_script_minimizes_and_dumps_positions() {
        let settings = RelaxSettings {
            force_tolerance: 1e-3,
            max_steps: 200,
        };
        let script = write_input_script("model", AtomStyle::Atomic, &["Si".to_string()], Some(&settings));
        assert!(script.contains("min_style cg"));
        assert!(script.contains("minimize 0.0 1e-3 200 2000"));
        assert!(script.contains("print \"${pe} ${fmax}\" file pe.out"));
        assert!(script.contains("write_dump all custom relaxed.dump id x y z"));
        assert!(!script.contains("run 0"));
    }

    #[test]
    fn test_relaxed_positions_are_ordered_and_unwrapped() {
        let crystal = Crystal::new(
            "pair",
            Lattice::cubic(4.0),
            vec![
                Atom::new("Si", [0.0, 0.0, 0.0]),
                Atom::new("Si", [0.98, 0.5, 0.5]),
            ],
        );
        // id 乱序；原子 2 被回卷到盒子另一侧
        let dump = "ITEM: TIMESTEP\n0\nITEM: NUMBER OF ATOMS\n2\n\
                    ITEM: BOX BOUNDS xy xz yz pp pp pp\n0 4 0\n0 4 0\n0 4 0\n\
                    ITEM: ATOMS id x y z\n2 0.04 2.0 2.0\n1 0.0 0.0 0.0\n";
        let positions = read_relaxed_positions(dump, &crystal).unwrap();
        assert_eq!(positions[0], [0.0, 0.0, 0.0]);
        assert!((positions[1][0] - 1.01).abs() < 1e-12);
        assert!((positions[1][1] - 0.5).abs() < 1e-12);

        let missing = "ITEM: ATOMS id x y z\n1 0.0 0.0 0.0\n";
        assert!(read_relaxed_positions(missing, &crystal).is_err());
    }

    #[test]
    fn test_relax_uses_fallback_style() {
        let backend = ChargeOnlyModel { calls: Vec::new() };
        let mut calc = LammpsCalculator::new(backend, "model");
        let mut crystal = zincblende();

        calc.relax_positions(&mut crystal, &RelaxSettings::default()).unwrap();
        assert_eq!(calc.backend().calls, vec![AtomStyle::Atomic, AtomStyle::Charge]);
        assert!((crystal.atoms[1].position[0] - 0.26).abs() < 1e-12);
    }

    #[test]
    fn test_unconverged_minimization_is_not_retried() {
        let mut calc = LammpsCalculator::new(BrokenModel, "model");
        let err = calc
            .relax_positions(&mut zincblende(), &RelaxSettings::default())
            .unwrap_err();
        assert!(matches!(err, EvaluationError::NotConverged { steps: 1000, .. }));
    }

    #[test]
    fn test_missing_executable_is_reported() {
        let backend = ExternalLammps::new("evcurve-no-such-lammps-binary");
        let mut calc = LammpsCalculator::new(backend, "model");
        let err = calc.potential_energy(&zincblende()).unwrap_err();
        assert!(matches!(err, EvaluationError::CommandNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_external_process_handoff_with_fallback() {
        // 代替 lmp 的脚本：只接受 charge 样式
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake_lmp.sh");
        fs::write(
            &script,
            "grep -q 'atom_style charge' in.lammps || { echo 'bad atom style' >&2; exit 1; }\n\
             grep -q '^Atoms # charge' structure.data || exit 2\n\
             grep -q '^Masses' structure.data || exit 3\n\
             echo '-4.25' > pe.out\n",
        )
        .unwrap();

        let backend = ExternalLammps::new("sh").with_args([script.display().to_string()]);
        let mut calc = LammpsCalculator::new(backend, "model");
        let e = calc.potential_energy(&zincblende()).unwrap();
        assert_eq!(e, -4.25);
    }

    #[cfg(unix)]
    fn fake_minimizer(dir: &Path, max_force: &str) -> ExternalLammps {
        // 报告给定残余受力，并写出 id 乱序的弛豫位置
        let script = dir.join("fake_min.sh");
        fs::write(
            &script,
            format!(
                "grep -q '^minimize' in.lammps || exit 1\n\
                 grep -q '^Masses' structure.data || exit 3\n\
                 echo '-8.5 {}' > pe.out\n\
                 printf 'ITEM: ATOMS id x y z\\n2 2.0 2.0 2.0\\n1 0.0 0.0 0.0\\n' > relaxed.dump\n",
                max_force
            ),
        )
        .unwrap();
        ExternalLammps::new("sh").with_args([script.display().to_string()])
    }

    #[cfg(unix)]
    fn displaced_pair() -> Crystal {
        Crystal::new(
            "pair",
            Lattice::cubic(4.0),
            vec![
                Atom::new("Si", [0.0, 0.0, 0.0]),
                Atom::new("Si", [0.45, 0.5, 0.52]),
            ],
        )
    }

    #[cfg(unix)]
    #[test]
    fn test_external_minimization_updates_positions() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        let backend = fake_minimizer(dir.path(), "1e-6").keep_files_in(work.clone());
        let mut calc = LammpsCalculator::new(backend, "model");
        let mut crystal = displaced_pair();

        calc.relax_positions(&mut crystal, &RelaxSettings::default()).unwrap();
        assert_eq!(crystal.atoms[0].position, [0.0, 0.0, 0.0]);
        for x in crystal.atoms[1].position {
            assert!((x - 0.5).abs() < 1e-12);
        }

        // 保留目录里留有输入和输出
        assert!(work.join(DATA_FILE).exists());
        assert!(work.join(INPUT_FILE).exists());
        assert!(work.join(DUMP_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_external_minimization_above_tolerance_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut calc = LammpsCalculator::new(fake_minimizer(dir.path(), "0.2"), "model");
        let mut crystal = displaced_pair();

        let err = calc
            .relax_positions(&mut crystal, &RelaxSettings::default())
            .unwrap_err();
        match err {
            EvaluationError::NotConverged { max_force, .. } => assert_eq!(max_force, 0.2),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(crystal, displaced_pair());
    }
}
