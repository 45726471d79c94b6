//! # scan 子命令实现
//!
//! 读取结构，构造计算器和对称性分析器，运行体积扫描并输出结果。
//!
//! ## 功能
//! - 每个网格点先在固定晶胞下弛豫原子位置（`--no-relax` 关闭）
//! - 单文件模式：进度条、曲线表格、记录文件、可选 CSV 和图
//! - 批量模式：目录中每个结构一次独立扫描（rayon 并行），
//!   记录按输入顺序合并写入同一个文件
//!
//! ## 依赖关系
//! - 使用 `cli/scan.rs` 定义的 ScanArgs
//! - 使用 `driver/` 进行扫描, `calculator/` 计算能量
//! - 使用 `batch/` 模块进行批量处理
//! - 使用 `export/` 写出记录、CSV 和图

use crate::batch::{BatchRunner, FileCollector, ProcessResult};
use crate::calculator::{Calculator, ExternalLammps, LammpsCalculator, LennardJones};
use crate::cli::scan::{parse_reference_energy, CalculatorKind, ScanArgs};
use crate::driver::{NominalStructure, ScanConfig, VolumeScanDriver};
use crate::error::{EvError, Result};
use crate::export::{self, FileSink, MemorySink, PropertySink};
use crate::models::{Crystal, EnergyVolumeCurve, PropertyRecord};
use crate::parsers;
use crate::parsers::prototype::space_group_from_prototype;
use crate::symmetry::MoyoAnalyzer;
use crate::utils::output;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

/// 曲线表格行
#[derive(Debug, Clone, Tabled)]
struct CurveRow {
    #[tabled(rename = "V/V0")]
    volume_scale: String,
    #[tabled(rename = "V (Å³)")]
    volume: String,
    #[tabled(rename = "V/atom (Å³)")]
    volume_per_atom: String,
    #[tabled(rename = "E/atom (eV)")]
    energy_per_atom: String,
    #[tabled(rename = "E/formula (eV)")]
    energy_per_formula: String,
}

/// 批量汇总表格行
#[derive(Debug, Clone, Tabled)]
struct SummaryRow {
    #[tabled(rename = "Structure")]
    name: String,
    #[tabled(rename = "Points")]
    points: String,
    #[tabled(rename = "V0/atom (Å³)")]
    volume: String,
    #[tabled(rename = "Emin/atom (eV)")]
    energy: String,
}

/// 一个结构的扫描结果
struct ScanOutcome {
    source: PathBuf,
    name: String,
    curve: EnergyVolumeCurve,
    records: Vec<PropertyRecord>,
}

/// 执行 scan 命令
pub fn execute(args: ScanArgs) -> Result<()> {
    output::print_header("Isotropic Energy-Volume Scan");

    let config = build_config(&args)?;
    if args.calculator == CalculatorKind::Lammps {
        ensure_executable(&args.lammps_exec)?;
    }

    if args.input.is_file() {
        execute_single_file(&args, &config)
    } else if args.input.is_dir() {
        execute_batch(&args, &config)
    } else {
        Err(EvError::FileNotFound {
            path: args.input.display().to_string(),
        })
    }
}

/// 合并配置文件和命令行参数
pub fn build_config(args: &ScanArgs) -> Result<ScanConfig> {
    let mut config = match args.config {
        Some(ref path) => ScanConfig::from_json_file(path)?,
        None => ScanConfig::default(),
    };

    if let Some(v) = args.max_volume_scale {
        config.max_volume_scale = v;
    }
    if let Some(n) = args.num_steps {
        config.num_steps = n;
    }
    if args.no_symmetry {
        config.verify_symmetry = false;
    }
    if args.record_structures {
        config.record_structure_per_point = true;
    }
    if args.no_relax {
        config.relax_positions = false;
    }
    if let Some(tol) = args.force_tolerance {
        config.force_tolerance = tol;
    }
    if let Some(steps) = args.max_relax_steps {
        config.max_relax_steps = steps;
    }
    for entry in &args.reference_energies {
        let (species, energy) = parse_reference_energy(entry).map_err(EvError::InvalidArgument)?;
        config.reference_energies.insert(species, energy);
    }

    config.validate()?;
    Ok(config)
}

/// 根据命令行参数构造计算器
///
/// `source` 为结构文件路径，保留 LAMMPS 文件时用其文件名区分子目录。
pub fn build_calculator(args: &ScanArgs, source: &Path) -> Result<Box<dyn Calculator>> {
    match args.calculator {
        CalculatorKind::Lj => {
            if !args.epsilon.is_finite() || !(args.sigma > 0.0) || !(args.cutoff > 0.0) {
                return Err(EvError::InvalidArgument(format!(
                    "invalid Lennard-Jones parameters: epsilon={}, sigma={}, cutoff={}",
                    args.epsilon, args.sigma, args.cutoff
                )));
            }
            Ok(Box::new(LennardJones::new(
                args.epsilon,
                args.sigma,
                args.cutoff,
            )))
        }
        CalculatorKind::Lammps => {
            let model = args.model.as_deref().ok_or_else(|| {
                EvError::InvalidArgument("--model is required with --calculator lammps".to_string())
            })?;
            let mut backend =
                ExternalLammps::new(args.lammps_exec.as_str()).with_args(args.lammps_args.iter().cloned());
            if let Some(ref dir) = args.keep_lammps_files {
                let stem = source
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("structure");
                backend = backend.keep_files_in(dir.join(stem));
            }
            Ok(Box::new(
                LammpsCalculator::new(backend, model).with_styles(args.atom_styles.clone()),
            ))
        }
    }
}

/// 检查外部可执行文件存在（路径或 PATH 中的命令名）
fn ensure_executable(command: &str) -> Result<()> {
    let path = Path::new(command);
    let found = if path.components().count() > 1 {
        path.is_file()
    } else {
        env::var_os("PATH")
            .map(|paths| env::split_paths(&paths).any(|dir| dir.join(command).is_file()))
            .unwrap_or(false)
    };

    if found {
        Ok(())
    } else {
        Err(EvError::CommandNotFound {
            command: command.to_string(),
        })
    }
}

/// 扫描一个结构
fn run_scan(
    source: &Path,
    crystal: Crystal,
    args: &ScanArgs,
    config: &ScanConfig,
    verbose: bool,
) -> Result<ScanOutcome> {
    let name = crystal.name.clone();
    let mut nominal = NominalStructure::new(crystal).with_temperature(args.temperature);
    if let Some(ref label) = args.prototype {
        nominal = nominal.with_prototype(label)?;
    }

    let calculator = build_calculator(args, source)?;
    if verbose {
        output::print_info(&format!("Calculator: {}", calculator.name()));
        output::print_info(&format!(
            "Grid: {} points, max volume change {:+.4}",
            config.num_points(),
            config.max_volume_scale
        ));
        match config.relax_settings() {
            Some(r) => output::print_info(&format!(
                "Relaxing positions: fmax < {:e} eV/Å, at most {} steps",
                r.force_tolerance, r.max_steps
            )),
            None => output::print_info("Relaxing positions: off"),
        }
        if let Some(label) = nominal.prototype_label() {
            output::print_info(&format!("Prototype: {}", label));
        }
    }

    let mut driver = VolumeScanDriver::new(calculator).verbose(verbose);
    if config.verify_symmetry {
        let analyzer = MoyoAnalyzer::new(args.symprec);
        nominal = nominal.with_symmetry(&analyzer)?;
        if verbose {
            if let Some(sym) = nominal.symmetry() {
                output::print_info(&format!("Nominal symmetry: {}", sym));
            }
        }
        if let Some((label, expected, found)) = prototype_mismatch(&nominal) {
            output::print_warning(&format!(
                "{}: prototype {} implies space group {}, structure has {}",
                name, label, expected, found
            ));
        }
        driver = driver.with_symmetry(Box::new(analyzer));
    }

    let (_, curve) = driver.scan_with_curve(&mut nominal, config)?;

    Ok(ScanOutcome {
        source: source.to_path_buf(),
        name,
        curve,
        records: driver.property_instances().to_vec(),
    })
}

/// 原型标签的空间群与检测到的空间群不一致时返回 (标签, 标签空间群, 检测空间群)
fn prototype_mismatch(nominal: &NominalStructure) -> Option<(String, u32, i32)> {
    let label = nominal.prototype_label()?;
    let expected = space_group_from_prototype(label)?;
    let found = nominal.symmetry()?.space_group;
    (i64::from(expected) != i64::from(found)).then(|| (label.to_string(), expected, found))
}

/// 单文件模式
fn execute_single_file(args: &ScanArgs, config: &ScanConfig) -> Result<()> {
    output::print_info(&format!("Single file mode: '{}'", args.input.display()));

    let crystal = parsers::parse_structure_file(&args.input)?;
    output::print_success(&format!(
        "Loaded structure: {} ({}, {} atoms, V = {:.4} Å³, {:.4} Å³/atom)",
        crystal.name,
        crystal.formula(),
        crystal.num_atoms(),
        crystal.volume(),
        crystal.volume_per_atom()
    ));

    let outcome = run_scan(&args.input, crystal, args, config, true)?;
    let curve = &outcome.curve;

    print_curve_table(curve);
    report_curve(curve);

    write_records(&outcome.records, &args.output)?;

    if let Some(ref path) = args.csv {
        export::curve::to_csv(curve, path)?;
        output::print_success(&format!("Curve saved to '{}'", path.display()));
    }

    if let Some(ref path) = args.plot {
        if curve.is_empty() {
            output::print_warning("No successful points, skipping plot");
        } else {
            export::plot::generate_ev_plot(curve, path, &outcome.name, 1200, 800)?;
            output::print_success(&format!("Plot saved to '{}'", path.display()));
        }
    }

    output::print_done("Scan complete");
    Ok(())
}

/// 批量处理模式
fn execute_batch(args: &ScanArgs, config: &ScanConfig) -> Result<()> {
    output::print_info(&format!("Batch mode: directory '{}'", args.input.display()));

    let files = FileCollector::new(args.input.clone())
        .with_pattern(&args.pattern)?
        .recursive(args.recursive)
        .collect();

    if files.is_empty() {
        return Err(EvError::NoFilesFound {
            pattern: args.pattern.clone(),
        });
    }
    output::print_info(&format!("Found {} structure files", files.len()));

    for dir in [&args.csv, &args.plot].into_iter().flatten() {
        fs::create_dir_all(dir).map_err(|e| EvError::FileWriteError {
            path: dir.display().to_string(),
            source: e,
        })?;
    }

    let runner = BatchRunner::new(args.jobs);
    output::print_info(&format!("Running on {} threads", runner.jobs()));

    let result = runner.run(files, |file| {
        match process_batch_file(file, args, config) {
            Ok(outcome) => ProcessResult::Success(outcome),
            Err(e) => ProcessResult::Failed(file.display().to_string(), e.to_string()),
        }
    })?;

    print_summary_table(&result.outputs);

    let records = merge_records(&result.outputs)?;

    output::print_separator();
    output::print_success(&format!(
        "Batch complete: {} success, {} failed",
        result.success(),
        result.failed()
    ));
    write_records(&records, &args.output)?;

    if !result.failures.is_empty() {
        output::print_warning("Failed files:");
        for (path, err) in result.failures.iter().take(10) {
            output::print_error(&format!("  {}: {}", path, err));
        }
        if result.failures.len() > 10 {
            output::print_warning(&format!("  ... and {} more", result.failures.len() - 10));
        }
    }

    output::print_done("Scan complete");
    Ok(())
}

/// 处理批量模式中的单个文件
fn process_batch_file(input: &Path, args: &ScanArgs, config: &ScanConfig) -> Result<ScanOutcome> {
    let crystal = parsers::parse_structure_file(input)?;
    let outcome = run_scan(input, crystal, args, config, false)?;

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("structure");

    if let Some(ref dir) = args.csv {
        export::curve::to_csv(&outcome.curve, &dir.join(format!("{}_ev.csv", stem)))?;
    }
    if let Some(ref dir) = args.plot {
        if !outcome.curve.is_empty() {
            export::plot::generate_ev_plot(
                &outcome.curve,
                &dir.join(format!("{}_ev.png", stem)),
                &outcome.name,
                1200,
                800,
            )?;
        }
    }

    Ok(outcome)
}

/// 按输入顺序合并各结构的记录，instance-id 重新连续编号
fn merge_records(outcomes: &[ScanOutcome]) -> Result<Vec<PropertyRecord>> {
    let mut merged = MemorySink::new();
    for record in outcomes.iter().flat_map(|o| o.records.iter()) {
        let id = merged.records().len() + 1;
        merged.push(record.clone().renumbered(id))?;
    }
    Ok(merged.into_records())
}

/// 写出记录文件
fn write_records(records: &[PropertyRecord], path: &Path) -> Result<()> {
    let mut sink = FileSink::new(path)?;
    for record in records {
        sink.push(record.clone())?;
    }
    sink.flush()?;
    output::print_success(&format!(
        "{} property record(s) written to '{}'",
        records.len(),
        sink.path().display()
    ));
    Ok(())
}

/// 打印曲线表格
fn print_curve_table(curve: &EnergyVolumeCurve) {
    let rows: Vec<CurveRow> = curve
        .samples
        .iter()
        .map(|s| CurveRow {
            volume_scale: format!("{:.4}", s.volume_scale),
            volume: format!("{:.4}", s.volume),
            volume_per_atom: format!("{:.4}", s.volume_per_atom),
            energy_per_atom: format!("{:.6}", s.binding_energy_per_atom),
            energy_per_formula: format!("{:.6}", s.binding_energy_per_formula),
        })
        .collect();

    if !rows.is_empty() {
        output::print_header(&format!(
            "Energy vs Volume ({} atoms per formula)",
            curve.atoms_per_formula
        ));
        println!("{}", Table::new(&rows));
    }
}

/// 打印最低点和失败点
fn report_curve(curve: &EnergyVolumeCurve) {
    if let Some(min) = curve.minimum() {
        output::print_value("Lowest V/atom", &format!("{:.4} Å³", min.volume_per_atom));
        output::print_value("Lowest E/atom", &format!("{:.6} eV", min.binding_energy_per_atom));
    }

    if curve.is_empty() {
        output::print_warning("No grid point could be evaluated");
    }
    if let Some(ref disclaimer) = curve.disclaimer {
        output::print_warning(&format!(
            "{} of {} points dropped: {}",
            curve.failures.len(),
            curve.failures.len() + curve.len(),
            disclaimer
        ));
        for (scale, reason) in curve.failures.iter().take(5) {
            output::print_warning(&format!("  V/V0 = {:.4}: {}", scale, reason));
        }
    }
}

/// 打印批量汇总表格
fn print_summary_table(outcomes: &[ScanOutcome]) {
    let rows: Vec<SummaryRow> = outcomes
        .iter()
        .map(|o| {
            let min = o.curve.minimum();
            SummaryRow {
                name: format!("{} ({})", o.name, o.source.display()),
                points: format!("{}/{}", o.curve.len(), o.curve.len() + o.curve.failures.len()),
                volume: min
                    .map(|s| format!("{:.4}", s.volume_per_atom))
                    .unwrap_or_else(|| "-".to_string()),
                energy: min
                    .map(|s| format!("{:.6}", s.binding_energy_per_atom))
                    .unwrap_or_else(|| "-".to_string()),
            }
        })
        .collect();

    if !rows.is_empty() {
        output::print_header("Scan Summary");
        println!("{}", Table::new(&rows));
    }
}
