//! # 各向同性体积扫描
//!
//! 在名义晶胞附近做对称网格扫描：第 i 个点的体积缩放因子为
//! `1 + (max_volume_scale / num_steps) * i`，i 取 `-num_steps..=num_steps`，
//! 晶格向量按其立方根缩放，分数坐标不变。
//!
//! 每个网格点先在固定晶胞下弛豫原子位置（可关闭），再检查对称性并计算能量。
//!
//! 单点失败（计算器出错、弛豫不收敛、对称性改变、体积非正）只丢弃该点并设置免责声明，
//! 扫描继续。扫描结束后名义结构恢复为扫描前的状态。
//!
//! ## 依赖关系
//! - 被 `commands/scan.rs` 调用
//! - 使用 `calculator/` 的 `Calculator` trait
//! - 使用 `driver/nominal.rs`, `driver/config.rs`
//! - 使用 `export/records.rs` 持久化累积的记录

use super::{NominalStructure, ScanConfig};
use crate::calculator::{Calculator, RelaxSettings};
use crate::error::{EvError, EvaluationError, Result};
use crate::export::records::{FileSink, PropertySink};
use crate::models::property::{CRYSTAL_STRUCTURE_NPT, ENERGY_VS_VOLUME};
use crate::models::{Crystal, EnergyVolumeCurve, PointOutcome, PropertyRecord, Sample};
use crate::symmetry::SymmetryAnalyzer;
use crate::utils::{output, progress};

use std::path::Path;

/// 至少一个网格点失败时写入记录的免责声明
pub const PARTIAL_FAILURE_DISCLAIMER: &str = "At least one of the requested deformations of the \
unit cell underwent a phase transformation or otherwise failed to evaluate.";

/// 生成体积缩放因子网格，共 `2 * num_steps + 1` 个点
pub fn volume_grid(max_volume_scale: f64, num_steps: u32) -> Vec<f64> {
    let step = max_volume_scale / num_steps as f64;
    let n = num_steps as i64;
    (-n..=n).map(|i| 1.0 + step * i as f64).collect()
}

/// 单次扫描中各网格点共用的量
struct PointContext<'a> {
    original: &'a Crystal,
    num_atoms: f64,
    atoms_per_formula: f64,
    reference_energy: f64,
    relax: Option<RelaxSettings>,
}

/// 体积扫描驱动
///
/// 在整个生命周期内累积每次扫描产生的性质记录。
pub struct VolumeScanDriver<C> {
    calculator: C,
    analyzer: Option<Box<dyn SymmetryAnalyzer>>,
    property_instances: Vec<PropertyRecord>,
    verbose: bool,
}

impl<C: Calculator> VolumeScanDriver<C> {
    pub fn new(calculator: C) -> Self {
        VolumeScanDriver {
            calculator,
            analyzer: None,
            property_instances: Vec::new(),
            verbose: false,
        }
    }

    /// 附加对称性分析器；`verify_symmetry` 为真时每个网格点都会检查
    pub fn with_symmetry(mut self, analyzer: Box<dyn SymmetryAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// 显示进度条和单点失败信息
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn calculator(&self) -> &C {
        &self.calculator
    }

    /// 执行扫描，返回 E-V 曲线，不生成记录
    pub fn scan_curve(
        &mut self,
        nominal: &mut NominalStructure,
        config: &ScanConfig,
    ) -> Result<EnergyVolumeCurve> {
        config.validate()?;
        if nominal.crystal().atoms.is_empty() {
            return Err(EvError::InvalidArgument(
                "structure has no atoms".to_string(),
            ));
        }

        if config.verify_symmetry && self.analyzer.is_none() {
            return Err(EvError::InvalidArgument(
                "verify_symmetry is set but no symmetry analyzer is attached".to_string(),
            ));
        }

        let atoms_per_formula = nominal.atoms_per_formula()?;
        let reference_energy = config.reference_energy(nominal.crystal())?;

        let analyzer = if config.verify_symmetry {
            self.analyzer.take()
        } else {
            None
        };
        let result = self.run_grid(
            nominal,
            config,
            analyzer.as_deref(),
            atoms_per_formula,
            reference_energy,
        );
        if analyzer.is_some() {
            self.analyzer = analyzer;
        }
        result
    }

    fn run_grid(
        &mut self,
        nominal: &mut NominalStructure,
        config: &ScanConfig,
        analyzer: Option<&dyn SymmetryAnalyzer>,
        atoms_per_formula: u32,
        reference_energy: f64,
    ) -> Result<EnergyVolumeCurve> {
        // 网格点对称性与扫描前的结构比较
        let original = match analyzer {
            Some(a) if nominal.symmetry().is_none() => nominal.clone().with_symmetry(a)?,
            _ => nominal.clone(),
        };

        let ctx = PointContext {
            original: original.crystal(),
            num_atoms: original.crystal().num_atoms() as f64,
            atoms_per_formula: atoms_per_formula as f64,
            reference_energy,
            relax: config.relax_settings(),
        };

        let grid = volume_grid(config.max_volume_scale, config.num_steps);
        let pb = self
            .verbose
            .then(|| progress::create_progress_bar(grid.len() as u64, "Scanning volumes"));

        let mut curve = EnergyVolumeCurve {
            atoms_per_formula,
            ..EnergyVolumeCurve::default()
        };

        for &volume_scale in &grid {
            match self.evaluate_point(&ctx, nominal, analyzer, volume_scale) {
                PointOutcome::Accepted(sample) => curve.samples.push(sample),
                PointOutcome::Failed {
                    volume_scale,
                    volume,
                    reason,
                } => {
                    if let Some(ref pb) = pb {
                        pb.suspend(|| {
                            output::print_warning(&format!(
                                "V/V0 = {:.4} (V = {:.4} A^3) dropped: {}",
                                volume_scale, volume, reason
                            ))
                        });
                    }
                    curve.failures.push((volume_scale, reason));
                    curve.disclaimer = Some(PARTIAL_FAILURE_DISCLAIMER.to_string());
                }
            }
            if let Some(ref pb) = pb {
                pb.inc(1);
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        // 恢复并重新提交原结构
        *nominal = original;

        Ok(curve)
    }

    fn evaluate_point(
        &mut self,
        ctx: &PointContext<'_>,
        nominal: &mut NominalStructure,
        analyzer: Option<&dyn SymmetryAnalyzer>,
        volume_scale: f64,
    ) -> PointOutcome {
        let mut working = ctx.original.clone();
        working.scale_isotropic(volume_scale);
        let volume = ctx.original.volume() * volume_scale;

        match self.evaluate(ctx, nominal, analyzer, working, volume_scale) {
            Ok(sample) => PointOutcome::Accepted(sample),
            Err(err) => PointOutcome::Failed {
                volume_scale,
                volume,
                reason: err.to_string(),
            },
        }
    }

    fn evaluate(
        &mut self,
        ctx: &PointContext<'_>,
        nominal: &mut NominalStructure,
        analyzer: Option<&dyn SymmetryAnalyzer>,
        mut working: Crystal,
        volume_scale: f64,
    ) -> std::result::Result<Sample, EvaluationError> {
        if !(volume_scale > 0.0) {
            return Err(EvaluationError::Unphysical(format!(
                "volume scale {} gives a non-positive volume",
                volume_scale
            )));
        }

        let relaxed_positions = match ctx.relax {
            Some(ref settings) => {
                self.calculator.relax_positions(&mut working, settings)?;
                working.atoms.iter().map(|a| a.position).collect()
            }
            None => Vec::new(),
        };

        if let Some(a) = analyzer {
            nominal.update(working.clone(), a)?;
        }

        let potential_energy = self.calculator.potential_energy(&working)?;
        let stress = self.calculator.stress(&working)?;

        let volume = working.volume();
        let volume_per_atom = volume / ctx.num_atoms;
        let binding_energy_per_atom = (potential_energy - ctx.reference_energy) / ctx.num_atoms;

        Ok(Sample {
            volume_scale,
            volume,
            volume_per_atom,
            volume_per_formula: volume_per_atom * ctx.atoms_per_formula,
            potential_energy,
            binding_energy_per_atom,
            binding_energy_per_formula: binding_energy_per_atom * ctx.atoms_per_formula,
            stress,
            relaxed_positions,
        })
    }

    /// 执行扫描并生成 energy-vs-volume-isotropic-crystal 记录
    ///
    /// 记录追加到驱动累积的列表中并返回其副本。
    pub fn scan(
        &mut self,
        nominal: &mut NominalStructure,
        config: &ScanConfig,
    ) -> Result<PropertyRecord> {
        self.scan_with_curve(nominal, config).map(|(record, _)| record)
    }

    /// 同 `scan`，另外返回曲线本身（含失败点）
    pub fn scan_with_curve(
        &mut self,
        nominal: &mut NominalStructure,
        config: &ScanConfig,
    ) -> Result<(PropertyRecord, EnergyVolumeCurve)> {
        let curve = self.scan_curve(nominal, config)?;

        if config.record_structure_per_point {
            for sample in &curve.samples {
                let record = self.structure_record(nominal, sample);
                self.property_instances.push(record);
            }
        }

        let record = self.energy_record(nominal, &curve);
        self.property_instances.push(record.clone());
        Ok((record, curve))
    }

    fn next_instance_id(&self) -> usize {
        self.property_instances.len() + 1
    }

    fn structure_record(&self, nominal: &NominalStructure, sample: &Sample) -> PropertyRecord {
        let mut crystal = nominal.crystal().clone();
        crystal.scale_isotropic(sample.volume_scale);
        if sample.relaxed_positions.len() == crystal.num_atoms() {
            for (atom, p) in crystal.atoms.iter_mut().zip(&sample.relaxed_positions) {
                atom.position = *p;
            }
        }
        let coordinates: Vec<[f64; 3]> = crystal.atoms.iter().map(|a| a.position).collect();

        let mut record = PropertyRecord::new(CRYSTAL_STRUCTURE_NPT, self.next_instance_id());
        nominal.add_common_keys_for(&crystal, &mut record);

        let stress = sample.stress.unwrap_or(nominal.cell_cauchy_stress);
        record.add_key("coordinates-of-basis-atoms", coordinates.as_slice(), None);
        record.add_key("cell-cauchy-stress", stress.to_vec(), Some("eV/angstrom^3"));
        record.add_key("temperature", nominal.temperature, Some("K"));
        record
    }

    fn energy_record(&self, nominal: &NominalStructure, curve: &EnergyVolumeCurve) -> PropertyRecord {
        let mut record = PropertyRecord::new(ENERGY_VS_VOLUME, self.next_instance_id())
            .with_disclaimer(curve.disclaimer.clone());
        nominal.add_common_keys(&mut record);

        let zeros = vec![0.0; curve.len()];
        record
            .add_key("volume-per-atom", curve.volume_per_atom(), Some("angstrom^3"))
            .add_key(
                "volume-per-formula",
                curve.volume_per_formula(),
                Some("angstrom^3"),
            )
            .add_key_with_uncertainty(
                "binding-potential-energy-per-atom",
                curve.binding_energy_per_atom(),
                Some("eV"),
                zeros.clone(),
            )
            .add_key_with_uncertainty(
                "binding-potential-energy-per-formula",
                curve.binding_energy_per_formula(),
                Some("eV"),
                zeros,
            );
        record
    }

    /// 驱动至今产生的全部记录
    pub fn property_instances(&self) -> &[PropertyRecord] {
        &self.property_instances
    }

    pub fn clear_property_instances(&mut self) {
        self.property_instances.clear();
    }

    /// 写出累积的记录（`.edn` 或 `.json`）
    pub fn write_property_instances_to_file(&self, path: &Path) -> Result<()> {
        let mut sink = FileSink::new(path)?;
        for record in &self.property_instances {
            sink.push(record.clone())?;
        }
        sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::LennardJones;
    use crate::error::SymmetryError;
    use crate::models::{Atom, Lattice};
    use crate::symmetry::SymmetryDescriptor;

    /// E = (V - V0)^2，可指定在某些缩放因子处失败
    struct Parabola {
        v0: f64,
        fail_at: Vec<f64>,
        calls: usize,
    }

    impl Parabola {
        fn new(v0: f64) -> Self {
            Parabola {
                v0,
                fail_at: Vec::new(),
                calls: 0,
            }
        }

        fn failing_at(mut self, volume_scales: &[f64]) -> Self {
            self.fail_at = volume_scales.iter().map(|s| s * self.v0).collect();
            self
        }
    }

    impl Calculator for Parabola {
        fn name(&self) -> String {
            "parabola".to_string()
        }

        fn potential_energy(&mut self, crystal: &Crystal) -> std::result::Result<f64, EvaluationError> {
            self.calls += 1;
            let v = crystal.volume();
            if self.fail_at.iter().any(|f| (f - v).abs() < 1e-9) {
                return Err(EvaluationError::Unphysical("forced failure".to_string()));
            }
            Ok((v - self.v0).powi(2))
        }
    }

    /// 分数坐标上的谐振势阱，极小在 `target`，与体积无关
    struct Wells {
        target: Vec<[f64; 3]>,
    }

    impl Wells {
        fn displacement(&self, crystal: &Crystal, i: usize) -> [f64; 3] {
            let p = crystal.atoms[i].position;
            let t = self.target[i];
            crystal
                .lattice
                .frac_to_cart([p[0] - t[0], p[1] - t[1], p[2] - t[2]])
        }
    }

    impl Calculator for Wells {
        fn name(&self) -> String {
            "wells".to_string()
        }

        fn potential_energy(&mut self, crystal: &Crystal) -> std::result::Result<f64, EvaluationError> {
            Ok((0..crystal.num_atoms())
                .map(|i| self.displacement(crystal, i).iter().map(|x| 0.5 * x * x).sum::<f64>())
                .sum())
        }

        fn forces(
            &mut self,
            crystal: &Crystal,
        ) -> std::result::Result<Option<Vec<[f64; 3]>>, EvaluationError> {
            Ok(Some(
                (0..crystal.num_atoms())
                    .map(|i| self.displacement(crystal, i).map(|x| -x))
                    .collect(),
            ))
        }
    }

    /// 体积超过阈值时报告不同空间群
    struct TransitionAbove(f64);

    impl SymmetryAnalyzer for TransitionAbove {
        fn describe(&self, crystal: &Crystal) -> std::result::Result<SymmetryDescriptor, SymmetryError> {
            let sg = if crystal.volume() > self.0 { 194 } else { 225 };
            Ok(SymmetryDescriptor::new(sg, vec![("Ar".to_string(), 'a')]))
        }
    }

    fn argon() -> Crystal {
        let a = 5.26;
        Crystal::new(
            "Ar",
            Lattice::cubic(a),
            vec![
                Atom::new("Ar", [0.0, 0.0, 0.0]),
                Atom::new("Ar", [0.5, 0.5, 0.0]),
                Atom::new("Ar", [0.5, 0.0, 0.5]),
                Atom::new("Ar", [0.0, 0.5, 0.5]),
            ],
        )
    }

    fn config(max_volume_scale: f64, num_steps: u32) -> ScanConfig {
        ScanConfig {
            max_volume_scale,
            num_steps,
            verify_symmetry: false,
            ..ScanConfig::default()
        }
    }

    #[test]
    fn test_grid_is_symmetric_and_ascending() {
        let grid = volume_grid(0.1, 4);
        assert_eq!(grid.len(), 9);
        assert!((grid[4] - 1.0).abs() < 1e-15);
        for i in 0..4 {
            assert!(((grid[i] - 1.0) + (grid[8 - i] - 1.0)).abs() < 1e-12);
        }
        assert!(grid.windows(2).all(|w| w[0] < w[1]));
        assert!((grid[5] - grid[4] - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_three_point_example() {
        let crystal = argon();
        let v0 = crystal.volume();
        let mut nominal = NominalStructure::new(crystal);
        let mut driver = VolumeScanDriver::new(Parabola::new(v0));

        let record = driver.scan(&mut nominal, &config(0.1, 1)).unwrap();
        let vpa = record.vector("volume-per-atom").unwrap();
        let expected = [0.9 * v0 / 4.0, v0 / 4.0, 1.1 * v0 / 4.0];
        assert_eq!(vpa.len(), 3);
        for (got, want) in vpa.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-9, "{} vs {}", got, want);
        }
        assert!(record.disclaimer().is_none());

        // fcc: 每化学式 1 个原子
        assert_eq!(record.vector("volume-per-formula").unwrap(), vpa);
    }

    #[test]
    fn test_energies_and_uncertainty_block() {
        let crystal = argon();
        let v0 = crystal.volume();
        let mut nominal = NominalStructure::new(crystal);
        let mut driver = VolumeScanDriver::new(Parabola::new(v0));

        let record = driver.scan(&mut nominal, &config(0.1, 1)).unwrap();
        let e = record.vector("binding-potential-energy-per-atom").unwrap();
        let expected_edge = (0.1 * v0).powi(2) / 4.0;
        assert!((e[0] - expected_edge).abs() < 1e-6);
        assert!(e[1].abs() < 1e-12);

        let key = record.get("binding-potential-energy-per-atom").unwrap();
        assert_eq!(key.source_unit.as_deref(), Some("eV"));
        let uncert = key.source_std_uncert_value.as_ref().unwrap();
        assert_eq!(uncert.as_vector(), Some(&[0.0, 0.0, 0.0][..]));
        assert_eq!(
            record.get("volume-per-atom").unwrap().source_unit.as_deref(),
            Some("angstrom^3")
        );
    }

    #[test]
    fn test_geometry_restored_after_scan() {
        let crystal = argon();
        let mut nominal = NominalStructure::new(crystal.clone());
        let before = nominal.clone();
        let mut driver = VolumeScanDriver::new(LennardJones::new(0.0104, 3.4, 8.5));

        driver.scan(&mut nominal, &config(0.05, 3)).unwrap();
        assert_eq!(nominal, before);
        assert_eq!(nominal.crystal(), &crystal);
    }

    #[test]
    fn test_scan_is_idempotent() {
        let mut nominal = NominalStructure::new(argon());
        let mut driver = VolumeScanDriver::new(LennardJones::new(0.0104, 3.4, 8.5));

        let first = driver.scan(&mut nominal, &config(0.05, 2)).unwrap();
        let second = driver.scan(&mut nominal, &config(0.05, 2)).unwrap();
        assert_eq!(first.keys(), second.keys());
        assert_eq!(second.instance_id(), 2);
    }

    #[test]
    fn test_partial_failure_keeps_other_points() {
        let crystal = argon();
        let v0 = crystal.volume();
        let mut nominal = NominalStructure::new(crystal);
        let calc = Parabola::new(v0).failing_at(&[1.0]);
        let mut driver = VolumeScanDriver::new(calc);

        let record = driver.scan(&mut nominal, &config(0.1, 2)).unwrap();
        for key in [
            "volume-per-atom",
            "volume-per-formula",
            "binding-potential-energy-per-atom",
            "binding-potential-energy-per-formula",
        ] {
            assert_eq!(record.vector(key).unwrap().len(), 4, "{}", key);
        }
        assert_eq!(record.disclaimer(), Some(PARTIAL_FAILURE_DISCLAIMER));
        assert_eq!(driver.calculator().calls, 5);
    }

    #[test]
    fn test_total_failure_is_not_an_error() {
        let crystal = argon();
        let v0 = crystal.volume();
        let mut nominal = NominalStructure::new(crystal);
        let calc = Parabola::new(v0).failing_at(&[0.9, 1.0, 1.1]);
        let mut driver = VolumeScanDriver::new(calc);

        let record = driver.scan(&mut nominal, &config(0.1, 1)).unwrap();
        assert!(record.vector("volume-per-atom").unwrap().is_empty());
        assert!(record
            .vector("binding-potential-energy-per-formula")
            .unwrap()
            .is_empty());
        assert!(record.disclaimer().is_some());
    }

    #[test]
    fn test_invalid_parameters_evaluate_nothing() {
        let crystal = argon();
        let v0 = crystal.volume();
        let mut nominal = NominalStructure::new(crystal);
        let mut driver = VolumeScanDriver::new(Parabola::new(v0));

        assert!(driver.scan(&mut nominal, &config(0.1, 0)).is_err());
        assert!(driver.scan(&mut nominal, &config(f64::INFINITY, 2)).is_err());
        assert_eq!(driver.calculator().calls, 0);
        assert!(driver.property_instances().is_empty());
    }

    #[test]
    fn test_zero_scale_repeats_the_nominal_point() {
        let crystal = argon();
        let v0 = crystal.volume();
        let mut nominal = NominalStructure::new(crystal);
        let mut driver = VolumeScanDriver::new(Parabola::new(v0));

        let curve = driver.scan_curve(&mut nominal, &config(0.0, 2)).unwrap();
        assert_eq!(curve.len(), 5);
        assert!(curve.samples.iter().all(|s| (s.volume - v0).abs() < 1e-9));
    }

    #[test]
    fn test_non_positive_volume_is_a_failed_point() {
        let crystal = argon();
        let v0 = crystal.volume();
        let mut nominal = NominalStructure::new(crystal);
        let mut driver = VolumeScanDriver::new(Parabola::new(v0));

        // 缩放因子 -1, 0, 1, 2, 3
        let curve = driver.scan_curve(&mut nominal, &config(2.0, 2)).unwrap();
        assert_eq!(curve.len(), 3);
        assert_eq!(curve.failures.len(), 2);
        assert!(curve.disclaimer.is_some());
        assert_eq!(driver.calculator().calls, 3);
    }

    #[test]
    fn test_internal_coordinates_relax_before_energy() {
        let ideal = argon();
        let target: Vec<[f64; 3]> = ideal.atoms.iter().map(|a| a.position).collect();
        let mut displaced = ideal.clone();
        displaced.atoms[1].position = [0.53, 0.48, 0.02];

        let mut nominal = NominalStructure::new(displaced.clone());
        let mut driver = VolumeScanDriver::new(Wells {
            target: target.clone(),
        });

        let relaxed = driver.scan_curve(&mut nominal, &config(0.1, 1)).unwrap();
        assert_eq!(relaxed.len(), 3);
        for sample in &relaxed.samples {
            assert!(sample.potential_energy < 1e-7, "{}", sample.potential_energy);
            let p = sample.relaxed_positions[1];
            assert!((p[0] - 0.5).abs() < 1e-3 && (p[1] - 0.5).abs() < 1e-3);
        }
        // 名义结构保持扫描前的（未弛豫）坐标
        assert_eq!(nominal.crystal(), &displaced);

        let cfg = ScanConfig {
            relax_positions: false,
            ..config(0.1, 1)
        };
        let frozen = driver.scan_curve(&mut nominal, &cfg).unwrap();
        assert!(frozen.samples.iter().all(|s| s.potential_energy > 1e-2));
        assert!(frozen.samples.iter().all(|s| s.relaxed_positions.is_empty()));
    }

    #[test]
    fn test_structure_records_carry_relaxed_positions() {
        let ideal = argon();
        let target: Vec<[f64; 3]> = ideal.atoms.iter().map(|a| a.position).collect();
        let mut displaced = ideal.clone();
        displaced.atoms[2].position = [0.47, 0.0, 0.5];

        let mut nominal = NominalStructure::new(displaced);
        let mut driver = VolumeScanDriver::new(Wells { target });
        let cfg = ScanConfig {
            record_structure_per_point: true,
            ..config(0.02, 1)
        };

        driver.scan(&mut nominal, &cfg).unwrap();
        let record = &driver.property_instances()[0];
        assert_eq!(record.property_name(), CRYSTAL_STRUCTURE_NPT);

        let coords = record
            .get("coordinates-of-basis-atoms")
            .unwrap()
            .source_value
            .as_matrix()
            .unwrap();
        assert_eq!(coords.len(), 4);
        assert!((coords[2][0] - 0.5).abs() < 1e-3, "{}", coords[2][0]);
    }

    #[test]
    fn test_unconverged_relaxation_is_a_failed_point() {
        let ideal = argon();
        let target: Vec<[f64; 3]> = ideal.atoms.iter().map(|a| a.position).collect();
        let mut displaced = ideal;
        displaced.atoms[1].position = [0.6, 0.5, 0.0];

        let mut nominal = NominalStructure::new(displaced);
        let mut driver = VolumeScanDriver::new(Wells { target });
        let cfg = ScanConfig {
            force_tolerance: 1e-12,
            max_relax_steps: 2,
            ..config(0.1, 1)
        };

        let curve = driver.scan_curve(&mut nominal, &cfg).unwrap();
        assert!(curve.is_empty());
        assert_eq!(curve.failures.len(), 3);
        assert!(curve.failures[0].1.contains("did not converge"));
    }

    #[test]
    fn test_symmetry_check_without_analyzer_is_rejected() {
        let crystal = argon();
        let v0 = crystal.volume();
        let mut nominal = NominalStructure::new(crystal);
        let mut driver = VolumeScanDriver::new(Parabola::new(v0));
        let cfg = ScanConfig {
            verify_symmetry: true,
            ..config(0.1, 1)
        };

        let err = driver.scan_curve(&mut nominal, &cfg).unwrap_err();
        assert!(matches!(err, EvError::InvalidArgument(_)));
        assert_eq!(driver.calculator().calls, 0);
    }

    #[test]
    fn test_symmetry_change_drops_points() {
        let crystal = argon();
        let v0 = crystal.volume();
        let mut nominal = NominalStructure::new(crystal);
        let mut driver = VolumeScanDriver::new(Parabola::new(v0))
            .with_symmetry(Box::new(TransitionAbove(1.07 * v0)));
        let cfg = ScanConfig {
            verify_symmetry: true,
            ..config(0.1, 2)
        };

        let curve = driver.scan_curve(&mut nominal, &cfg).unwrap();
        // 1.1 V0 处发生“相变”
        assert_eq!(curve.len(), 4);
        assert_eq!(curve.failures.len(), 1);
        assert!((curve.failures[0].0 - 1.1).abs() < 1e-12);
        assert_eq!(nominal.symmetry().map(|d| d.space_group), Some(225));

        // 关闭检查后所有点都保留
        let curve = driver.scan_curve(&mut nominal, &config(0.1, 2)).unwrap();
        assert_eq!(curve.len(), 5);
    }

    #[test]
    fn test_reference_energies_shift_binding_energy() {
        let crystal = argon();
        let v0 = crystal.volume();
        let mut nominal = NominalStructure::new(crystal);
        let mut driver = VolumeScanDriver::new(Parabola::new(v0));
        let mut cfg = config(0.1, 1);
        cfg.reference_energies.insert("Ar".to_string(), -0.5);

        let curve = driver.scan_curve(&mut nominal, &cfg).unwrap();
        assert!((curve.samples[1].binding_energy_per_atom - 0.5).abs() < 1e-12);
        assert!(curve.samples[1].potential_energy.abs() < 1e-12);
    }

    #[test]
    fn test_structure_records_per_point() {
        let mut nominal = NominalStructure::new(argon())
            .with_prototype("A_cF4_225_a")
            .unwrap()
            .with_temperature(300.0);
        let mut driver = VolumeScanDriver::new(LennardJones::new(0.0104, 3.4, 8.5));
        let cfg = ScanConfig {
            record_structure_per_point: true,
            ..config(0.02, 1)
        };

        let record = driver.scan(&mut nominal, &cfg).unwrap();
        let all = driver.property_instances();
        assert_eq!(all.len(), 4);
        assert_eq!(record.instance_id(), 4);
        for (i, r) in all[..3].iter().enumerate() {
            assert_eq!(r.property_name(), CRYSTAL_STRUCTURE_NPT);
            assert_eq!(r.instance_id(), i + 1);
            assert!(r.vector("cell-cauchy-stress").is_some());
        }
        assert_eq!(all[3].property_name(), ENERGY_VS_VOLUME);

        let a_small = all[0].get("a").unwrap().source_value.as_scalar().unwrap();
        let a_large = all[2].get("a").unwrap().source_value.as_scalar().unwrap();
        assert!(a_small < a_large);
    }

    #[test]
    fn test_accumulated_records_lifecycle() {
        let crystal = argon();
        let v0 = crystal.volume();
        let mut nominal = NominalStructure::new(crystal);
        let mut driver = VolumeScanDriver::new(Parabola::new(v0));

        driver.scan(&mut nominal, &config(0.1, 1)).unwrap();
        driver.scan(&mut nominal, &config(0.2, 2)).unwrap();
        assert_eq!(driver.property_instances().len(), 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        driver.write_property_instances_to_file(&path).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.as_array().map(|a| a.len()), Some(2));

        driver.clear_property_instances();
        assert!(driver.property_instances().is_empty());
        let record = driver.scan(&mut nominal, &config(0.1, 1)).unwrap();
        assert_eq!(record.instance_id(), 1);
    }
}
