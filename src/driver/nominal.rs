//! # 名义晶体结构
//!
//! 扫描所围绕的结构：晶体、原型标签、对称性描述符，以及名义温度和应力。
//! 提交新结构时要求空间群和 Wyckoff 占据不变，否则拒绝提交并保持原状。
//!
//! ## 依赖关系
//! - 被 `driver/scan.rs`, `commands/scan.rs` 使用
//! - 使用 `parsers/prototype.rs` 解码化学计量比
//! - 使用 `symmetry.rs` 的 `SymmetryAnalyzer`

use crate::error::{Result, SymmetryError};
use crate::models::{Crystal, PropertyRecord};
use crate::parsers::prototype;
use crate::symmetry::{SymmetryAnalyzer, SymmetryDescriptor};

/// 名义晶体结构
#[derive(Debug, Clone, PartialEq)]
pub struct NominalStructure {
    crystal: Crystal,
    prototype_label: Option<String>,
    symmetry: Option<SymmetryDescriptor>,
    /// 名义温度 (K)
    pub temperature: f64,
    /// 名义晶胞 Cauchy 应力 (eV/Å³, Voigt: xx yy zz yz xz xy)
    pub cell_cauchy_stress: [f64; 6],
}

impl NominalStructure {
    pub fn new(crystal: Crystal) -> Self {
        NominalStructure {
            crystal,
            prototype_label: None,
            symmetry: None,
            temperature: 0.0,
            cell_cauchy_stress: [0.0; 6],
        }
    }

    /// 设置原型标签；标签必须能解码出化学计量比
    pub fn with_prototype(mut self, label: &str) -> Result<Self> {
        prototype::stoichiometry_from_prototype(label)?;
        self.prototype_label = Some(label.to_string());
        Ok(self)
    }

    /// 用分析器计算并保存对称性描述符
    pub fn with_symmetry(mut self, analyzer: &dyn SymmetryAnalyzer) -> Result<Self> {
        self.symmetry = Some(analyzer.describe(&self.crystal)?);
        Ok(self)
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn crystal(&self) -> &Crystal {
        &self.crystal
    }

    pub fn prototype_label(&self) -> Option<&str> {
        self.prototype_label.as_deref()
    }

    pub fn symmetry(&self) -> Option<&SymmetryDescriptor> {
        self.symmetry.as_ref()
    }

    /// 化学计量比：优先取原型标签，否则按原子数约化
    pub fn stoichiometry(&self) -> Result<Vec<u32>> {
        match self.prototype_label {
            Some(ref label) => prototype::stoichiometry_from_prototype(label),
            None => Ok(prototype::stoichiometry_from_species(&self.crystal)),
        }
    }

    pub fn atoms_per_formula(&self) -> Result<u32> {
        Ok(prototype::atoms_per_formula(&self.stoichiometry()?))
    }

    /// 提交新的名义结构
    ///
    /// 对称性描述符不同时返回 `SymmetryError::Changed`，当前结构保持不变。
    pub fn update(
        &mut self,
        crystal: Crystal,
        analyzer: &dyn SymmetryAnalyzer,
    ) -> std::result::Result<(), SymmetryError> {
        let expected = match self.symmetry.take() {
            Some(d) => d,
            None => analyzer.describe(&self.crystal)?,
        };

        let found = match analyzer.describe(&crystal) {
            Ok(d) => d,
            Err(e) => {
                self.symmetry = Some(expected);
                return Err(e);
            }
        };

        if found != expected {
            let err = SymmetryError::Changed {
                expected: expected.to_string(),
                found: found.to_string(),
            };
            self.symmetry = Some(expected);
            return Err(err);
        }

        self.crystal = crystal;
        self.symmetry = Some(found);
        Ok(())
    }

    /// 所有晶体性质共有的键
    pub fn add_common_keys(&self, record: &mut PropertyRecord) {
        self.add_common_keys_for(&self.crystal, record);
    }

    /// 用给定几何（名义结构的形变副本）写共有键
    pub fn add_common_keys_for(&self, crystal: &Crystal, record: &mut PropertyRecord) {
        if let Some(ref label) = self.prototype_label {
            record.add_key("prototype-label", label.as_str(), None);
        }

        let mut species = crystal.species();
        species.sort();
        record.add_key("stoichiometric-species", species, None);

        let (a, b, c, alpha, beta, gamma) = crystal.lattice.parameters();
        record.add_key("a", a, Some("angstrom"));
        record.add_key(
            "parameter-names",
            vec![
                "b/a".to_string(),
                "c/a".to_string(),
                "alpha".to_string(),
                "beta".to_string(),
                "gamma".to_string(),
            ],
            None,
        );
        record.add_key("parameter-values", vec![b / a, c / a, alpha, beta, gamma], None);

        if let Some(ref sym) = self.symmetry {
            record.add_key("space-group", i64::from(sym.space_group), None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::property::ENERGY_VS_VOLUME;
    use crate::models::{Atom, Lattice};

    /// 只看晶胞是否立方的分析器
    struct CubicOnly;

    impl SymmetryAnalyzer for CubicOnly {
        fn describe(&self, crystal: &Crystal) -> std::result::Result<SymmetryDescriptor, SymmetryError> {
            let (a, b, c, ..) = crystal.lattice.parameters();
            let sg = if (a - b).abs() < 1e-6 && (b - c).abs() < 1e-6 { 221 } else { 123 };
            let sites = crystal
                .atoms
                .iter()
                .map(|at| (at.element.clone(), 'a'))
                .collect();
            Ok(SymmetryDescriptor::new(sg, sites))
        }
    }

    fn nominal() -> NominalStructure {
        NominalStructure::new(Crystal::new(
            "Po",
            Lattice::cubic(3.35),
            vec![Atom::new("Po", [0.0; 3])],
        ))
    }

    #[test]
    fn test_prototype_label_validation() {
        assert!(nominal().with_prototype("A_cP1_221_a").is_ok());
        assert!(nominal().with_prototype("not a label").is_err());
    }

    #[test]
    fn test_atoms_per_formula_sources() {
        let n = nominal().with_prototype("AB_cP2_221_a_b").unwrap();
        assert_eq!(n.atoms_per_formula().unwrap(), 2);
        assert_eq!(nominal().atoms_per_formula().unwrap(), 1);
    }

    #[test]
    fn test_update_accepts_same_symmetry() {
        let mut n = nominal().with_symmetry(&CubicOnly).unwrap();
        let mut scaled = n.crystal().clone();
        scaled.scale_isotropic(1.1);
        n.update(scaled.clone(), &CubicOnly).unwrap();
        assert_eq!(n.crystal(), &scaled);
    }

    #[test]
    fn test_update_rejects_changed_symmetry() {
        let mut n = nominal().with_symmetry(&CubicOnly).unwrap();
        let before = n.clone();

        let mut stretched = n.crystal().clone();
        stretched.set_lattice(Lattice::from_parameters(3.35, 3.35, 3.8, 90.0, 90.0, 90.0));
        let err = n.update(stretched, &CubicOnly).unwrap_err();

        assert!(matches!(err, SymmetryError::Changed { .. }));
        assert_eq!(n, before);
    }

    #[test]
    fn test_common_keys() {
        let n = nominal().with_prototype("A_cP1_221_a").unwrap();
        let mut record = PropertyRecord::new(ENERGY_VS_VOLUME, 1);
        n.add_common_keys(&mut record);

        let label = record.get("prototype-label").unwrap();
        assert_eq!(label.source_value.as_text(), Some("A_cP1_221_a"));
        let a = record.get("a").unwrap();
        assert!((a.source_value.as_scalar().unwrap() - 3.35).abs() < 1e-12);
        assert_eq!(a.source_unit.as_deref(), Some("angstrom"));
    }
}
