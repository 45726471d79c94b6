//! # VASP POSCAR 格式解析器
//!
//! 读取扫描输入结构。支持 VASP 4/5 格式、缩放因子（含负值表示目标体积）、
//! Selective dynamics 行以及 Direct/Cartesian 坐标。
//!
//! ## POSCAR 格式说明
//! ```text
//! Comment line (structure name)
//! 1.0                    # scaling factor
//! a1 a2 a3               # lattice vector a
//! b1 b2 b3               # lattice vector b
//! c1 c2 c3               # lattice vector c
//! Element1 Element2 ...  # element symbols (VASP 5+)
//! n1 n2 ...              # number of atoms per element
//! Selective dynamics     # optional
//! Direct/Cartesian       # coordinate type
//! x1 y1 z1               # atom positions
//! ```
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 使用
//! - 使用 `models/structure.rs`

use crate::error::{EvError, Result};
use crate::models::{Atom, Crystal, Lattice};
use std::fs;
use std::path::Path;

/// 解析 POSCAR/CONTCAR 文件
pub fn parse_poscar_file(path: &Path) -> Result<Crystal> {
    let content = fs::read_to_string(path).map_err(|e| EvError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_poscar_content(
        &content,
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown"),
    )
}

fn parse_error(name: &str, reason: impl Into<String>) -> EvError {
    EvError::ParseError {
        format: "poscar".to_string(),
        path: name.to_string(),
        reason: reason.into(),
    }
}

fn parse_triplet(line: &str) -> Option<[f64; 3]> {
    let v: Vec<f64> = line
        .split_whitespace()
        .take(3)
        .map_while(|s| s.parse().ok())
        .collect();
    (v.len() == 3).then(|| [v[0], v[1], v[2]])
}

/// 从字符串内容解析 POSCAR 格式
pub fn parse_poscar_content(content: &str, default_name: &str) -> Result<Crystal> {
    let lines: Vec<&str> = content.lines().collect();

    if lines.len() < 8 {
        return Err(parse_error(default_name, "File too short"));
    }

    let name = match lines[0].trim() {
        "" => default_name.to_string(),
        s => s.to_string(),
    };

    let scale: f64 = lines[1]
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| parse_error(&name, "Invalid scaling factor at line 2"))?;

    let mut matrix = [[0.0; 3]; 3];
    for (i, row) in matrix.iter_mut().enumerate() {
        *row = parse_triplet(lines[2 + i])
            .ok_or_else(|| parse_error(&name, format!("Invalid lattice vector at line {}", 3 + i)))?;
    }

    // 负缩放因子表示目标体积
    let raw = Lattice::from_vectors(matrix);
    let factor = if scale < 0.0 {
        (-scale / raw.volume().abs()).cbrt()
    } else {
        scale
    };
    let lattice = raw.scaled(factor);

    // VASP 5 在第 6 行给出元素符号，VASP 4 直接给出原子数
    let line5: Vec<&str> = lines[5].split_whitespace().collect();
    if line5.is_empty() {
        return Err(parse_error(&name, "Missing species/count line"));
    }
    let (elements, counts, mut cursor) = if line5[0].parse::<usize>().is_ok() {
        let counts: Vec<usize> = line5.iter().filter_map(|s| s.parse().ok()).collect();
        let elements = (0..counts.len()).map(|i| format!("X{}", i + 1)).collect();
        (elements, counts, 6)
    } else {
        let elements: Vec<String> = line5.iter().map(|s| s.to_string()).collect();
        let counts: Vec<usize> = lines[6]
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        (elements, counts, 7)
    };

    if elements.len() != counts.len() {
        return Err(parse_error(
            &name,
            format!(
                "{} species but {} counts",
                elements.len(),
                counts.len()
            ),
        ));
    }

    if lines
        .get(cursor)
        .is_some_and(|l| l.trim().to_lowercase().starts_with('s'))
    {
        cursor += 1;
    }

    let coord_type = lines
        .get(cursor)
        .ok_or_else(|| parse_error(&name, "Missing coordinate type line"))?
        .trim()
        .to_lowercase();
    let is_cartesian = coord_type.starts_with('c') || coord_type.starts_with('k');
    cursor += 1;

    let total: usize = counts.iter().sum();
    let mut atoms = Vec::with_capacity(total);

    for (elem, &count) in elements.iter().zip(counts.iter()) {
        for _ in 0..count {
            let line = lines
                .get(cursor)
                .ok_or_else(|| parse_error(&name, format!("Expected {} atom positions", total)))?;
            let xyz = parse_triplet(line).ok_or_else(|| {
                parse_error(&name, format!("Invalid position at line {}", cursor + 1))
            })?;
            let position = if is_cartesian {
                let cart = [xyz[0] * factor, xyz[1] * factor, xyz[2] * factor];
                lattice
                    .cart_to_frac(cart)
                    .ok_or_else(|| parse_error(&name, "Degenerate lattice"))?
            } else {
                xyz
            };
            atoms.push(Atom::new(elem.clone(), position));
            cursor += 1;
        }
    }

    Ok(Crystal::new(name, lattice, atoms))
}
