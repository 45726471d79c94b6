//! # AFLOW 原型标签解析
//!
//! 从原型标签（如 `AB_hP4_186_b_b`, `A2B_cF12_225_c_a`）的第一段解码
//! 化学计量比，用于计算每化学式原子数。
//!
//! ## 依赖关系
//! - 被 `driver/nominal.rs`, `commands/scan.rs` 使用
//! - 使用 `regex` crate

use crate::error::{EvError, Result};
use crate::models::Crystal;
use regex::Regex;
use std::sync::OnceLock;

/// 化学计量段中的一个 `字母[数字]` 片段
static TOKEN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();

fn token_regex() -> Result<&'static Regex> {
    TOKEN
        .get_or_init(|| Regex::new(r"([A-Z])(\d*)"))
        .as_ref()
        .map_err(|e| EvError::Other(e.to_string()))
}

fn invalid(label: &str, reason: impl Into<String>) -> EvError {
    EvError::InvalidPrototype {
        label: label.to_string(),
        reason: reason.into(),
    }
}

/// 解码化学计量比（各位点多重度）
pub fn stoichiometry_from_prototype(label: &str) -> Result<Vec<u32>> {
    let stoich = label
        .split('_')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid(label, "empty stoichiometry field"))?;

    let token = token_regex()?;

    let mut result = Vec::new();
    let mut consumed = 0;
    for (i, cap) in token.captures_iter(stoich).enumerate() {
        let whole = cap.get(0).map(|m| m.range()).unwrap_or(0..0);
        if whole.start != consumed {
            return Err(invalid(label, format!("unexpected character at {}", consumed)));
        }
        consumed = whole.end;

        let letter = cap[1].chars().next().unwrap_or('?');
        let expected = (b'A' + i as u8) as char;
        if letter != expected {
            return Err(invalid(
                label,
                format!("species letter '{}' where '{}' was expected", letter, expected),
            ));
        }

        let count = match &cap[2] {
            "" => 1,
            digits => digits
                .parse::<u32>()
                .map_err(|_| invalid(label, format!("bad multiplicity '{}'", digits)))?,
        };
        if count == 0 {
            return Err(invalid(label, "zero multiplicity"));
        }
        result.push(count);
    }

    if consumed != stoich.len() || result.is_empty() {
        return Err(invalid(label, "stoichiometry must look like A, AB2, A2B3C"));
    }

    Ok(result)
}

/// 原型标签中的空间群编号（第三段）
pub fn space_group_from_prototype(label: &str) -> Option<u32> {
    label
        .split('_')
        .nth(2)
        .and_then(|s| s.parse().ok())
        .filter(|n| (1..=230).contains(n))
}

/// 没有原型标签时，从各元素原子数按最大公约数约化
pub fn stoichiometry_from_species(crystal: &Crystal) -> Vec<u32> {
    let mut counts: Vec<u32> = crystal
        .species_counts()
        .into_iter()
        .map(|(_, n)| n as u32)
        .collect();
    // AFLOW 按多重度升序排列
    counts.sort_unstable();

    let divisor = counts.iter().copied().fold(0, gcd);
    if divisor > 1 {
        for c in counts.iter_mut() {
            *c /= divisor;
        }
    }
    counts
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// 每化学式原子数
pub fn atoms_per_formula(stoichiometry: &[u32]) -> u32 {
    stoichiometry.iter().sum()
}
