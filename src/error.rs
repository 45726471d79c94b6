//! # 统一错误处理模块
//!
//! 定义 evcurve 的错误类型，使用 `thiserror` 派生。
//!
//! - `EvError`: 全局错误（I/O、解析、参数、外部命令等），向调用者传播
//! - `EvaluationError`: 单个网格点的能量计算失败，只在扫描内部被捕获
//! - `SymmetryError`: 对称性分析失败或名义结构对称性冲突
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// evcurve 统一错误类型
#[derive(Error, Debug)]
pub enum EvError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid prototype label '{label}': {reason}")]
    InvalidPrototype { label: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // 外部命令错误
    // ─────────────────────────────────────────────────────────────
    #[error("External command '{command}' not found in PATH")]
    CommandNotFound { command: String },

    // ─────────────────────────────────────────────────────────────
    // 参数错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration in {path}: {reason}")]
    InvalidConfig { path: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // 对称性
    // ─────────────────────────────────────────────────────────────
    #[error(transparent)]
    Symmetry(#[from] SymmetryError),

    // ─────────────────────────────────────────────────────────────
    // 序列化错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("No matching files found with pattern: {pattern}")]
    NoFilesFound { pattern: String },

    #[error("{0}")]
    Other(String),
}

/// 单点能量计算错误
///
/// 扫描只捕获这一类错误：样本被丢弃并设置免责声明，扫描继续。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("calculator returned a non-finite value ({quantity})")]
    NonFinite { quantity: String },

    #[error("unphysical configuration: {0}")]
    Unphysical(String),

    #[error("simulator failed with atom_style {style}: {reason}")]
    Simulator { style: String, reason: String },

    #[error("all atom styles failed: {}", format_attempts(.attempts))]
    StylesExhausted { attempts: Vec<(String, String)> },

    #[error("external command '{command}' not found")]
    CommandNotFound { command: String },

    #[error("position relaxation did not converge in {steps} steps (max force {max_force:.3e} eV/Å)")]
    NotConverged { steps: u32, max_force: f64 },

    #[error("crystal symmetry changed: {0}")]
    SymmetryChanged(String),
}

fn format_attempts(attempts: &[(String, String)]) -> String {
    attempts
        .iter()
        .map(|(style, reason)| format!("[{}] {}", style, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// 对称性错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SymmetryError {
    #[error("symmetry analysis failed: {0}")]
    Analysis(String),

    /// 提交的新名义结构与原结构的空间群或 Wyckoff 占据不同
    #[error("nominal structure update rejected: expected {expected}, found {found}")]
    Changed { expected: String, found: String },
}

impl From<SymmetryError> for EvaluationError {
    fn from(err: SymmetryError) -> Self {
        EvaluationError::SymmetryChanged(err.to_string())
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, EvError>;
