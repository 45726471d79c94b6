//! # 性质记录输出
//!
//! 记录汇集到 `PropertySink`：内存中的 `MemorySink`，或写文件的 `FileSink`。
//! 文件格式由扩展名决定：`.edn`（KIM 测试驱动的输出格式）或 `.json`。
//!
//! ## 依赖关系
//! - 被 `driver/scan.rs`, `commands/scan.rs` 使用
//! - 使用 `models/property.rs`
//! - 使用 `serde_json` 序列化（EDN 由 JSON 值转写）

use crate::error::{EvError, Result};
use crate::models::PropertyRecord;

use serde_json::Value;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// 默认输出文件
pub const DEFAULT_OUTPUT: &str = "output/results.edn";

/// 记录的接收端
pub trait PropertySink {
    fn push(&mut self, record: PropertyRecord) -> Result<()>;

    /// 持久化已接收的记录
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 内存中的记录集合
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<PropertyRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[PropertyRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PropertyRecord> {
        self.records
    }
}

impl PropertySink for MemorySink {
    fn push(&mut self, record: PropertyRecord) -> Result<()> {
        self.records.push(record);
        Ok(())
    }
}

/// 记录文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Edn,
    Json,
}

impl RecordFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase())
            .as_deref()
        {
            Some("edn") => Ok(RecordFormat::Edn),
            Some("json") => Ok(RecordFormat::Json),
            _ => Err(EvError::UnsupportedFormat(format!(
                "record output must end in .edn or .json: {}",
                path.display()
            ))),
        }
    }
}

/// 写文件的记录集合；`flush` 时整体重写文件
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    format: RecordFormat,
    records: Vec<PropertyRecord>,
}

impl FileSink {
    pub fn new(path: &Path) -> Result<Self> {
        Ok(FileSink {
            path: path.to_path_buf(),
            format: RecordFormat::from_path(path)?,
            records: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PropertySink for FileSink {
    fn push(&mut self, record: PropertyRecord) -> Result<()> {
        self.records.push(record);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let content = match self.format {
            RecordFormat::Json => serde_json::to_string_pretty(&self.records)?,
            RecordFormat::Edn => records_to_edn(&self.records)?,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| EvError::FileWriteError {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        fs::write(&self.path, content).map_err(|e| EvError::FileWriteError {
            path: self.path.display().to_string(),
            source: e,
        })
    }
}

/// 把记录集合写成 EDN 向量，每条记录一个映射
pub fn records_to_edn(records: &[PropertyRecord]) -> Result<String> {
    let mut out = String::from("[\n");
    for record in records {
        let value = serde_json::to_value(record)?;
        out.push_str("  ");
        write_edn(&value, &mut out);
        out.push('\n');
    }
    out.push_str("]\n");
    Ok(out)
}

fn write_edn(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("nil"),
        Value::Bool(b) => {
            let _ = write!(out, "{}", b);
        }
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => write_edn_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_edn(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_edn_string(k, out);
                out.push(' ');
                write_edn(v, out);
            }
            out.push('}');
        }
    }
}

fn write_edn_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
}
