//! # 性质记录数据模型
//!
//! KIM Properties Framework 风格的性质实例：每个键包含 `source-value`，
//! 可选的 `source-unit` 和 `source-std-uncert-value`。
//!
//! ## 依赖关系
//! - 被 `driver/scan.rs` 构建
//! - 被 `export/records.rs` 序列化 (EDN / JSON)

use serde::ser::{Serialize, SerializeMap, Serializer};

/// 性质定义的标签前缀
pub const PROPERTY_ID_PREFIX: &str = "tag:staff@noreply.openkim.org,2023-02-21:property/";

/// 每个体积扫描发出的性质
pub const ENERGY_VS_VOLUME: &str = "energy-vs-volume-isotropic-crystal";

/// 每个网格点可选发出的结构性质
pub const CRYSTAL_STRUCTURE_NPT: &str = "crystal-structure-npt";

/// 性质值
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum SourceValue {
    Scalar(f64),
    Integer(i64),
    Vector(Vec<f64>),
    Matrix(Vec<Vec<f64>>),
    Text(String),
    TextList(Vec<String>),
}

impl SourceValue {
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            SourceValue::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&[Vec<f64>]> {
        match self {
            SourceValue::Matrix(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            SourceValue::Scalar(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SourceValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for SourceValue {
    fn from(x: f64) -> Self {
        SourceValue::Scalar(x)
    }
}

impl From<i64> for SourceValue {
    fn from(n: i64) -> Self {
        SourceValue::Integer(n)
    }
}

impl From<Vec<f64>> for SourceValue {
    fn from(v: Vec<f64>) -> Self {
        SourceValue::Vector(v)
    }
}

impl From<&[[f64; 3]]> for SourceValue {
    fn from(rows: &[[f64; 3]]) -> Self {
        SourceValue::Matrix(rows.iter().map(|r| r.to_vec()).collect())
    }
}

impl From<&str> for SourceValue {
    fn from(s: &str) -> Self {
        SourceValue::Text(s.to_string())
    }
}

impl From<Vec<String>> for SourceValue {
    fn from(v: Vec<String>) -> Self {
        SourceValue::TextList(v)
    }
}

/// 一个性质键
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PropertyValue {
    #[serde(rename = "source-value")]
    pub source_value: SourceValue,

    #[serde(rename = "source-unit", skip_serializing_if = "Option::is_none")]
    pub source_unit: Option<String>,

    #[serde(
        rename = "source-std-uncert-value",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_std_uncert_value: Option<SourceValue>,
}

/// 性质实例
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRecord {
    property_id: String,
    instance_id: usize,
    disclaimer: Option<String>,
    keys: Vec<(String, PropertyValue)>,
}

impl PropertyRecord {
    /// `property_name` 可以是短名或完整的 property-id
    pub fn new(property_name: &str, instance_id: usize) -> Self {
        let property_id = if property_name.starts_with("tag:") {
            property_name.to_string()
        } else {
            format!("{}{}", PROPERTY_ID_PREFIX, property_name)
        };
        PropertyRecord {
            property_id,
            instance_id,
            disclaimer: None,
            keys: Vec::new(),
        }
    }

    /// 合并多个驱动的输出时重新编号
    pub fn renumbered(mut self, instance_id: usize) -> Self {
        self.instance_id = instance_id;
        self
    }

    pub fn with_disclaimer(mut self, disclaimer: Option<String>) -> Self {
        self.disclaimer = disclaimer;
        self
    }

    /// 添加键；同名键会被替换
    pub fn add_key(
        &mut self,
        name: &str,
        value: impl Into<SourceValue>,
        unit: Option<&str>,
    ) -> &mut Self {
        self.insert(
            name,
            PropertyValue {
                source_value: value.into(),
                source_unit: unit.map(str::to_string),
                source_std_uncert_value: None,
            },
        )
    }

    /// 添加带标准不确定度的键
    pub fn add_key_with_uncertainty(
        &mut self,
        name: &str,
        value: impl Into<SourceValue>,
        unit: Option<&str>,
        std_uncert: impl Into<SourceValue>,
    ) -> &mut Self {
        self.insert(
            name,
            PropertyValue {
                source_value: value.into(),
                source_unit: unit.map(str::to_string),
                source_std_uncert_value: Some(std_uncert.into()),
            },
        )
    }

    fn insert(&mut self, name: &str, value: PropertyValue) -> &mut Self {
        match self.keys.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value,
            None => self.keys.push((name.to_string(), value)),
        }
        self
    }

    pub fn property_id(&self) -> &str {
        &self.property_id
    }

    /// property-id 中 `property/` 之后的短名
    pub fn property_name(&self) -> &str {
        self.property_id
            .rsplit_once("property/")
            .map(|(_, name)| name)
            .unwrap_or(&self.property_id)
    }

    pub fn instance_id(&self) -> usize {
        self.instance_id
    }

    pub fn disclaimer(&self) -> Option<&str> {
        self.disclaimer.as_deref()
    }

    pub fn keys(&self) -> &[(String, PropertyValue)] {
        &self.keys
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.keys.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// 数组键的值
    pub fn vector(&self, name: &str) -> Option<&[f64]> {
        self.get(name).and_then(|v| v.source_value.as_vector())
    }
}

impl Serialize for PropertyRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = if self.disclaimer.is_some() { 3 } else { 2 };
        let mut map = serializer.serialize_map(Some(self.keys.len() + extra))?;
        map.serialize_entry("property-id", &self.property_id)?;
        map.serialize_entry("instance-id", &self.instance_id)?;
        if let Some(ref d) = self.disclaimer {
            map.serialize_entry("disclaimer", d)?;
        }
        for (k, v) in &self.keys {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
