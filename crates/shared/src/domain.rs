use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Deserializer, Serialize};

/// Opaque task identifier assigned by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One named, bounded dimension reported by the service.
///
/// Fields are read leniently: a missing, null or non-numeric value deserializes
/// to `None` (or an empty unit) instead of rejecting the whole result, because
/// consumers are expected to fall back to defaults per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(default, deserialize_with = "lenient_number")]
    pub value: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub unit: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub min: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub max: Option<f64>,
}

impl Parameter {
    pub fn new(value: f64, unit: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            value: Some(value),
            unit: unit.into(),
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn with_value(value: f64) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }
}

pub type ParameterSet = BTreeMap<String, Parameter>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Stl,
    Python,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Stl, ArtifactKind::Python];

    /// Key under which the service lists this artifact in `result.downloads`.
    pub fn key(self) -> &'static str {
        match self {
            ArtifactKind::Stl => "stl",
            ArtifactKind::Python => "python",
        }
    }

    pub fn file_extension(self) -> &'static str {
        match self {
            ArtifactKind::Stl => "stl",
            ArtifactKind::Python => "py",
        }
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(match raw {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(match raw {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}
