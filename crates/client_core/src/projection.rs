//! Maps a completed task's parameters onto the preview solid and the parameter panel.
//!
//! Only the `length`, `width` and `thickness` keys shape the preview box; any
//! other parameter is shown in the panel but ignored by the projection.

use shared::domain::{Parameter, ParameterSet};

/// Millimetres per scene unit.
pub const MM_PER_SCENE_UNIT: f64 = 50.0;

pub const LENGTH_KEY: &str = "length";
pub const WIDTH_KEY: &str = "width";
pub const THICKNESS_KEY: &str = "thickness";

/// Preview solid size in scene units. `height` is the vertical axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxDimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl BoxDimensions {
    /// Shown for any key the service did not supply, and before a task completes.
    pub const PLACEHOLDER: BoxDimensions = BoxDimensions {
        length: 1.0,
        width: 0.6,
        height: 0.1,
    };

    /// Sizes along the scene's x, y and z axes.
    pub fn extents(&self) -> [f64; 3] {
        [self.length, self.height, self.width]
    }

    /// Centre of the box when it rests on the ground plane.
    pub fn position(&self) -> [f64; 3] {
        [0.0, self.height / 2.0, 0.0]
    }
}

impl Default for BoxDimensions {
    fn default() -> Self {
        Self::PLACEHOLDER
    }
}

pub fn project(parameters: Option<&ParameterSet>) -> BoxDimensions {
    let defaults = BoxDimensions::PLACEHOLDER;
    BoxDimensions {
        length: scaled(parameters, LENGTH_KEY).unwrap_or(defaults.length),
        width: scaled(parameters, WIDTH_KEY).unwrap_or(defaults.width),
        height: scaled(parameters, THICKNESS_KEY).unwrap_or(defaults.height),
    }
}

// Zero counts as unusable: a zero-sized preview axis is never what the service meant.
fn scaled(parameters: Option<&ParameterSet>, key: &str) -> Option<f64> {
    parameters?
        .get(key)?
        .value
        .filter(|value| value.is_finite() && *value != 0.0)
        .map(|value| value / MM_PER_SCENE_UNIT)
}

/// One row of the read-only parameter panel.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSlider {
    pub name: String,
    pub value: Option<f64>,
    pub unit: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// A hundredth of the range, when both bounds are known.
    pub step: Option<f64>,
}

impl ParameterSlider {
    fn from_parameter(name: &str, parameter: &Parameter) -> Self {
        let step = match (parameter.min, parameter.max) {
            (Some(min), Some(max)) => Some((max - min) / 100.0),
            _ => None,
        };
        Self {
            name: name.to_string(),
            value: parameter.value,
            unit: parameter.unit.clone(),
            min: parameter.min,
            max: parameter.max,
            step,
        }
    }

    pub fn display_value(&self) -> String {
        match self.value {
            Some(value) if self.unit.is_empty() => format!("{value}"),
            Some(value) => format!("{value} {}", self.unit),
            None => "-".to_string(),
        }
    }
}

pub fn parameter_panel(parameters: &ParameterSet) -> Vec<ParameterSlider> {
    parameters
        .iter()
        .map(|(name, parameter)| ParameterSlider::from_parameter(name, parameter))
        .collect()
}

#[cfg(test)]
#[path = "tests/projection_tests.rs"]
mod tests;
