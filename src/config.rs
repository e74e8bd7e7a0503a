//! Diagram configuration
//!
//! [`FlowConfig`] is the user-facing option set. It deserializes from
//! camelCase keys with every field optional, and splits into the
//! per-component configs once validated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};
use crate::hierarchy::{DEFAULT_LEAF_MARKER, DEFAULT_ROOT_NAME};
use crate::layout::LayoutConfig;
use crate::route::RouteConfig;
use crate::simulation::SimulationConfig;

/// Color constants for the stock groups (CSS hex)
pub mod colors {
    /// Failed group: Red (#E15759)
    pub const FAILED: &str = "#e15759";

    /// Success group: Green (#59A14F)
    pub const SUCCESS: &str = "#59a14f";

    /// Any other group: Grey (#BAB0AC)
    pub const FALLBACK: &str = "#bab0ac";
}

/// Inclusive range particle speeds are drawn from, in points per tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedRange {
    pub min: f64,
    pub max: f64,
}

impl Default for SpeedRange {
    fn default() -> Self {
        Self { min: 1.0, max: 3.0 }
    }
}

/// Group key to render color
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    colors: BTreeMap<String, String>,
    fallback: String,
}

impl Palette {
    pub fn new(colors: BTreeMap<String, String>, fallback: impl Into<String>) -> Self {
        Self {
            colors,
            fallback: fallback.into(),
        }
    }

    pub fn color_for(&self, group: &str) -> &str {
        self.colors
            .get(group)
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new(default_group_colors(), colors::FALLBACK)
    }
}

fn default_group_colors() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("failed".to_string(), colors::FAILED.to_string()),
        ("success".to_string(), colors::SUCCESS.to_string()),
    ])
}

/// All recognized diagram options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlowConfig {
    /// Band-axis space per leaf route
    pub band_height: f64,
    /// Multiplier (>= 1) separating bands
    pub padding: f64,
    /// Path bend amount in `[0, 1)`
    pub curvature: f64,
    /// Maximum particles spawned per tick
    pub density: u32,
    pub speed_range: SpeedRange,
    /// Field whose presence marks a record as a leaf
    pub leaf_marker_field: String,
    pub color_for_group: BTreeMap<String, String>,
    /// Color for groups missing from `color_for_group`
    pub default_color: String,
    /// Width available along the depth axis
    pub width: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub align_leaves: bool,
    pub root_name: String,
    /// Seed for reproducible runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        let layout = LayoutConfig::default();
        Self {
            band_height: layout.band_height,
            padding: layout.padding,
            curvature: RouteConfig::default().curvature,
            density: 5,
            speed_range: SpeedRange::default(),
            leaf_marker_field: DEFAULT_LEAF_MARKER.to_string(),
            color_for_group: default_group_colors(),
            default_color: colors::FALLBACK.to_string(),
            width: layout.width,
            margin_left: layout.margin_left,
            margin_right: layout.margin_right,
            align_leaves: layout.align_leaves,
            root_name: DEFAULT_ROOT_NAME.to_string(),
            seed: None,
        }
    }
}

impl FlowConfig {
    /// Check every option is in range.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidConfig`] naming the first bad option.
    pub fn validate(&self) -> FlowResult<()> {
        let invalid = |msg: String| Err(FlowError::InvalidConfig(msg));

        if !(self.band_height > 0.0 && self.band_height.is_finite()) {
            return invalid(format!("bandHeight must be positive, got {}", self.band_height));
        }
        if !(self.padding >= 1.0 && self.padding.is_finite()) {
            return invalid(format!("padding must be at least 1, got {}", self.padding));
        }
        if !(0.0..1.0).contains(&self.curvature) {
            return invalid(format!("curvature must be in [0, 1), got {}", self.curvature));
        }
        if self.density == 0 {
            return invalid("density must be at least 1".to_string());
        }
        let SpeedRange { min, max } = self.speed_range;
        if !(min > 0.0 && min <= max && max.is_finite()) {
            return invalid(format!(
                "speedRange must satisfy 0 < min <= max, got {min}..{max}"
            ));
        }
        if self.leaf_marker_field.is_empty() {
            return invalid("leafMarkerField must not be empty".to_string());
        }
        if self.margin_left < 0.0 || self.margin_right < 0.0 {
            return invalid("margins must not be negative".to_string());
        }
        if !(self.width > self.margin_left + self.margin_right) {
            return invalid(format!(
                "width {} leaves no room inside margins {} + {}",
                self.width, self.margin_left, self.margin_right
            ));
        }
        Ok(())
    }

    pub fn layout(&self) -> LayoutConfig {
        LayoutConfig {
            band_height: self.band_height,
            padding: self.padding,
            width: self.width,
            margin_left: self.margin_left,
            margin_right: self.margin_right,
            align_leaves: self.align_leaves,
        }
    }

    pub fn route(&self) -> RouteConfig {
        RouteConfig {
            curvature: self.curvature,
        }
    }

    pub fn simulation(&self) -> SimulationConfig {
        SimulationConfig {
            density: self.density,
            speed_range: self.speed_range,
            band_height: self.band_height,
            palette: self.palette(),
        }
    }

    pub fn palette(&self) -> Palette {
        Palette::new(self.color_for_group.clone(), self.default_color.clone())
    }
}
