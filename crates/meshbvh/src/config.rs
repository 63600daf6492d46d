//! Builder settings.

use serde::{Deserialize, Serialize};

use crate::error::{BvhError, Result};

/// Parameters of the binned SAH used by the builder.
///
/// The defaults are the ones every cached tree in the wild was built with;
/// callers that change them should write to a separate cache path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SahConfig {
    /// Number of centroid bins per axis.
    pub bin_count: usize,
    /// Cost of visiting an interior node.
    pub traversal_cost: f32,
    /// Cost of intersecting one triangle.
    pub intersection_cost: f32,
    /// Centroid extent at or below which an axis is not considered for splitting.
    pub degenerate_extent: f32,
}

impl Default for SahConfig {
    fn default() -> Self {
        Self {
            bin_count: 12,
            traversal_cost: 1.0,
            intersection_cost: 1.0,
            degenerate_extent: 1e-5,
        }
    }
}

impl SahConfig {
    /// Parse settings from a TOML document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`BvhError::InvalidConfig`] on a parse error or if the values
    /// fail [`SahConfig::validate`].
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| BvhError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the settings describe a usable cost model.
    pub fn validate(&self) -> Result<()> {
        if self.bin_count < 2 {
            return Err(BvhError::InvalidConfig(format!(
                "bin_count must be at least 2, got {}",
                self.bin_count
            )));
        }
        for (name, value) in [
            ("traversal_cost", self.traversal_cost),
            ("intersection_cost", self.intersection_cost),
            ("degenerate_extent", self.degenerate_extent),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(BvhError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}
