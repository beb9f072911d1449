//! Tunables shared by the mapper and the reconciler.

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Absolute tolerance when comparing summed scores with reported totals.
pub const DEFAULT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GradingConfig {
    /// Maximum allowed `|computed - reported|` before a mismatch is reported.
    pub tolerance: f64,
    /// Also register a subsection that already reads as a qualified path
    /// (`"3.2.1"` under question `"3"`) under its literal key.
    pub qualified_alias: bool,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            qualified_alias: true,
        }
    }
}

impl GradingConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "tolerance must be a finite non-negative number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// True when `a` and `b` agree within the configured tolerance.
    pub fn within_tolerance(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.tolerance + f64::EPSILON * a.abs().max(b.abs()).max(1.0)
    }
}
