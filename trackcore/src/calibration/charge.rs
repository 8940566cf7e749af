use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackingError};

/// Quadratic charge-from-energy-loss calibration, one row per wall bar.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargeCalibration {
    /// `[a, b, c]` with `q = a + b E + c E²`, row `i` belongs to bar `i + 1`.
    pub bars: Vec<[f64; 3]>,
}

impl ChargeCalibration {
    pub fn new(bars: Vec<[f64; 3]>) -> Self {
        ChargeCalibration { bars }
    }

    /// Parses a whitespace separated table with three numbers per bar.
    ///
    /// Blank lines and lines starting with `#` are skipped. Every other line
    /// must contain exactly three finite numbers.
    ///
    /// # Arguments
    ///
    /// * `table` - Contents of the calibration file.
    ///
    pub fn from_table_str(table: &str) -> Result<Self> {
        let mut bars = Vec::new();
        for (i, line) in table.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let values: Vec<f64> = line
                .split_whitespace()
                .map(|tok| tok.parse::<f64>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| TrackingError::Table { line: i + 1, message: e.to_string() })?;
            if values.len() != 3 || values.iter().any(|v| !v.is_finite()) {
                return Err(TrackingError::Table {
                    line: i + 1,
                    message: format!("expected 3 finite numbers, found {:?}", values),
                });
            }
            bars.push([values[0], values[1], values[2]]);
        }
        if bars.is_empty() {
            return Err(TrackingError::Table { line: 0, message: "table has no rows".to_string() });
        }
        Ok(ChargeCalibration { bars })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Charge for a 1-based bar id, `None` if the bar is not calibrated.
    pub fn charge(&self, bar: u32, energy_loss: f64) -> Option<f64> {
        let idx = (bar as usize).checked_sub(1)?;
        let [a, b, c] = *self.bars.get(idx)?;
        Some(a + b * energy_loss + c * energy_loss * energy_loss)
    }
}
