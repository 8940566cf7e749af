use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackingError};

/// Polynomial family used by a multidimensional fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolynomialBasis {
    Monomial,
    Chebyshev,
    Legendre,
}

fn default_basis() -> PolynomialBasis {
    PolynomialBasis::Monomial
}

/// A calibrated multivariate response function.
///
/// The value is `mean + Σ_i c_i Π_j P(p_ij, x̃_j)` where every input is first
/// mapped onto `[-1, 1]` with `x̃ = 1 + 2 (x - max) / (max - min)` and `P(p, ·)`
/// is the basis polynomial of degree `p - 1` (power 1 is the constant term).
/// Coefficients are fixed once loaded; evaluation has no state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseFunction {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_basis")]
    pub basis: PolynomialBasis,
    pub mean: f64,
    pub x_min: Vec<f64>,
    pub x_max: Vec<f64>,
    pub coefficients: Vec<f64>,
    /// One row of per-variable powers per coefficient.
    pub powers: Vec<Vec<u32>>,
}

#[inline]
fn basis_value(basis: PolynomialBasis, power: u32, v: f64) -> f64 {
    match power {
        0 | 1 => 1.0,
        2 => v,
        _ => {
            let mut p1 = 1.0;
            let mut p2 = v;
            for k in 3..=power {
                let kf = k as f64;
                let p3 = match basis {
                    PolynomialBasis::Monomial => p2 * v,
                    PolynomialBasis::Chebyshev => 2.0 * v * p2 - p1,
                    PolynomialBasis::Legendre => ((2.0 * kf - 3.0) * p2 * v - (kf - 2.0) * p1) / (kf - 1.0),
                };
                p1 = p2;
                p2 = p3;
            }
            p2
        }
    }
}

impl ResponseFunction {
    /// A function returning `value` for every input.
    pub fn constant(name: &str, n_variables: usize, value: f64) -> Self {
        ResponseFunction {
            name: name.to_string(),
            basis: PolynomialBasis::Monomial,
            mean: value,
            x_min: vec![-1.0; n_variables],
            x_max: vec![1.0; n_variables],
            coefficients: Vec::new(),
            powers: Vec::new(),
        }
    }

    /// `mean + Σ_j slopes[j] * x_j` on the identity normalization range `[-1, 1]`.
    pub fn linear(name: &str, mean: f64, slopes: &[f64]) -> Self {
        let n = slopes.len();
        let mut coefficients = Vec::new();
        let mut powers = Vec::new();
        for (j, &s) in slopes.iter().enumerate() {
            if s == 0.0 {
                continue;
            }
            let mut row = vec![1u32; n];
            row[j] = 2;
            coefficients.push(s);
            powers.push(row);
        }
        ResponseFunction {
            name: name.to_string(),
            basis: PolynomialBasis::Monomial,
            mean,
            x_min: vec![-1.0; n],
            x_max: vec![1.0; n],
            coefficients,
            powers,
        }
    }

    pub fn n_variables(&self) -> usize {
        self.x_min.len()
    }

    /// Checks dimensions and ranges against the expected number of inputs.
    pub fn validate(&self, n_variables: usize) -> Result<()> {
        let err = |m: String| TrackingError::response(self.name.clone(), m);
        if self.x_min.len() != n_variables || self.x_max.len() != n_variables {
            return Err(err(format!(
                "expected {} variables, found x_min={} x_max={}",
                n_variables,
                self.x_min.len(),
                self.x_max.len()
            )));
        }
        if self.coefficients.len() != self.powers.len() {
            return Err(err(format!(
                "{} coefficients but {} power rows",
                self.coefficients.len(),
                self.powers.len()
            )));
        }
        for (j, (lo, hi)) in self.x_min.iter().zip(&self.x_max).enumerate() {
            if !(lo.is_finite() && hi.is_finite() && hi > lo) {
                return Err(err(format!("variable {} has an empty range [{}, {}]", j, lo, hi)));
            }
        }
        for (i, row) in self.powers.iter().enumerate() {
            if row.len() != n_variables {
                return Err(err(format!("power row {} has {} entries", i, row.len())));
            }
            if row.iter().any(|&p| p == 0) {
                return Err(err(format!("power row {} contains 0, powers start at 1", i)));
            }
        }
        if !self.mean.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(err("non-finite coefficient".to_string()));
        }
        Ok(())
    }

    /// Evaluates the function. `x` must have `n_variables()` entries.
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        let normalized: Vec<f64> = x
            .iter()
            .zip(self.x_min.iter().zip(&self.x_max))
            .map(|(&xi, (&lo, &hi))| 1.0 + 2.0 / (hi - lo) * (xi - hi))
            .collect();

        let mut value = self.mean;
        for (c, row) in self.coefficients.iter().zip(&self.powers) {
            let term: f64 = row
                .iter()
                .zip(&normalized)
                .map(|(&p, &v)| basis_value(self.basis, p, v))
                .product();
            value += c * term;
        }
        value
    }
}

/// Values of all six response functions for one feature vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Responses {
    pub momentum_over_charge: f64,
    pub flight_path: f64,
    pub tx0: f64,
    pub ty0: f64,
    pub tx1: f64,
    pub ty1: f64,
}

/// The six calibrated functions the evaluator needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseFunctions {
    pub momentum_over_charge: ResponseFunction,
    pub flight_path: ResponseFunction,
    pub tx0: ResponseFunction,
    pub ty0: ResponseFunction,
    pub tx1: ResponseFunction,
    pub ty1: ResponseFunction,
}

impl ResponseFunctions {
    pub fn validate(&self, n_variables: usize) -> Result<()> {
        for f in self.iter() {
            f.validate(n_variables)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResponseFunction> {
        [&self.momentum_over_charge, &self.flight_path, &self.tx0, &self.ty0, &self.tx1, &self.ty1].into_iter()
    }

    pub fn evaluate(&self, x: &[f64]) -> Responses {
        Responses {
            momentum_over_charge: self.momentum_over_charge.evaluate(x),
            flight_path: self.flight_path.evaluate(x),
            tx0: self.tx0.evaluate(x),
            ty0: self.ty0.evaluate(x),
            tx1: self.tx1.evaluate(x),
            ty1: self.ty1.evaluate(x),
        }
    }
}
